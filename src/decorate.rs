//! Bearer-token decoration for outbound requests.

// crates.io
use ::http::header::{AUTHORIZATION, HeaderValue};
// self
use crate::{
	_prelude::*,
	auth::{Credential, Principal, PrincipalPolicy, TokenSecret},
	http::ApiRequest,
	obs::trace_event,
	store::TokenStore,
};

/// Credential currently presented by the client, tagged with its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveCredential {
	/// Principal that owns the credential.
	pub principal: Principal,
	/// Stored credential.
	pub credential: Credential,
}
impl ActiveCredential {
	/// Access token to attach.
	pub fn access_token(&self) -> &TokenSecret {
		&self.credential.access_token
	}
}

/// Resolves the active credential and attaches it to outbound requests.
#[derive(Clone)]
pub struct RequestDecorator {
	store: Arc<dyn TokenStore>,
	policy: PrincipalPolicy,
}
impl RequestDecorator {
	/// Creates a decorator reading from `store` under `policy`.
	pub fn new(store: Arc<dyn TokenStore>, policy: PrincipalPolicy) -> Self {
		Self { store, policy }
	}

	/// Policy used to pick the active principal.
	pub fn policy(&self) -> PrincipalPolicy {
		self.policy
	}

	/// Returns the first stored credential in policy order, preferring the user principal.
	pub async fn active(&self) -> Result<Option<ActiveCredential>> {
		for &principal in self.policy.candidates() {
			if let Some(credential) = self.store.fetch(principal).await? {
				return Ok(Some(ActiveCredential { principal, credential }));
			}
		}

		Ok(None)
	}
}
impl Debug for RequestDecorator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDecorator").field("policy", &self.policy).finish()
	}
}

/// Sets `Authorization: Bearer <token>` on `request`, replacing any existing value.
///
/// Token characters are validated when a [`Credential`] is built, so the header value is
/// always representable; the header is marked sensitive so HTTP stacks skip it when logging.
pub fn attach_bearer(request: &mut ApiRequest, token: &TokenSecret) {
	match HeaderValue::try_from(format!("Bearer {}", token.expose())) {
		Ok(mut value) => {
			value.set_sensitive(true);
			request.headers_mut().insert(AUTHORIZATION, value);
		},
		Err(_) => {
			trace_event!(
				warn,
				token = %token.fingerprint(),
				"skipping bearer header for a token that is not header-safe"
			);
		},
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn credential(access: &str) -> Credential {
		Credential::builder()
			.access_token(access)
			.expires_in(Duration::minutes(5))
			.build()
			.expect("Credential fixture should build.")
	}

	#[tokio::test]
	async fn prefer_user_picks_user_over_admin() {
		let store = Arc::new(MemoryStore::default());

		store.save(Principal::Admin, credential("admin-token")).await.expect("Seed admin.");

		let decorator = RequestDecorator::new(store.clone(), PrincipalPolicy::PreferUser);
		let active = decorator.active().await.expect("Lookup should succeed.");

		assert_eq!(active.map(|a| a.principal), Some(Principal::Admin));

		store.save(Principal::User, credential("user-token")).await.expect("Seed user.");

		let active = decorator
			.active()
			.await
			.expect("Lookup should succeed.")
			.expect("A credential should be active.");

		assert_eq!(active.principal, Principal::User);
		assert_eq!(active.access_token().expose(), "user-token");
	}

	#[tokio::test]
	async fn fixed_policy_ignores_other_principal() {
		let store = Arc::new(MemoryStore::default());

		store.save(Principal::User, credential("user-token")).await.expect("Seed user.");

		let decorator = RequestDecorator::new(store, PrincipalPolicy::Fixed(Principal::Admin));

		assert!(decorator.active().await.expect("Lookup should succeed.").is_none());
	}

	#[test]
	fn attach_bearer_replaces_header_and_marks_it_sensitive() {
		let mut request = ApiRequest::new(Vec::new());

		request.headers_mut().insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
		attach_bearer(&mut request, &TokenSecret::new("fresh-token"));

		let value = request.headers().get(AUTHORIZATION).expect("Header should be present.");

		assert_eq!(value.to_str().expect("Header should be ASCII."), "Bearer fresh-token");
		assert!(value.is_sensitive());
		assert_eq!(request.headers().get_all(AUTHORIZATION).iter().count(), 1);
	}
}
