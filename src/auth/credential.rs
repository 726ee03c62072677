//! Credential records, lifecycle helpers, and builders.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Current lifecycle status for a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Credential is not yet valid because the issued-at instant is in the future.
	Pending,
	/// Credential is currently valid.
	Active,
	/// Credential exceeded its expiry instant.
	Expired,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when a token cannot travel inside an `Authorization` header.
	#[error("The {which} token contains characters that are not allowed in a header.")]
	InvalidToken {
		/// Which token failed validation.
		which: &'static str,
	},
	/// Issued when no expiry could be determined.
	#[error("Expiry requires expires_at, expires_in, a JWT exp claim, or a default lifetime.")]
	MissingExpiry,
	/// Issued when the computed expiry falls outside the representable date range.
	#[error("Expiry lies outside the supported date range.")]
	ExpiryOutOfRange,
}

/// Access/refresh token pair owned by one principal.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the backend issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Issued-at instant.
	pub issued_at: OffsetDateTime,
	/// Expiry instant of the access token.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Returns a builder for constructing credentials.
	pub fn builder() -> CredentialBuilder {
		CredentialBuilder::default()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		if instant < self.issued_at {
			return CredentialStatus::Pending;
		}
		if instant >= self.expires_at {
			return CredentialStatus::Expired;
		}

		CredentialStatus::Active
	}

	/// Convenience helper that checks the status using the current UTC instant.
	pub fn status(&self) -> CredentialStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if the credential has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Expired)
	}

	/// Returns `true` if the credential is expired or expires within `skew` of `instant`.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
		let skew = if skew.is_negative() { Duration::ZERO } else { skew };

		self.expires_at - instant <= skew
	}

	/// Returns `true` if a refresh token is available.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.is_some()
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug, Default)]
pub struct CredentialBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	default_lifetime: Option<Duration>,
}
impl CredentialBuilder {
	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Convenience helper that stamps `issued_at` with the current clock.
	pub fn issued_now(self) -> Self {
		self.issued_at(OffsetDateTime::now_utc())
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Lifetime applied when neither an explicit expiry nor a JWT `exp` claim is available.
	pub fn default_lifetime(mut self, duration: Duration) -> Self {
		self.default_lifetime = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an optional refresh token value.
	pub fn maybe_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	///
	/// Expiry resolution order: `expires_at`, then `issued_at + expires_in`, then the access
	/// token's JWT `exp` claim, then `issued_at + default_lifetime`.
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;

		validate_header_token("access", access_token.expose())?;

		if let Some(refresh) = self.refresh_token.as_ref() {
			validate_header_token("refresh", refresh.expose())?;
		}

		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => offset(issued_at, delta)?,
			(None, None) => match (jwt_expiry(access_token.expose()), self.default_lifetime) {
				(Some(instant), _) => instant,
				(None, Some(lifetime)) => offset(issued_at, lifetime)?,
				(None, None) => return Err(CredentialBuilderError::MissingExpiry),
			},
		};

		Ok(Credential { access_token, refresh_token: self.refresh_token, issued_at, expires_at })
	}
}

#[derive(Deserialize)]
struct JwtClaims {
	exp: Option<i64>,
}

/// Decodes the `exp` claim of a JWT without verifying its signature.
///
/// Signature checks belong to the backend; the client only needs a hint for when to
/// refresh proactively.
pub fn jwt_expiry(token: &str) -> Option<OffsetDateTime> {
	let mut segments = token.split('.');
	let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);

	if segments.next().is_some() {
		return None;
	}

	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
	let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;

	OffsetDateTime::from_unix_timestamp(claims.exp?).ok()
}

fn offset(
	issued_at: OffsetDateTime,
	delta: Duration,
) -> Result<OffsetDateTime, CredentialBuilderError> {
	issued_at.checked_add(delta).ok_or(CredentialBuilderError::ExpiryOutOfRange)
}

fn validate_header_token(which: &'static str, token: &str) -> Result<(), CredentialBuilderError> {
	if token.is_empty() {
		return Err(if which == "access" {
			CredentialBuilderError::MissingAccessToken
		} else {
			CredentialBuilderError::InvalidToken { which }
		});
	}
	if token.bytes().any(|b| !b.is_ascii_graphic()) {
		return Err(CredentialBuilderError::InvalidToken { which });
	}

	Ok(())
}
