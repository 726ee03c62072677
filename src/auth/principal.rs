//! Principal identities and the policy that picks the active one.

// self
use crate::_prelude::*;

/// Authenticated identity whose credential a client presents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Principal {
	/// Ordinary end-user session.
	User,
	/// Administrator session.
	Admin,
}
impl Principal {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Principal::User => "user",
			Principal::Admin => "admin",
		}
	}

	/// Key under which the principal's credential is persisted.
	pub const fn storage_key(self) -> &'static str {
		match self {
			Principal::User => "user_credential",
			Principal::Admin => "admin_credential",
		}
	}

	/// Resolves a principal from its persisted storage key.
	pub fn from_storage_key(key: &str) -> Option<Self> {
		match key {
			"user_credential" => Some(Principal::User),
			"admin_credential" => Some(Principal::Admin),
			_ => None,
		}
	}
}
impl Display for Principal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Principal {
	type Err = UnknownPrincipal;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.eq_ignore_ascii_case("user") {
			Ok(Principal::User)
		} else if s.eq_ignore_ascii_case("admin") {
			Ok(Principal::Admin)
		} else {
			Err(UnknownPrincipal(s.to_owned()))
		}
	}
}

/// Error returned when parsing an unknown principal label.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unknown principal `{0}`.")]
pub struct UnknownPrincipal(pub String);

/// Decides which stored credential is current for a client instance.
///
/// The policy is fixed when the client is configured so call sites never re-derive the
/// principal from whatever happens to be in the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalPolicy {
	/// Use the user credential when present, otherwise the admin credential.
	#[default]
	PreferUser,
	/// Only ever use the given principal's credential.
	Fixed(Principal),
}
impl PrincipalPolicy {
	/// Principals to consult, in order of preference.
	pub fn candidates(self) -> &'static [Principal] {
		match self {
			PrincipalPolicy::PreferUser => &[Principal::User, Principal::Admin],
			PrincipalPolicy::Fixed(Principal::User) => &[Principal::User],
			PrincipalPolicy::Fixed(Principal::Admin) => &[Principal::Admin],
		}
	}
}
