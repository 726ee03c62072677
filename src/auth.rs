//! Auth-domain principals, credential records, and redacted secrets.

pub mod credential;
pub mod principal;
pub mod secret;

pub use credential::*;
pub use principal::*;
pub use secret::*;
