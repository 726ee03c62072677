//! Storage contracts and built-in store implementations for principal credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{Credential, Principal},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for the credentials a client presents.
///
/// Exactly one credential is kept per [`Principal`]. Implementations must treat a malformed
/// persisted value as absent instead of failing the read, so a corrupted entry degrades to
/// a signed-out state.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the credential stored for `principal`, if any.
	fn fetch(&self, principal: Principal) -> StoreFuture<'_, Option<Credential>>;

	/// Persists or replaces the credential for `principal`.
	fn save(&self, principal: Principal, credential: Credential) -> StoreFuture<'_, ()>;

	/// Removes the credential for `principal`, returning what was stored.
	fn clear(&self, principal: Principal) -> StoreFuture<'_, Option<Credential>>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend while writing.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
