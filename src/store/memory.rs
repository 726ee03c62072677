//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{Credential, Principal},
	store::{StoreFuture, TokenStore},
};

type StoreMap = Arc<RwLock<HashMap<Principal, Credential>>>;

/// Thread-safe storage backend that keeps credentials in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the stored credential without going through the async contract.
	pub fn snapshot(&self, principal: Principal) -> Option<Credential> {
		self.0.read().get(&principal).cloned()
	}
}
impl TokenStore for MemoryStore {
	fn fetch(&self, principal: Principal) -> StoreFuture<'_, Option<Credential>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(&principal).cloned()) })
	}

	fn save(&self, principal: Principal, credential: Credential) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(principal, credential);

			Ok(())
		})
	}

	fn clear(&self, principal: Principal) -> StoreFuture<'_, Option<Credential>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(&principal)) })
	}
}
