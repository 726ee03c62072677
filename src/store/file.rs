//! Simple file-backed [`TokenStore`] for desktop shells and long-running bots.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, Principal},
	obs::trace_event,
	store::{StoreError, StoreFuture, TokenStore},
};

type Snapshot = BTreeMap<String, serde_json::Value>;

/// Persists credentials to a JSON file after each mutation.
///
/// Entries are stored as raw JSON values keyed by [`Principal::storage_key`] and decoded on
/// read, so one corrupted entry never hides the other principal's credential.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	///
	/// A snapshot that cannot be parsed is discarded and the store starts empty. Entries
	/// whose key names no [`Principal`] are dropped and disappear on the next write.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(Snapshot::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(Snapshot::new());
		}

		match serde_json::from_slice::<Snapshot>(&bytes) {
			Ok(mut snapshot) => {
				snapshot.retain(|key, _| {
					let known = Principal::from_storage_key(key).is_some();

					if !known {
						trace_event!(
							debug,
							path = %path.display(),
							key = key.as_str(),
							"dropping snapshot entry with an unknown key"
						);
					}

					known
				});

				Ok(snapshot)
			},
			Err(e) => {
				trace_event!(
					warn,
					path = %path.display(),
					error = %e,
					"discarding malformed credential snapshot"
				);

				#[cfg(not(feature = "tracing"))]
				let _ = e;

				Ok(Snapshot::new())
			},
		}
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn decode(principal: Principal, value: &serde_json::Value) -> Option<Credential> {
		match Credential::deserialize(value) {
			Ok(credential) => Some(credential),
			Err(e) => {
				trace_event!(
					warn,
					principal = principal.as_str(),
					error = %e,
					"treating malformed stored credential as absent"
				);

				#[cfg(not(feature = "tracing"))]
				let _ = (principal, e);

				None
			},
		}
	}
}
impl TokenStore for FileStore {
	fn fetch(&self, principal: Principal) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move {
			let guard = self.inner.read();

			Ok(guard.get(principal.storage_key()).and_then(|value| Self::decode(principal, value)))
		})
	}

	fn save(&self, principal: Principal, credential: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let value = serde_json::to_value(&credential).map_err(|e| {
				StoreError::Serialization { message: format!("Failed to encode credential: {e}") }
			})?;
			let mut guard = self.inner.write();

			guard.insert(principal.storage_key().to_owned(), value);
			self.persist_locked(&guard)?;

			Ok(())
		})
	}

	fn clear(&self, principal: Principal) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let removed = guard.remove(principal.storage_key());

			if removed.is_some() {
				self.persist_locked(&guard)?;
			}

			Ok(removed.and_then(|value| Self::decode(principal, &value)))
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;

	fn temp_path(tag: &str) -> PathBuf {
		let unique = format!(
			"resilient_api_client_file_store_{tag}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn build_credential(access: &str) -> Credential {
		Credential::builder()
			.access_token(access)
			.refresh_token("refresh-token")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Failed to build file-store test credential.")
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path("round_trip");
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let credential = build_credential("access-token");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(Principal::Admin, credential.clone()))
			.expect("Failed to save fixture credential to file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.fetch(Principal::Admin))
			.expect("Failed to fetch fixture credential from file store.")
			.expect("File store lost credential after reopen.");

		assert_eq!(fetched.access_token.expose(), credential.access_token.expose());
		assert!(
			rt.block_on(reopened.fetch(Principal::User))
				.expect("Fetching an absent principal should succeed.")
				.is_none()
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn malformed_entries_read_as_absent() {
		let path = temp_path("malformed");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let valid = serde_json::to_value(build_credential("admin-access"))
			.expect("Credential fixture should encode.");
		let snapshot = serde_json::json!({
			"user_credential": { "access_token": 42 },
			"admin_credential": valid,
		});

		fs::write(&path, serde_json::to_vec(&snapshot).expect("Snapshot should encode."))
			.expect("Failed to seed malformed snapshot.");

		let store = FileStore::open(&path).expect("Malformed entries must not fail open.");
		let user = rt.block_on(store.fetch(Principal::User)).expect("Fetch must not fail.");
		let admin = rt.block_on(store.fetch(Principal::Admin)).expect("Fetch must not fail.");

		assert!(user.is_none());
		assert_eq!(admin.map(|c| c.access_token.expose().to_owned()), Some("admin-access".into()));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn unknown_entries_are_dropped_on_the_next_write() {
		let path = temp_path("unknown_keys");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");
		let valid = serde_json::to_value(build_credential("admin-access"))
			.expect("Credential fixture should encode.");
		let snapshot = serde_json::json!({ "legacy_session": "opaque", "admin_credential": valid });

		fs::write(&path, serde_json::to_vec(&snapshot).expect("Snapshot should encode."))
			.expect("Failed to seed snapshot with an unknown key.");

		let store = FileStore::open(&path).expect("Unknown keys must not fail open.");

		rt.block_on(store.save(Principal::User, build_credential("user-access")))
			.expect("Saving should succeed.");

		let raw = fs::read_to_string(&path).expect("Snapshot should be readable.");

		assert!(!raw.contains("legacy_session"));
		assert!(raw.contains("admin_credential"));
		assert!(raw.contains("user_credential"));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn unparsable_snapshot_starts_empty() {
		let path = temp_path("garbage");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		fs::write(&path, b"{ definitely not json").expect("Failed to seed garbage snapshot.");

		let store = FileStore::open(&path).expect("Garbage snapshot must not fail open.");

		assert!(rt.block_on(store.fetch(Principal::User)).expect("Fetch must not fail.").is_none());

		rt.block_on(store.save(Principal::User, build_credential("fresh")))
			.expect("Saving over a garbage snapshot should succeed.");

		let cleared = rt.block_on(store.clear(Principal::User)).expect("Clear should succeed.");

		assert_eq!(cleared.map(|c| c.access_token.expose().to_owned()), Some("fresh".into()));

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}
