//! Resilient backend API client: bearer credentials, single-flight token refresh, and
//! multi-endpoint failover in one crate built for dashboards that must stay connected.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod decorate;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod executor;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Credential,
		client::ApiClient,
		config::ClientConfig,
		http::ReqwestTransport,
		store::{MemoryStore, TokenStore},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ApiClient<ReqwestTransport>;

	/// Builds a configuration for the provided base URLs with short timings so failover tests
	/// finish quickly.
	pub fn test_config<I, S>(endpoints: I) -> ClientConfig
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut builder = ClientConfig::builder()
			.request_timeout(StdDuration::from_secs(2))
			.retry_delay(StdDuration::from_millis(5));

		for endpoint in endpoints {
			let url = Url::parse(endpoint.as_ref()).expect("Test endpoint should parse.");

			builder = builder.endpoint(url);
		}

		builder.build().expect("Test client configuration should be valid.")
	}

	/// Constructs an [`ApiClient`] backed by an in-memory store and the reqwest transport.
	pub fn build_reqwest_test_client(
		config: ClientConfig,
	) -> (ReqwestTestClient, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let client = ApiClient::with_transport(config, store, ReqwestTransport::default());

		(client, store_backend)
	}

	/// Builds a credential fixture that expires `expires_in` from now.
	pub fn credential_fixture(
		access: &str,
		refresh: Option<&str>,
		expires_in: Duration,
	) -> Credential {
		let now = OffsetDateTime::now_utc();
		let mut builder = Credential::builder()
			.access_token(access)
			.issued_at(now - Duration::minutes(1))
			.expires_at(now + expires_in);

		if let Some(value) = refresh {
			builder = builder.refresh_token(value);
		}

		builder.build().expect("Credential fixture should build successfully.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
