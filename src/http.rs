//! Transport primitives for backend calls.
//!
//! The module exposes [`HttpTransport`], the client's only dependency on an HTTP stack,
//! together with the [`ApiRequest`]/[`ApiResponse`] aliases it exchanges. Implementations
//! report failures that happen before any HTTP response exists as [`TransportError`]; every
//! response that does arrive (including 4xx/5xx) is returned as `Ok` so the failure
//! classifier sees the status code.

// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use std::ops::Deref;

/// Outbound request with a fully buffered body.
pub type ApiRequest = ::http::Request<Vec<u8>>;
/// Backend response with a fully buffered body.
pub type ApiResponse = ::http::Response<Vec<u8>>;
/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing backend calls.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// executor, the refresher, and health probes. The client enforces its own per-call timeout
/// around [`execute`](HttpTransport::execute), so implementations need not configure one.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the response.
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a transport whose connection pool never waits longer than `connect_timeout`
	/// to establish a connection.
	pub fn with_connect_timeout(
		connect_timeout: StdDuration,
	) -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder().connect_timeout(connect_timeout).build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request)?;
			let response = client.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();
			let mut converted = ApiResponse::new(body);

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

/// Returns a preview of a response body suitable for error messages.
pub(crate) fn body_preview(body: &[u8]) -> Option<String> {
	const BODY_PREVIEW_LIMIT: usize = 256;

	if body.is_empty() {
		return None;
	}

	let text = String::from_utf8_lossy(body);

	if text.chars().count() <= BODY_PREVIEW_LIMIT {
		return Some(text.into_owned());
	}

	let mut buf: String = text.chars().take(BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	Some(buf)
}
