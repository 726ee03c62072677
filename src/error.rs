//! Client-level error taxonomy shared by the store, transport, refresh, and failover layers.

// self
use crate::{_prelude::*, auth::Principal};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
///
/// Recoverable variants ([`Error::Connectivity`], [`Error::AuthExpired`]) are handled inside
/// the client and only reach callers wrapped in [`Error::Exhausted`] or once recovery itself
/// failed. Everything else is terminal.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure before any HTTP response arrived (DNS, refused, reset, timeout).
	#[error(transparent)]
	Connectivity(#[from] TransportError),

	/// Backend rejected the bearer token; recoverable once through a refresh.
	#[error("Backend rejected the access token with HTTP 401.")]
	AuthExpired,
	/// Credential could not be recovered; the caller must re-authenticate.
	#[error("Re-authentication required: {reason}.")]
	AuthRejected {
		/// Principal whose credential was rejected, when one was active.
		principal: Option<Principal>,
		/// Client- or backend-supplied reason string.
		reason: String,
	},
	/// Backend refused access to the resource (HTTP 403 or 404).
	#[error("Backend refused the resource with HTTP {status}.")]
	Resource {
		/// HTTP status code returned by the backend.
		status: u16,
		/// Truncated response body, when one was returned.
		body: Option<String>,
	},
	/// Backend answered with an HTTP error that has no recovery path.
	#[error("Backend returned HTTP {status}.")]
	UnexpectedStatus {
		/// HTTP status code returned by the backend.
		status: u16,
		/// Truncated response body, when one was returned.
		body: Option<String>,
	},
	/// Every candidate endpoint failed within the retry budget.
	#[error("All candidate endpoints failed after {attempts} attempts.")]
	Exhausted {
		/// Number of attempts performed before giving up.
		attempts: usize,
		/// Last failure observed, kept for diagnostics.
		#[source]
		last: Box<Error>,
	},
	/// Response body could not be decoded into the requested type.
	#[error("Backend returned a body that could not be decoded.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the decoded response.
		status: u16,
	},
}
impl Error {
	/// Builds [`Error::AuthRejected`], dropping trailing periods the message template adds.
	pub fn auth_rejected(principal: Option<Principal>, reason: impl Into<String>) -> Self {
		let mut reason = reason.into();
		let kept = reason.trim_end_matches('.').len();

		reason.truncate(kept);

		Self::AuthRejected { principal, reason }
	}

	/// Returns `true` for failures that happened before the backend produced a response.
	pub fn is_connectivity(&self) -> bool {
		matches!(self, Self::Connectivity(_))
	}

	/// Returns `true` when the caller must sign in again.
	pub fn requires_reauthentication(&self) -> bool {
		matches!(self, Self::AuthRejected { .. })
	}

	/// HTTP status code attached to the failure, if the backend answered.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::AuthExpired => Some(401),
			Self::Resource { status, .. }
			| Self::UnexpectedStatus { status, .. }
			| Self::Decode { status, .. } => Some(*status),
			Self::Exhausted { last, .. } => last.status(),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] ::http::Error),
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Serialize(#[source] serde_json::Error),

	/// No candidate endpoint was configured.
	#[error("At least one candidate endpoint is required.")]
	NoCandidates,
	/// A configured endpoint cannot be parsed.
	#[error("Endpoint `{value}` is not a valid URL.")]
	InvalidEndpoint {
		/// Raw value that failed to parse.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoint cannot serve as a base address.
	#[error("Endpoint `{endpoint}` cannot be used as a base address.")]
	NotABase {
		/// Offending endpoint.
		endpoint: String,
	},
	/// The designated default endpoint is not part of the candidate list.
	#[error("Default endpoint `{endpoint}` is not a configured candidate.")]
	DefaultNotCandidate {
		/// Offending endpoint.
		endpoint: String,
	},
	/// Outbound calls need a finite, non-zero timeout.
	#[error("The request timeout must be greater than zero.")]
	ZeroTimeout,
	/// Required environment variable is missing.
	#[error("Environment variable `{name}` is not set.")]
	MissingVariable {
		/// Variable name.
		name: &'static str,
	},
	/// Environment variable holds an unusable value.
	#[error("Environment variable `{name}` has an invalid value: {value}.")]
	InvalidVariable {
		/// Variable name.
		name: &'static str,
		/// Raw value that failed validation.
		value: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Attempt did not complete within the per-call timeout.
	#[error("Request timed out before the backend responded.")]
	Timeout {
		/// Timeout that elapsed, when the client enforced it.
		after: Option<StdDuration>,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` if the failure was a timeout.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout { after: None } } else { Self::network(e) }
	}
}
