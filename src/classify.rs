//! Failure classification hooks that route failed attempts.
//!
//! Every failed attempt is normalized at the transport boundary into an [`AttemptFailure`],
//! summarized as a [`FailureContext`], and handed to a [`FailureClassifier`] which decides
//! whether the executor rotates to another endpoint, the client refreshes the credential and
//! replays, or the failure surfaces to the caller.

// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::{self, ApiResponse},
};

/// Routing decision for one failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// Transport failure; try the next candidate endpoint.
	RotateEndpoint,
	/// Access token rejected; refresh once and replay the request.
	RefreshAndReplay,
	/// No recovery path; return the error to the caller.
	Surface,
}

/// Primitive description of a failed attempt passed to [`FailureClassifier::classify`].
///
/// The struct keeps only status codes and flags so classifiers never inspect transport
/// specific error types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FailureContext {
	/// HTTP status code returned by the backend, when a response arrived.
	pub http_status: Option<u16>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
	/// Indicates whether the logical request was already replayed after a refresh.
	pub auth_retried: bool,
}
impl FailureContext {
	/// Context for a transport-level failure.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Self::default() }
	}

	/// Context for an HTTP error response.
	pub fn status(status: u16) -> Self {
		Self { http_status: Some(status), ..Self::default() }
	}

	/// Marks whether an auth replay already happened.
	pub fn with_auth_retried(mut self, auth_retried: bool) -> Self {
		self.auth_retried = auth_retried;

		self
	}
}

/// Strategy hook that decides how the client reacts to a failed attempt.
pub trait FailureClassifier: Send + Sync {
	/// Chooses the disposition for the failure described by `ctx`.
	fn classify(&self, ctx: &FailureContext) -> Disposition;
}

/// Default routing table.
///
/// | Failure | Disposition |
/// |---|---|
/// | transport (DNS, refused, reset, timeout) | [`Disposition::RotateEndpoint`] |
/// | 401 before any replay | [`Disposition::RefreshAndReplay`] |
/// | 401 after a replay | [`Disposition::Surface`] |
/// | 403, 404, anything else | [`Disposition::Surface`] |
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFailureClassifier;
impl FailureClassifier for DefaultFailureClassifier {
	fn classify(&self, ctx: &FailureContext) -> Disposition {
		if ctx.network_error {
			return Disposition::RotateEndpoint;
		}

		match ctx.http_status {
			Some(401) if !ctx.auth_retried => Disposition::RefreshAndReplay,
			_ => Disposition::Surface,
		}
	}
}

/// Failed attempt normalized at the transport boundary.
#[derive(Debug)]
pub enum AttemptFailure {
	/// No HTTP response arrived.
	Transport(TransportError),
	/// The backend answered with a non-success status.
	Status {
		/// HTTP status code.
		status: u16,
		/// Truncated response body.
		body: Option<String>,
	},
}
impl AttemptFailure {
	/// Normalizes a transport outcome; successful 2xx responses yield `Ok`.
	pub fn check(outcome: Result<ApiResponse, TransportError>) -> Result<ApiResponse, Self> {
		match outcome {
			Ok(response) if response.status().is_success() => Ok(response),
			Ok(response) => Err(Self::Status {
				status: response.status().as_u16(),
				body: http::body_preview(response.body()),
			}),
			Err(err) => Err(Self::Transport(err)),
		}
	}

	/// Summarizes the failure for a classifier.
	pub fn context(&self) -> FailureContext {
		match self {
			Self::Transport(_) => FailureContext::network_failure(),
			Self::Status { status, .. } => FailureContext::status(*status),
		}
	}

	/// Converts the failure into the client error taxonomy.
	pub fn into_error(self) -> Error {
		match self {
			Self::Transport(err) => Error::Connectivity(err),
			Self::Status { status: 401, .. } => Error::AuthExpired,
			Self::Status { status: status @ (403 | 404), body } => Error::Resource { status, body },
			Self::Status { status, body } => Error::UnexpectedStatus { status, body },
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: u16, body: &str) -> ApiResponse {
		let mut response = ApiResponse::new(body.as_bytes().to_vec());

		*response.status_mut() =
			::http::StatusCode::from_u16(status).expect("Status fixture should be valid.");

		response
	}

	#[test]
	fn default_table_routes_each_failure_kind() {
		let classifier = DefaultFailureClassifier;

		assert_eq!(
			classifier.classify(&FailureContext::network_failure()),
			Disposition::RotateEndpoint
		);
		assert_eq!(
			classifier.classify(&FailureContext::status(401)),
			Disposition::RefreshAndReplay
		);
		assert_eq!(
			classifier.classify(&FailureContext::status(401).with_auth_retried(true)),
			Disposition::Surface
		);

		for status in [400, 403, 404, 409, 429, 500, 503] {
			assert_eq!(
				classifier.classify(&FailureContext::status(status)),
				Disposition::Surface,
				"HTTP {status} must surface without recovery."
			);
		}
	}

	#[test]
	fn resource_statuses_never_rotate_even_after_replay() {
		let classifier = DefaultFailureClassifier;

		for status in [403, 404] {
			for retried in [false, true] {
				let ctx = FailureContext::status(status).with_auth_retried(retried);

				assert_eq!(classifier.classify(&ctx), Disposition::Surface);
			}
		}
	}

	#[test]
	fn check_normalizes_responses_into_taxonomy() {
		assert!(AttemptFailure::check(Ok(response(204, ""))).is_ok());

		let forbidden = AttemptFailure::check(Ok(response(403, "{\"error\":\"forbidden\"}")))
			.expect_err("403 must be a failure.");

		assert_eq!(forbidden.context(), FailureContext::status(403));
		assert!(matches!(
			forbidden.into_error(),
			Error::Resource { status: 403, body: Some(ref body) } if body.contains("forbidden")
		));

		let expired =
			AttemptFailure::check(Ok(response(401, ""))).expect_err("401 must be a failure.");

		assert!(matches!(expired.into_error(), Error::AuthExpired));

		let upstream =
			AttemptFailure::check(Ok(response(502, "bad gateway"))).expect_err("502 must fail.");

		assert!(matches!(upstream.into_error(), Error::UnexpectedStatus { status: 502, .. }));

		let timeout = AttemptFailure::check(Err(TransportError::Timeout { after: None }))
			.expect_err("Transport errors must be failures.");

		assert!(timeout.context().network_error);
		assert!(timeout.into_error().is_connectivity());
	}
}
