//! Multi-endpoint failover for single requests.
//!
//! [`MultiEndpointExecutor`] runs a request factory against the candidate endpoints in
//! working order. Connectivity failures rotate to the next candidate after a fixed delay.
//! A failure the classifier marks for refresh comes back as [`Execution::RefreshRequested`]
//! and every other failure is returned as an error. A successful response promotes its
//! endpoint to last-known-good.

// crates.io
use ::http::{Method, Request};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	classify::{AttemptFailure, DefaultFailureClassifier, Disposition, FailureClassifier},
	config::ClientConfig,
	decorate,
	endpoint::{self, EndpointRegistry},
	error::{ConfigError, TransportError},
	event::{ClientEvent, EventBus},
	http::{ApiRequest, ApiResponse, HttpTransport},
	obs::trace_event,
};

/// Attempt accounting for one logical request.
///
/// Each execution may try at most `2 × candidates` endpoints; the counter restarts when
/// the same logical request is replayed after a refresh. The auth-replay flag is never
/// reset, so a logical request refreshes its credential at most once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryBudget {
	limit: usize,
	attempts: usize,
	auth_retried: bool,
}
impl RetryBudget {
	/// Creates a budget for a registry with `candidate_count` endpoints.
	pub fn new(candidate_count: usize) -> Self {
		Self { limit: candidate_count.max(1).saturating_mul(2), attempts: 0, auth_retried: false }
	}

	/// Maximum attempts per execution.
	pub fn limit(&self) -> usize {
		self.limit
	}

	/// Attempts consumed by the current execution.
	pub fn attempts(&self) -> usize {
		self.attempts
	}

	/// Attempts left in the current execution.
	pub fn remaining(&self) -> usize {
		self.limit - self.attempts
	}

	/// Whether the logical request already replayed after a refresh.
	pub fn auth_retried(&self) -> bool {
		self.auth_retried
	}

	/// Records the single auth replay.
	pub fn mark_auth_retried(&mut self) {
		self.auth_retried = true;
	}

	/// Resets the attempt counter for a new execution.
	pub fn restart(&mut self) {
		self.attempts = 0;
	}

	fn consume(&mut self) -> bool {
		if self.attempts >= self.limit {
			return false;
		}

		self.attempts += 1;

		true
	}
}

/// Outcome of one [`MultiEndpointExecutor::execute`] run.
#[derive(Debug)]
pub enum Execution {
	/// A candidate answered with a 2xx response.
	Completed(ApiResponse),
	/// The classifier asked for a credential refresh before the request is replayed.
	RefreshRequested(Error),
}
impl Execution {
	/// Returns the response, treating a refresh request as the failure it carries.
	pub fn into_response(self) -> Result<ApiResponse> {
		match self {
			Self::Completed(response) => Ok(response),
			Self::RefreshRequested(err) => Err(err),
		}
	}
}

/// Tries requests across candidate endpoints under a [`RetryBudget`].
pub struct MultiEndpointExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	registry: Arc<EndpointRegistry>,
	classifier: Arc<dyn FailureClassifier>,
	events: EventBus,
	request_timeout: StdDuration,
	retry_delay: StdDuration,
	health_path: String,
}
impl<T> MultiEndpointExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates an executor using the timings and health path of `config`.
	pub fn new(
		transport: Arc<T>,
		registry: Arc<EndpointRegistry>,
		config: &ClientConfig,
		events: EventBus,
	) -> Self {
		Self {
			transport,
			registry,
			classifier: Arc::new(DefaultFailureClassifier),
			events,
			request_timeout: config.request_timeout,
			retry_delay: config.retry_delay,
			health_path: config.health_path.clone(),
		}
	}

	/// Replaces the failure classifier.
	pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Registry shared with the owning client.
	pub fn registry(&self) -> &Arc<EndpointRegistry> {
		&self.registry
	}

	/// Classifier used to route failed attempts.
	pub fn classifier(&self) -> &dyn FailureClassifier {
		self.classifier.as_ref()
	}

	/// Underlying transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Runs `factory` against the candidates until one answers with a 2xx response.
	///
	/// `factory` builds a fresh request for each endpoint it is handed; `token`, when
	/// present, is attached as a bearer header to every attempt. A failure classified as
	/// [`Disposition::RefreshAndReplay`] yields [`Execution::RefreshRequested`]; surfaced
	/// failures return immediately in the client taxonomy. Running out of budget yields
	/// [`Error::Exhausted`] wrapping the last connectivity failure.
	pub async fn execute<F>(
		&self,
		factory: F,
		budget: &mut RetryBudget,
		token: Option<&TokenSecret>,
	) -> Result<Execution>
	where
		F: Fn(&Url) -> Result<ApiRequest>,
	{
		budget.restart();

		let order = self.registry.working_order(&mut rand::rng());

		for endpoint in order.iter().cycle() {
			if !budget.consume() {
				break;
			}

			let mut request = factory(endpoint)?;

			if let Some(token) = token {
				decorate::attach_bearer(&mut request, token);
			}

			let failure = match AttemptFailure::check(self.send(request).await) {
				Ok(response) => {
					self.promote(endpoint);

					return Ok(Execution::Completed(response));
				},
				Err(failure) => failure,
			};
			let ctx = failure.context().with_auth_retried(budget.auth_retried());

			match self.classifier.classify(&ctx) {
				Disposition::RotateEndpoint => {
					let err = failure.into_error();

					trace_event!(
						warn,
						endpoint = %endpoint,
						attempt = budget.attempts(),
						limit = budget.limit(),
						error = %err,
						"endpoint attempt failed; rotating"
					);

					if budget.remaining() == 0 {
						return Err(Error::Exhausted {
							attempts: budget.attempts(),
							last: Box::new(err),
						});
					}
					if !self.retry_delay.is_zero() {
						tokio::time::sleep(self.retry_delay).await;
					}
				},
				Disposition::RefreshAndReplay =>
					return Ok(Execution::RefreshRequested(failure.into_error())),
				Disposition::Surface => return Err(failure.into_error()),
			}
		}

		Err(ConfigError::NoCandidates.into())
	}

	/// Issues the unauthenticated health check against `endpoint`.
	pub async fn probe(&self, endpoint: &Url) -> Result<()> {
		let url = endpoint::resolve(endpoint, &self.health_path)?;
		let request = Request::builder()
			.method(Method::GET)
			.uri(url.as_str())
			.body(Vec::new())
			.map_err(ConfigError::from)?;

		AttemptFailure::check(self.send(request).await)
			.map(|_| ())
			.map_err(AttemptFailure::into_error)
	}

	/// Probes the candidates in working order and promotes the first healthy one.
	pub async fn find_reachable(&self) -> Result<Url> {
		let order = self.registry.working_order(&mut rand::rng());
		let mut last = None;

		for endpoint in &order {
			match self.probe(endpoint).await {
				Ok(()) => {
					self.promote(endpoint);

					return Ok(endpoint.clone());
				},
				Err(err) => {
					trace_event!(debug, endpoint = %endpoint, error = %err, "health probe failed");

					last = Some(err);
				},
			}
		}

		match last {
			Some(last) => Err(Error::Exhausted { attempts: order.len(), last: Box::new(last) }),
			None => Err(ConfigError::NoCandidates.into()),
		}
	}

	async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
		match tokio::time::timeout(self.request_timeout, self.transport.execute(request)).await {
			Ok(outcome) => outcome,
			Err(_) => Err(TransportError::Timeout { after: Some(self.request_timeout) }),
		}
	}

	fn promote(&self, endpoint: &Url) {
		if self.registry.promote(endpoint) {
			trace_event!(debug, endpoint = %endpoint, "promoted last-known-good endpoint");

			self.events.emit(ClientEvent::EndpointPromoted { endpoint: endpoint.clone() });
		}
	}
}
impl<T> Debug for MultiEndpointExecutor<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MultiEndpointExecutor")
			.field("registry", &self.registry)
			.field("request_timeout", &self.request_timeout)
			.field("retry_delay", &self.retry_delay)
			.finish()
	}
}
