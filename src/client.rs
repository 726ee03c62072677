//! The client facade tying credential decoration, refresh, and failover together.
//!
//! Every call follows the same pipeline: the [`RequestDecorator`] resolves the active
//! credential (refreshing it first when it is about to expire), the
//! [`MultiEndpointExecutor`] runs the request across the candidate endpoints, and any
//! failure the [`FailureClassifier`] marks for refresh goes to the [`TokenRefresher`] for a
//! single replay. A credential that cannot be recovered is cleared from the store and
//! reported as [`Error::AuthRejected`]. A proactive refresh that fails while the access token
//! is still valid keeps the session.

// crates.io
use ::http::{
	HeaderMap, Method, Request,
	header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue},
};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;
use crate::{
	_prelude::*,
	auth::{Credential, Principal, TokenSecret},
	classify::FailureClassifier,
	config::ClientConfig,
	decorate::{ActiveCredential, RequestDecorator},
	endpoint::{self, EndpointRegistry},
	error::ConfigError,
	event::{ClientEvent, EventBus},
	executor::{Execution, MultiEndpointExecutor, RetryBudget},
	http::{ApiRequest, ApiResponse, HttpTransport},
	obs::{self, OpKind, OpOutcome, OpSpan, trace_event},
	refresh::{RefreshMetrics, RefreshRequest, RefreshedTokens, TokenRefresher},
	store::TokenStore,
};

const APPLICATION_JSON: &str = "application/json";

/// Description of one logical backend call, replayable against any endpoint.
#[derive(Clone, Debug)]
pub struct ApiCall {
	method: Method,
	path: String,
	headers: HeaderMap,
	body: Vec<u8>,
	anonymous: bool,
}
impl ApiCall {
	/// Creates a call for `method` on `path`, relative to the endpoint base.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: HeaderMap::new(),
			body: Vec::new(),
			anonymous: false,
		}
	}

	/// `GET path`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// `POST path`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// `PUT path`.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// `DELETE path`.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		self.body = serde_json::to_vec(body).map_err(ConfigError::Serialize)?;
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

		Ok(self)
	}

	/// Adds a header sent with every attempt.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Sends the call without a bearer credential and without refresh handling.
	pub fn anonymous(mut self) -> Self {
		self.anonymous = true;

		self
	}

	/// HTTP method of the call.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Path relative to the endpoint base.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Whether the call skips credential handling.
	pub fn is_anonymous(&self) -> bool {
		self.anonymous
	}

	/// Binds the call to `base`, producing a fresh request.
	pub fn build(&self, base: &Url) -> Result<ApiRequest> {
		let url = endpoint::resolve(base, &self.path)?;
		let mut request = Request::builder()
			.method(self.method.clone())
			.uri(url.as_str())
			.header(ACCEPT, APPLICATION_JSON)
			.body(self.body.clone())
			.map_err(ConfigError::from)?;

		for (name, value) in &self.headers {
			request.headers_mut().insert(name, value.clone());
		}

		Ok(request)
	}
}

/// Resilient backend client owned by one application instance.
pub struct ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	config: Arc<ClientConfig>,
	store: Arc<dyn TokenStore>,
	decorator: RequestDecorator,
	refresher: Arc<TokenRefresher>,
	executor: Arc<MultiEndpointExecutor<T>>,
	events: EventBus,
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client backed by a reqwest transport whose connect timeout matches the
	/// configured request timeout.
	pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
		let transport = ReqwestTransport::with_connect_timeout(config.request_timeout)?;

		Ok(Self::with_transport(config, store, transport))
	}
}
impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		config: ClientConfig,
		store: Arc<dyn TokenStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let events = EventBus::new();
		let registry = Arc::new(config.registry());
		let executor =
			MultiEndpointExecutor::new(transport.into(), registry, &config, events.clone());
		let refresher = TokenRefresher::new(store.clone(), config.default_token_lifetime)
			.with_events(events.clone());

		Self {
			decorator: RequestDecorator::new(store.clone(), config.principal_policy),
			config: Arc::new(config),
			store,
			refresher: Arc::new(refresher),
			executor: Arc::new(executor),
			events,
		}
	}

	/// Replaces the failure classifier. Call before the client is cloned.
	pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
		let executor = MultiEndpointExecutor::new(
			self.executor.transport().clone(),
			self.executor.registry().clone(),
			&self.config,
			self.events.clone(),
		)
		.with_classifier(classifier);

		self.executor = Arc::new(executor);

		self
	}

	/// Validated configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Endpoint registry shared by every call of this client.
	pub fn registry(&self) -> &EndpointRegistry {
		self.executor.registry()
	}

	/// Refresh counters for this client.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.refresher.metrics()
	}

	/// Subscribes to [`ClientEvent`] notifications.
	pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
		self.events.subscribe()
	}

	/// Stores `credential` as the session of `principal`.
	pub async fn sign_in(&self, principal: Principal, credential: Credential) -> Result<()> {
		self.store.save(principal, credential).await?;

		trace_event!(info, principal = principal.as_str(), "signed in");

		Ok(())
	}

	/// Removes the session of `principal`, returning the credential that was stored.
	pub async fn sign_out(&self, principal: Principal) -> Result<Option<Credential>> {
		let removed = self.store.clear(principal).await?;

		trace_event!(info, principal = principal.as_str(), "signed out");

		Ok(removed)
	}

	/// Credential the next call would present, without refreshing it.
	pub async fn active_credential(&self) -> Result<Option<ActiveCredential>> {
		self.decorator.active().await
	}

	/// Sends `call` through the full pipeline and returns the 2xx response.
	pub async fn send(&self, call: ApiCall) -> Result<ApiResponse> {
		const KIND: OpKind = OpKind::Request;

		let span = OpSpan::new(KIND, "send");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(self.send_inner(&call)).await;

		obs::record_result(KIND, &result);

		result
	}

	/// Sends `call` and decodes the JSON response body.
	pub async fn send_json<R>(&self, call: ApiCall) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let response = self.send(call).await?;

		decode_json(&response)
	}

	/// `GET path`, decoding the JSON response.
	pub async fn get_json<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send_json(ApiCall::get(path)).await
	}

	/// `POST path` with a JSON `body`, decoding the JSON response.
	pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.send_json(ApiCall::post(path).json(body)?).await
	}

	/// `PUT path` with a JSON `body`, decoding the JSON response.
	pub async fn put_json<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.send_json(ApiCall::put(path).json(body)?).await
	}

	/// `DELETE path`, discarding the response body.
	pub async fn delete(&self, path: &str) -> Result<()> {
		self.send(ApiCall::delete(path)).await.map(|_| ())
	}

	/// Health-checks a single endpoint.
	pub async fn probe(&self, endpoint: &Url) -> Result<()> {
		let span = OpSpan::new(OpKind::Probe, "probe");
		let result = span.instrument(self.executor.probe(endpoint)).await;

		obs::record_result(OpKind::Probe, &result);

		result
	}

	/// Probes the candidates and promotes the first healthy one.
	pub async fn find_reachable(&self) -> Result<Url> {
		let span = OpSpan::new(OpKind::Probe, "find_reachable");
		let result = span.instrument(self.executor.find_reachable()).await;

		obs::record_result(OpKind::Probe, &result);

		result
	}

	async fn send_inner(&self, call: &ApiCall) -> Result<ApiResponse> {
		let mut budget = RetryBudget::new(self.executor.registry().len());
		let mut active = if call.is_anonymous() { None } else { self.authorize().await? };

		loop {
			let token = active.as_ref().map(ActiveCredential::access_token);
			let (err, replay) = match self
				.executor
				.execute(|endpoint| call.build(endpoint), &mut budget, token)
				.await
			{
				Ok(Execution::Completed(response)) => return Ok(response),
				Ok(Execution::RefreshRequested(err)) => (err, !budget.auth_retried()),
				Err(err @ Error::AuthExpired) => (err, false),
				Err(err) => return Err(err),
			};

			match (active.take(), replay) {
				(Some(current), true) => {
					trace_event!(
						debug,
						principal = current.principal.as_str(),
						error = %err,
						"request needs a fresh credential; refreshing and replaying"
					);

					budget.mark_auth_retried();

					active = Some(self.refresh(current).await?);
				},
				(Some(current), false) => {
					let reason = if budget.auth_retried() {
						"backend rejected the refreshed access token"
					} else {
						"backend rejected the access token"
					};

					return Err(self.reject(current.principal, reason).await);
				},
				(None, _) if call.is_anonymous() => return Err(err),
				(None, _) => return Err(Error::auth_rejected(None, "no credential is available")),
			}
		}
	}

	async fn authorize(&self) -> Result<Option<ActiveCredential>> {
		let Some(active) = self.decorator.active().await? else {
			return Ok(None);
		};
		let now = OffsetDateTime::now_utc();
		let credential = &active.credential;

		if credential.is_expired_at(now) {
			return self.refresh(active).await.map(Some);
		}
		if credential.can_refresh() && credential.needs_refresh_at(now, self.config.refresh_skew) {
			// The current token stays usable until it expires or the backend rejects it.
			match self.renew(&active).await {
				Ok(credential) =>
					return Ok(Some(ActiveCredential { principal: active.principal, credential })),
				Err(err) => {
					trace_event!(
						warn,
						principal = active.principal.as_str(),
						error = %err,
						"proactive refresh failed; keeping the current access token"
					);

					#[cfg(not(feature = "tracing"))]
					let _ = err;
				},
			}
		}

		Ok(Some(active))
	}

	async fn refresh(&self, current: ActiveCredential) -> Result<ActiveCredential> {
		let principal = current.principal;

		match self.renew(&current).await {
			Ok(credential) => Ok(ActiveCredential { principal, credential }),
			Err(Error::AuthRejected { reason, .. }) => Err(self.reject(principal, reason).await),
			Err(other) => Err(self.reject(principal, other.to_string()).await),
		}
	}

	async fn renew(&self, current: &ActiveCredential) -> Result<Credential> {
		self.refresher
			.refresh(current.principal, &current.credential, |principal, refresh_token| {
				self.exchange(principal, refresh_token)
			})
			.await
	}

	async fn exchange(
		&self,
		principal: Principal,
		refresh_token: TokenSecret,
	) -> Result<RefreshedTokens> {
		let call = ApiCall::post(self.config.refresh_path(principal))
			.json(&RefreshRequest { refresh_token: refresh_token.expose() })?
			.anonymous();
		let mut budget = RetryBudget::new(self.executor.registry().len());
		let response = self
			.executor
			.execute(|endpoint| call.build(endpoint), &mut budget, None)
			.await?
			.into_response()?;

		decode_json(&response)
	}

	async fn reject(&self, principal: Principal, reason: impl Into<String>) -> Error {
		match self.store.clear(principal).await {
			Ok(Some(_)) => {
				trace_event!(
					warn,
					principal = principal.as_str(),
					"credential cleared; re-authentication required"
				);

				self.events.emit(ClientEvent::ReauthenticationRequired { principal });
			},
			Ok(None) => {},
			Err(err) => {
				trace_event!(
					warn,
					principal = principal.as_str(),
					error = %err,
					"failed to clear rejected credential"
				);
			},
		}

		Error::auth_rejected(Some(principal), reason)
	}
}
impl<T> Clone for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			store: self.store.clone(),
			decorator: self.decorator.clone(),
			refresher: self.refresher.clone(),
			executor: self.executor.clone(),
			events: self.events.clone(),
		}
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("config", &self.config)
			.field("decorator", &self.decorator)
			.field("refresher", &self.refresher)
			.finish()
	}
}

/// Decodes a JSON response body; an empty body decodes as `null`.
pub fn decode_json<R>(response: &ApiResponse) -> Result<R>
where
	R: DeserializeOwned,
{
	let body = if response.body().is_empty() { b"null".as_slice() } else { response.body() };
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::Decode { source, status: response.status().as_u16() })
}
