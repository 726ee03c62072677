//! Single-flight credential refresh with a FIFO waiter queue.
//!
//! [`TokenRefresher`] is a two-state machine (`Idle`, `Refreshing`) owned by one client. The
//! first caller that needs a new access token flips the state to `Refreshing` before any
//! `.await`, performs exactly one exchange against the backend, writes the rotated
//! credential to the [`TokenStore`], and then resolves every caller that queued up in the
//! meantime, in arrival order. A failed exchange rejects the whole queue and is never
//! retried by the refresher itself.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialBuilderError, Principal, TokenSecret},
	event::{ClientEvent, EventBus},
	obs::{self, OpKind, OpOutcome, OpSpan, trace_event},
	store::TokenStore,
};

/// Tokens returned by a backend refresh endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
	/// Newly issued access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token; the previous one stays valid when omitted.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime of the access token in seconds, when the backend states it.
	#[serde(default)]
	pub expires_in: Option<i64>,
}
impl RefreshedTokens {
	/// Builds the credential to persist, keeping `previous_refresh` if none was rotated in.
	pub fn into_credential(
		self,
		previous_refresh: TokenSecret,
		default_lifetime: Duration,
	) -> Result<Credential, CredentialBuilderError> {
		let mut builder = Credential::builder()
			.access_token(self.access_token.expose())
			.maybe_refresh_token(Some(self.refresh_token.unwrap_or(previous_refresh)))
			.issued_now()
			.default_lifetime(default_lifetime);

		if let Some(seconds) = self.expires_in.filter(|seconds| *seconds > 0) {
			builder = builder.expires_in(Duration::seconds(seconds));
		}

		builder.build()
	}
}

/// JSON body sent to a refresh endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
	/// Refresh token being exchanged.
	pub refresh_token: &'a str,
}

/// Observable phase of a [`TokenRefresher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPhase {
	/// No refresh in flight.
	Idle,
	/// A refresh exchange is in flight.
	Refreshing,
}

enum FlightError {
	Rejected(String),
	OtherPrincipal,
}

type FlightResult = Result<Credential, FlightError>;

struct Waiter {
	principal: Principal,
	tx: oneshot::Sender<FlightResult>,
}

enum RefreshState {
	Idle,
	Refreshing { waiters: VecDeque<Waiter> },
}

enum Role {
	Leader(TokenSecret),
	Waiter(oneshot::Receiver<FlightResult>),
}

/// Owns the refresh state machine for one client instance.
pub struct TokenRefresher {
	store: Arc<dyn TokenStore>,
	state: Mutex<RefreshState>,
	metrics: Arc<RefreshMetrics>,
	events: Option<EventBus>,
	default_lifetime: Duration,
}
impl TokenRefresher {
	/// Creates an idle refresher writing rotated credentials to `store`.
	///
	/// `default_lifetime` applies when the backend states no expiry and the access token
	/// carries no JWT `exp` claim.
	pub fn new(store: Arc<dyn TokenStore>, default_lifetime: Duration) -> Self {
		Self {
			store,
			state: Mutex::new(RefreshState::Idle),
			metrics: Default::default(),
			events: None,
			default_lifetime,
		}
	}

	/// Publishes [`ClientEvent::CredentialRefreshed`] on `events` after each exchange.
	pub fn with_events(mut self, events: EventBus) -> Self {
		self.events = Some(events);

		self
	}

	/// Shared refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Current phase of the state machine.
	pub fn phase(&self) -> RefreshPhase {
		match &*self.state.lock() {
			RefreshState::Idle => RefreshPhase::Idle,
			RefreshState::Refreshing { .. } => RefreshPhase::Refreshing,
		}
	}

	/// Number of callers queued behind the in-flight refresh.
	pub fn queued_waiters(&self) -> usize {
		match &*self.state.lock() {
			RefreshState::Idle => 0,
			RefreshState::Refreshing { waiters } => waiters.len(),
		}
	}

	/// Replaces `rejected` with a fresh credential for `principal`.
	///
	/// `exchange` performs the backend call and runs at most once per flight; callers that
	/// arrive while a flight is active wait for its result instead. When the store already
	/// holds a different, unexpired access token than `rejected`, that credential is returned
	/// without contacting the backend. Every failure is reported as
	/// [`Error::AuthRejected`]; clearing the stored credential is left to the caller.
	pub async fn refresh<F, Fut>(
		&self,
		principal: Principal,
		rejected: &Credential,
		exchange: F,
	) -> Result<Credential>
	where
		F: FnOnce(Principal, TokenSecret) -> Fut,
		Fut: Future<Output = Result<RefreshedTokens>>,
	{
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "refresh");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span.instrument(self.refresh_inner(principal, rejected, exchange)).await;

		obs::record_result(KIND, &result);

		result
	}

	async fn refresh_inner<F, Fut>(
		&self,
		principal: Principal,
		rejected: &Credential,
		exchange: F,
	) -> Result<Credential>
	where
		F: FnOnce(Principal, TokenSecret) -> Fut,
		Fut: Future<Output = Result<RefreshedTokens>>,
	{
		loop {
			let role = {
				let mut state = self.state.lock();

				match &mut *state {
					RefreshState::Refreshing { waiters } => {
						let (tx, rx) = oneshot::channel();

						waiters.push_back(Waiter { principal, tx });

						Role::Waiter(rx)
					},
					RefreshState::Idle => {
						let Some(refresh_token) = rejected.refresh_token.clone() else {
							return Err(rejection(principal, "no refresh token is available"));
						};

						*state = RefreshState::Refreshing { waiters: VecDeque::new() };

						Role::Leader(refresh_token)
					},
				}
			};

			match role {
				Role::Leader(refresh_token) =>
					return self.lead(principal, rejected, refresh_token, exchange).await,
				Role::Waiter(rx) => {
					self.metrics.record_coalesced();
					trace_event!(debug, principal = principal.as_str(), "joined in-flight refresh");

					match rx.await {
						Ok(Ok(credential)) => return Ok(credential),
						Ok(Err(FlightError::Rejected(reason))) =>
							return Err(rejection(principal, reason)),
						Ok(Err(FlightError::OtherPrincipal)) => continue,
						Err(_) => {
							trace_event!(
								debug,
								principal = principal.as_str(),
								"in-flight refresh abandoned; taking over"
							);

							continue;
						},
					}
				},
			}
		}
	}

	async fn lead<F, Fut>(
		&self,
		principal: Principal,
		rejected: &Credential,
		refresh_token: TokenSecret,
		exchange: F,
	) -> Result<Credential>
	where
		F: FnOnce(Principal, TokenSecret) -> Fut,
		Fut: Future<Output = Result<RefreshedTokens>>,
	{
		let mut flight = Flight { refresher: self, principal, completed: false };
		let outcome = self.obtain(principal, rejected, refresh_token, exchange).await;

		match &outcome {
			Ok(_) => self.metrics.record_success(),
			Err(_) => self.metrics.record_failure(),
		}

		let outcome = outcome.map_err(|err| match err {
			err @ Error::AuthRejected { .. } => err,
			other => rejection(principal, other.to_string()),
		});

		flight.complete(&outcome);

		outcome
	}

	async fn obtain<F, Fut>(
		&self,
		principal: Principal,
		rejected: &Credential,
		refresh_token: TokenSecret,
		exchange: F,
	) -> Result<Credential>
	where
		F: FnOnce(Principal, TokenSecret) -> Fut,
		Fut: Future<Output = Result<RefreshedTokens>>,
	{
		let now = OffsetDateTime::now_utc();

		if let Some(current) = self.store.fetch(principal).await?
			&& current.access_token != rejected.access_token
			&& !current.is_expired_at(now)
		{
			trace_event!(
				debug,
				principal = principal.as_str(),
				token = %current.access_token.fingerprint(),
				"credential already rotated; skipping refresh exchange"
			);

			return Ok(current);
		}

		self.metrics.record_exchange();

		let tokens = exchange(principal, refresh_token.clone()).await?;
		let credential = tokens
			.into_credential(refresh_token, self.default_lifetime)
			.map_err(|err| rejection(principal, err.to_string()))?;

		self.store.save(principal, credential.clone()).await?;

		if let Some(events) = &self.events {
			events.emit(ClientEvent::CredentialRefreshed { principal });
		}

		trace_event!(
			debug,
			principal = principal.as_str(),
			token = %credential.access_token.fingerprint(),
			"credential refreshed"
		);

		Ok(credential)
	}
}
impl Debug for TokenRefresher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRefresher")
			.field("phase", &self.phase())
			.field("queued_waiters", &self.queued_waiters())
			.finish()
	}
}

/// Returns the refresher to `Idle` exactly once, even if the leading future is dropped.
struct Flight<'a> {
	refresher: &'a TokenRefresher,
	principal: Principal,
	completed: bool,
}
impl Flight<'_> {
	fn take_waiters(&self) -> VecDeque<Waiter> {
		let mut state = self.refresher.state.lock();

		match std::mem::replace(&mut *state, RefreshState::Idle) {
			RefreshState::Refreshing { waiters } => waiters,
			RefreshState::Idle => VecDeque::new(),
		}
	}

	fn complete(&mut self, outcome: &Result<Credential>) {
		let waiters = self.take_waiters();

		self.completed = true;

		for waiter in waiters {
			let message = if waiter.principal != self.principal {
				Err(FlightError::OtherPrincipal)
			} else {
				match outcome {
					Ok(credential) => Ok(credential.clone()),
					Err(Error::AuthRejected { reason, .. }) =>
						Err(FlightError::Rejected(reason.clone())),
					Err(other) => Err(FlightError::Rejected(other.to_string())),
				}
			};

			let _ = waiter.tx.send(message);
		}
	}
}
impl Drop for Flight<'_> {
	fn drop(&mut self) {
		if !self.completed {
			// Dropping the senders wakes every waiter with a closed-channel rejection.
			drop(self.take_waiters());
		}
	}
}

fn rejection(principal: Principal, reason: impl Into<String>) -> Error {
	Error::auth_rejected(Some(principal), reason)
}
