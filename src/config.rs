//! Client configuration, its validating builder, and environment loading.

// self
use crate::{
	_prelude::*,
	auth::{Principal, PrincipalPolicy},
	endpoint::EndpointRegistry,
	error::ConfigError,
};

/// Default bound on a single outbound attempt.
pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(12);
/// Default pause between connectivity failures.
pub const DEFAULT_RETRY_DELAY: StdDuration = StdDuration::from_millis(300);
/// Default window before expiry in which a credential is refreshed proactively.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::seconds(30);
/// Default lifetime for access tokens whose expiry cannot be determined.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::minutes(15);
/// Default refresh path for the user principal.
pub const DEFAULT_USER_REFRESH_PATH: &str = "/api/auth/refresh";
/// Default refresh path for the admin principal.
pub const DEFAULT_ADMIN_REFRESH_PATH: &str = "/api/admin/auth/refresh";
/// Default health-check path.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Comma or whitespace separated candidate base URLs.
pub const ENV_ENDPOINTS: &str = "API_CLIENT_ENDPOINTS";
/// Optional default endpoint; must be one of the candidates.
pub const ENV_DEFAULT_ENDPOINT: &str = "API_CLIENT_DEFAULT_ENDPOINT";
/// Per-attempt timeout in milliseconds.
pub const ENV_REQUEST_TIMEOUT_MS: &str = "API_CLIENT_REQUEST_TIMEOUT_MS";
/// Retry delay in milliseconds.
pub const ENV_RETRY_DELAY_MS: &str = "API_CLIENT_RETRY_DELAY_MS";
/// `user`, `admin`, or unset for the prefer-user policy.
pub const ENV_PRINCIPAL: &str = "API_CLIENT_PRINCIPAL";

/// Validated configuration for an [`ApiClient`](crate::client::ApiClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
	candidates: Arc<[Url]>,
	default_endpoint: Url,
	/// Policy deciding which stored credential is presented.
	pub principal_policy: PrincipalPolicy,
	/// Bound on each outbound attempt; expiry counts as a connectivity failure.
	pub request_timeout: StdDuration,
	/// Pause before trying the next candidate after a connectivity failure.
	pub retry_delay: StdDuration,
	/// Credentials expiring within this window are refreshed before the call.
	pub refresh_skew: Duration,
	/// Lifetime assumed when neither the backend nor the token states an expiry.
	pub default_token_lifetime: Duration,
	/// Refresh path for [`Principal::User`].
	pub user_refresh_path: String,
	/// Refresh path for [`Principal::Admin`].
	pub admin_refresh_path: String,
	/// Path probed by health checks.
	pub health_path: String,
}
impl ClientConfig {
	/// Returns a builder populated with the default timings and paths.
	pub fn builder() -> ClientConfigBuilder {
		ClientConfigBuilder::default()
	}

	/// Loads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads the configuration through `lookup`, which maps variable names to values.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&'static str) -> Option<String>,
	{
		let read = |name| lookup(name).filter(|value: &String| !value.trim().is_empty());
		let raw_endpoints =
			read(ENV_ENDPOINTS).ok_or(ConfigError::MissingVariable { name: ENV_ENDPOINTS })?;
		let mut builder = Self::builder();

		for value in raw_endpoints.split(|c: char| c == ',' || c.is_whitespace()) {
			if !value.is_empty() {
				builder = builder.endpoint(parse_endpoint(value)?);
			}
		}
		if let Some(value) = read(ENV_DEFAULT_ENDPOINT) {
			builder = builder.default_endpoint(parse_endpoint(value.trim())?);
		}
		if let Some(value) = read(ENV_REQUEST_TIMEOUT_MS) {
			builder = builder.request_timeout(parse_millis(ENV_REQUEST_TIMEOUT_MS, value)?);
		}
		if let Some(value) = read(ENV_RETRY_DELAY_MS) {
			builder = builder.retry_delay(parse_millis(ENV_RETRY_DELAY_MS, value)?);
		}
		if let Some(value) = read(ENV_PRINCIPAL) {
			let principal = Principal::from_str(value.trim())
				.map_err(|_| ConfigError::InvalidVariable { name: ENV_PRINCIPAL, value })?;

			builder = builder.principal_policy(PrincipalPolicy::Fixed(principal));
		}

		builder.build()
	}

	/// Candidate base addresses in configuration order, deduplicated.
	pub fn candidates(&self) -> &[Url] {
		&self.candidates
	}

	/// Endpoint that seeds the last-known-good pointer.
	pub fn default_endpoint(&self) -> &Url {
		&self.default_endpoint
	}

	/// Refresh path used for `principal`.
	pub fn refresh_path(&self, principal: Principal) -> &str {
		match principal {
			Principal::User => &self.user_refresh_path,
			Principal::Admin => &self.admin_refresh_path,
		}
	}

	/// Creates a fresh registry whose last-known-good pointer starts at the default.
	pub fn registry(&self) -> EndpointRegistry {
		EndpointRegistry::from_validated(self.candidates.clone(), self.default_endpoint.clone())
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	endpoints: Vec<Url>,
	default_endpoint: Option<Url>,
	principal_policy: PrincipalPolicy,
	request_timeout: StdDuration,
	retry_delay: StdDuration,
	refresh_skew: Duration,
	default_token_lifetime: Duration,
	user_refresh_path: String,
	admin_refresh_path: String,
	health_path: String,
}
impl ClientConfigBuilder {
	/// Appends one candidate base address.
	pub fn endpoint(mut self, url: Url) -> Self {
		self.endpoints.push(url);

		self
	}

	/// Appends several candidate base addresses.
	pub fn endpoints<I>(mut self, urls: I) -> Self
	where
		I: IntoIterator<Item = Url>,
	{
		self.endpoints.extend(urls);

		self
	}

	/// Designates the default endpoint; the first candidate is used otherwise.
	pub fn default_endpoint(mut self, url: Url) -> Self {
		self.default_endpoint = Some(url);

		self
	}

	/// Overrides the principal policy.
	pub fn principal_policy(mut self, policy: PrincipalPolicy) -> Self {
		self.principal_policy = policy;

		self
	}

	/// Overrides the per-attempt timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the delay between connectivity failures.
	pub fn retry_delay(mut self, delay: StdDuration) -> Self {
		self.retry_delay = delay;

		self
	}

	/// Overrides the proactive refresh window.
	pub fn refresh_skew(mut self, skew: Duration) -> Self {
		self.refresh_skew = skew;

		self
	}

	/// Overrides the fallback token lifetime.
	pub fn default_token_lifetime(mut self, lifetime: Duration) -> Self {
		self.default_token_lifetime = lifetime;

		self
	}

	/// Overrides the user refresh path.
	pub fn user_refresh_path(mut self, path: impl Into<String>) -> Self {
		self.user_refresh_path = path.into();

		self
	}

	/// Overrides the admin refresh path.
	pub fn admin_refresh_path(mut self, path: impl Into<String>) -> Self {
		self.admin_refresh_path = path.into();

		self
	}

	/// Overrides the health-check path.
	pub fn health_path(mut self, path: impl Into<String>) -> Self {
		self.health_path = path.into();

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		if self.request_timeout.is_zero() {
			return Err(ConfigError::ZeroTimeout);
		}

		let registry = EndpointRegistry::new(self.endpoints, self.default_endpoint)?;

		Ok(ClientConfig {
			candidates: registry.candidates().into(),
			default_endpoint: registry.default_endpoint().clone(),
			principal_policy: self.principal_policy,
			request_timeout: self.request_timeout,
			retry_delay: self.retry_delay,
			refresh_skew: self.refresh_skew,
			default_token_lifetime: self.default_token_lifetime,
			user_refresh_path: self.user_refresh_path,
			admin_refresh_path: self.admin_refresh_path,
			health_path: self.health_path,
		})
	}
}
impl Default for ClientConfigBuilder {
	fn default() -> Self {
		Self {
			endpoints: Vec::new(),
			default_endpoint: None,
			principal_policy: PrincipalPolicy::default(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			retry_delay: DEFAULT_RETRY_DELAY,
			refresh_skew: DEFAULT_REFRESH_SKEW,
			default_token_lifetime: DEFAULT_TOKEN_LIFETIME,
			user_refresh_path: DEFAULT_USER_REFRESH_PATH.into(),
			admin_refresh_path: DEFAULT_ADMIN_REFRESH_PATH.into(),
			health_path: DEFAULT_HEALTH_PATH.into(),
		}
	}
}

fn parse_endpoint(value: &str) -> Result<Url, ConfigError> {
	Url::parse(value)
		.map_err(|source| ConfigError::InvalidEndpoint { value: value.to_owned(), source })
}

fn parse_millis(name: &'static str, value: String) -> Result<StdDuration, ConfigError> {
	match value.trim().parse::<u64>() {
		Ok(millis) => Ok(StdDuration::from_millis(millis)),
		Err(_) => Err(ConfigError::InvalidVariable { name, value }),
	}
}
