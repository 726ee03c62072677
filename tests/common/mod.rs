#![allow(dead_code)]

// std
use std::{
	collections::HashMap,
	io::{self, ErrorKind},
	sync::Arc,
	time::Duration as StdDuration,
};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
// self
use resilient_api_client::{
	auth::Credential,
	config::ClientConfig,
	error::TransportError,
	http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	url::Url,
};

/// What a scripted host does with every request it receives.
#[derive(Clone, Debug)]
pub enum Behavior {
	/// Answer with the given status and body.
	Respond(u16, &'static str),
	/// Never answer; the client timeout must fire.
	Hang,
	/// Fail as if the connection was refused.
	Refuse,
}

/// One request observed by [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct Seen {
	pub host: String,
	pub path: String,
	pub authorization: Option<String>,
}

/// In-process transport that routes by host name.
#[derive(Default)]
pub struct ScriptedTransport {
	hosts: Mutex<HashMap<String, Behavior>>,
	seen: Mutex<Vec<Seen>>,
}
impl ScriptedTransport {
	pub fn with(self, host: &str, behavior: Behavior) -> Self {
		self.set(host, behavior);

		self
	}

	pub fn set(&self, host: &str, behavior: Behavior) {
		self.hosts.lock().insert(host.to_owned(), behavior);
	}

	pub fn seen(&self) -> Vec<Seen> {
		self.seen.lock().clone()
	}

	pub fn hosts_seen(&self) -> Vec<String> {
		self.seen.lock().iter().map(|seen| seen.host.clone()).collect()
	}
}
impl HttpTransport for ScriptedTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		let host = request.uri().host().unwrap_or_default().to_owned();
		let authorization = request
			.headers()
			.get(::http::header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);

		self.seen.lock().push(Seen {
			host: host.clone(),
			path: request.uri().path().to_owned(),
			authorization,
		});

		let behavior = self.hosts.lock().get(&host).cloned().unwrap_or(Behavior::Refuse);

		Box::pin(async move {
			match behavior {
				Behavior::Respond(status, body) => {
					let mut response = ApiResponse::new(body.as_bytes().to_vec());

					*response.status_mut() = ::http::StatusCode::from_u16(status)
						.expect("Scripted status should be valid.");

					Ok(response)
				},
				Behavior::Hang => {
					std::future::pending::<()>().await;

					unreachable!("A pending future never resolves.")
				},
				Behavior::Refuse => Err(TransportError::Io(io::Error::new(
					ErrorKind::ConnectionRefused,
					"scripted connection refusal",
				))),
			}
		})
	}
}

pub fn url(value: &str) -> Url {
	Url::parse(value).expect("Test endpoint should parse.")
}

/// Configuration with short timings over `endpoints`; the first one is the default.
pub fn config<I, S>(endpoints: I) -> ClientConfig
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	ClientConfig::builder()
		.endpoints(endpoints.into_iter().map(|endpoint| url(endpoint.as_ref())))
		.request_timeout(StdDuration::from_secs(2))
		.retry_delay(StdDuration::from_millis(5))
		.build()
		.expect("Test client configuration should be valid.")
}

/// Credential expiring `expires_in` from now; negative values yield an expired credential.
pub fn credential(access: &str, refresh: Option<&str>, expires_in: Duration) -> Credential {
	let now = OffsetDateTime::now_utc();
	let mut builder = Credential::builder()
		.access_token(access)
		.issued_at(now - Duration::hours(1))
		.expires_at(now + expires_in);

	if let Some(value) = refresh {
		builder = builder.refresh_token(value);
	}

	builder.build().expect("Credential fixture should build successfully.")
}

pub fn shared(transport: ScriptedTransport) -> Arc<ScriptedTransport> {
	Arc::new(transport)
}
