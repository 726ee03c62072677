//! Drives the client through an in-process transport that simulates an outage and a token
//! rotation.
//!
//! 1. Implement [`HttpTransport`] so requests never leave the process.
//! 2. Pass the transport to [`ApiClient::with_transport`] together with a store.
//! 3. Watch the client fail over from the unreachable primary, refresh the rejected access
//!    token, and report both through [`ClientEvent`] notifications.

// std
use std::{
	io::{self, ErrorKind},
	sync::Arc,
	time::Duration as StdDuration,
};
// crates.io
use color_eyre::Result;
use http::{StatusCode, header::AUTHORIZATION};
use time::Duration;
// self
use resilient_api_client::{
	auth::{Credential, Principal},
	client::ApiClient,
	config::ClientConfig,
	error::TransportError,
	event::ClientEvent,
	http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	store::MemoryStore,
	url::Url,
};

const PRIMARY: &str = "https://primary.example.com";
const BACKUP: &str = "https://backup.example.com";
const ROTATED: &str =
	r#"{"accessToken":"access-rotated","refreshToken":"refresh-rotated","expiresIn":900}"#;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = ClientConfig::builder()
		.endpoints([Url::parse(PRIMARY)?, Url::parse(BACKUP)?])
		.request_timeout(StdDuration::from_secs(2))
		.retry_delay(StdDuration::from_millis(50))
		.build()?;
	let client = ApiClient::<OutageTransport>::with_transport(
		config,
		Arc::new(MemoryStore::default()),
		Arc::new(OutageTransport),
	);
	let mut events = client.subscribe();
	let stale = Credential::builder()
		.access_token("access-stale")
		.refresh_token("refresh-demo")
		.expires_in(Duration::hours(1))
		.build()?;

	client.sign_in(Principal::User, stale).await?;

	let positions: serde_json::Value = client.get_json("/api/positions").await?;

	println!("Positions served by {BACKUP}: {positions}.");

	while let Ok(event) = events.try_recv() {
		match event {
			ClientEvent::EndpointPromoted { endpoint } =>
				println!("Last-known-good endpoint is now {endpoint}."),
			ClientEvent::CredentialRefreshed { principal } =>
				println!("The {principal} credential was refreshed."),
			ClientEvent::ReauthenticationRequired { principal } =>
				println!("The {principal} session must sign in again."),
		}
	}

	if let Some(active) = client.active_credential().await? {
		println!("Active {} token: {}.", active.principal, active.access_token().fingerprint());
	}

	Ok(())
}

/// Refuses every connection to the primary; the backup rotates stale tokens.
struct OutageTransport;
impl HttpTransport for OutageTransport {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		let host = request.uri().host().unwrap_or_default().to_owned();
		let path = request.uri().path().to_owned();
		let bearer = request
			.headers()
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);

		Box::pin(async move {
			if host != "backup.example.com" {
				return Err(TransportError::Io(io::Error::new(
					ErrorKind::ConnectionRefused,
					"primary is down for maintenance",
				)));
			}

			let (status, body) = match (path.as_str(), bearer.as_deref()) {
				("/api/auth/refresh", _) => (StatusCode::OK, ROTATED),
				("/api/positions", Some("Bearer access-rotated")) =>
					(StatusCode::OK, r#"[{"symbol":"BTCUSDT","size":0.5}]"#),
				_ => (StatusCode::UNAUTHORIZED, r#"{"error":"token expired"}"#),
			};
			let mut response = ApiResponse::new(body.as_bytes().to_vec());

			*response.status_mut() = status;

			Ok(response)
		})
	}
}
