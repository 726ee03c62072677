mod common;

// std
use std::sync::Arc;
// crates.io
use time::Duration;
// self
use common::{Behavior, ScriptedTransport};
use resilient_api_client::{
	auth::Principal,
	classify::{DefaultFailureClassifier, Disposition, FailureClassifier, FailureContext},
	client::{ApiCall, ApiClient},
	error::Error,
	event::ClientEvent,
	store::{MemoryStore, TokenStore},
};

const A: &str = "http://a.test";
const B: &str = "http://b.test";
const C: &str = "http://c.test";

fn client(
	endpoints: &[&str],
	transport: &Arc<ScriptedTransport>,
) -> (ApiClient<ScriptedTransport>, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let client =
		ApiClient::with_transport(common::config(endpoints), store.clone(), transport.clone());

	(client, store)
}

#[tokio::test(start_paused = true)]
async fn timeout_on_default_fails_over_and_sticks_to_the_healthy_endpoint() {
	let transport = common::shared(
		ScriptedTransport::default()
			.with("a.test", Behavior::Hang)
			.with("b.test", Behavior::Respond(200, "{\"ok\":true}")),
	);
	let (client, _) = client(&[A, B], &transport);
	let mut events = client.subscribe();
	let body: serde_json::Value =
		client.get_json("/status").await.expect("The second endpoint should answer.");

	assert_eq!(body["ok"], true);
	assert_eq!(transport.hosts_seen(), ["a.test", "b.test"]);
	assert_eq!(client.registry().last_good(), Some(common::url(B)));
	assert_eq!(
		events.try_recv().expect("Promotion should be announced."),
		ClientEvent::EndpointPromoted { endpoint: common::url(B) }
	);

	client
		.get_json::<serde_json::Value>("/status")
		.await
		.expect("The sticky endpoint should answer.");

	assert_eq!(transport.hosts_seen(), ["a.test", "b.test", "b.test"]);
	assert!(events.try_recv().is_err(), "Re-using the same endpoint must not re-announce it.");
}

#[tokio::test(start_paused = true)]
async fn unreachable_candidates_exhaust_after_two_passes() {
	let transport = common::shared(ScriptedTransport::default());
	let (client, _) = client(&[A, B, C], &transport);
	let err = client.send(ApiCall::get("/status")).await.expect_err("Every candidate refuses.");

	match err {
		Error::Exhausted { attempts, last } => {
			assert_eq!(attempts, 6);
			assert!(last.is_connectivity());
		},
		other => panic!("Expected exhaustion, got {other:?}."),
	}

	let seen = transport.hosts_seen();

	assert_eq!(seen.len(), 6);

	for host in ["a.test", "b.test", "c.test"] {
		assert_eq!(seen.iter().filter(|seen| *seen == host).count(), 2);
	}
	assert_eq!(client.registry().last_good(), Some(common::url(A)));
}

#[tokio::test]
async fn resource_errors_surface_without_rotation_or_refresh() {
	for status in [403_u16, 404] {
		let transport = common::shared(
			ScriptedTransport::default()
				.with("a.test", Behavior::Respond(status, "{\"error\":\"nope\"}"))
				.with("b.test", Behavior::Respond(200, "{}")),
		);
		let (client, store) = client(&[A, B], &transport);

		store
			.save(
				Principal::User,
				common::credential("access", Some("refresh"), Duration::hours(1)),
			)
			.await
			.expect("Seeding the store should work.");

		let err = client
			.send(ApiCall::get("/accounts/7"))
			.await
			.expect_err("Resource errors must surface.");

		assert!(matches!(err, Error::Resource { status: s, .. } if s == status));
		assert_eq!(transport.hosts_seen(), ["a.test"]);
		assert_eq!(client.refresh_metrics().attempts(), 0);
		assert!(store.snapshot(Principal::User).is_some(), "A 403/404 must not sign the user out.");
	}
}

#[tokio::test]
async fn server_errors_surface_without_rotation() {
	let transport = common::shared(
		ScriptedTransport::default()
			.with("a.test", Behavior::Respond(503, "maintenance"))
			.with("b.test", Behavior::Respond(200, "{}")),
	);
	let (client, _) = client(&[A, B], &transport);
	let err = client.send(ApiCall::get("/status")).await.expect_err("HTTP 503 must surface.");

	assert!(matches!(
		err,
		Error::UnexpectedStatus { status: 503, body: Some(ref body) } if body == "maintenance"
	));
	assert_eq!(transport.hosts_seen(), ["a.test"]);
}

#[tokio::test]
async fn custom_classifier_can_rotate_on_server_errors() {
	struct RotateOnUnavailable;
	impl FailureClassifier for RotateOnUnavailable {
		fn classify(&self, ctx: &FailureContext) -> Disposition {
			match ctx.http_status {
				Some(503) => Disposition::RotateEndpoint,
				_ => DefaultFailureClassifier.classify(ctx),
			}
		}
	}

	let transport = common::shared(
		ScriptedTransport::default()
			.with("a.test", Behavior::Respond(503, "maintenance"))
			.with("b.test", Behavior::Respond(200, "{}")),
	);
	let (client, _) = client(&[A, B], &transport);
	let client = client.with_classifier(Arc::new(RotateOnUnavailable));

	client.send(ApiCall::get("/status")).await.expect("The classifier should rotate to B.");

	assert_eq!(transport.hosts_seen(), ["a.test", "b.test"]);
	assert_eq!(client.registry().last_good(), Some(common::url(B)));
}

#[tokio::test(start_paused = true)]
async fn unreachable_proactive_refresh_does_not_sign_the_user_out() {
	let transport = common::shared(
		ScriptedTransport::default()
			.with("a.test", Behavior::Refuse)
			.with("b.test", Behavior::Refuse),
	);
	let (client, store) = client(&[A, B], &transport);
	let mut events = client.subscribe();

	store
		.save(Principal::User, common::credential("access", Some("refresh"), Duration::seconds(10)))
		.await
		.expect("Seeding the store should work.");

	let err = client.send(ApiCall::get("/orders")).await.expect_err("Every endpoint refuses.");

	assert!(matches!(err, Error::Exhausted { .. }), "Unexpected error: {err:?}.");
	assert!(!err.requires_reauthentication());
	assert!(store.snapshot(Principal::User).is_some(), "The unexpired token must be kept.");
	assert_eq!(client.refresh_metrics().failures(), 1);
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn bearer_token_is_attached_to_every_attempt() {
	let transport = common::shared(
		ScriptedTransport::default()
			.with("a.test", Behavior::Refuse)
			.with("b.test", Behavior::Respond(200, "{}")),
	);
	let (client, _) = client(&[A, B], &transport);

	client
		.sign_in(Principal::User, common::credential("access-user", None, Duration::hours(1)))
		.await
		.expect("Signing in should work.");
	client.send(ApiCall::get("/status")).await.expect("B should answer.");

	for seen in transport.seen() {
		assert_eq!(seen.authorization.as_deref(), Some("Bearer access-user"));
		assert_eq!(seen.path, "/status");
	}

	client.send(ApiCall::get("/public").anonymous()).await.expect("B should answer.");

	let last = transport.seen().pop().expect("A request should have been recorded.");

	assert_eq!(last.authorization, None);
}

#[tokio::test]
async fn find_reachable_promotes_the_first_healthy_candidate() {
	let transport = common::shared(
		ScriptedTransport::default()
			.with("a.test", Behavior::Refuse)
			.with("b.test", Behavior::Respond(204, "")),
	);
	let (client, _) = client(&[A, B], &transport);

	assert!(client.probe(&common::url(A)).await.expect_err("A refuses.").is_connectivity());
	assert_eq!(client.find_reachable().await.expect("B is healthy."), common::url(B));
	assert_eq!(client.registry().last_good(), Some(common::url(B)));
	assert!(
		transport
			.seen()
			.iter()
			.all(|seen| seen.path == "/health" && seen.authorization.is_none())
	);
}
