//! Client lifecycle notifications delivered to subscribers.

// crates.io
use tokio::sync::broadcast;
// self
use crate::{_prelude::*, auth::Principal, obs::trace_event};

/// Broadcast capacity; slow subscribers observe `Lagged` instead of blocking the client.
pub const EVENT_CAPACITY: usize = 32;

/// Notification emitted by an [`ApiClient`](crate::client::ApiClient).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
	/// The stored credential was cleared; the application should route to sign-in.
	ReauthenticationRequired {
		/// Principal whose credential was removed.
		principal: Principal,
	},
	/// A refresh exchange stored a new credential.
	CredentialRefreshed {
		/// Principal whose credential rotated.
		principal: Principal,
	},
	/// A different endpoint became last-known-good.
	EndpointPromoted {
		/// Newly promoted base address.
		endpoint: Url,
	},
}

/// Fan-out handle shared by the client components.
#[derive(Clone, Debug)]
pub struct EventBus(broadcast::Sender<ClientEvent>);
impl EventBus {
	/// Creates a bus with [`EVENT_CAPACITY`] buffered events.
	pub fn new() -> Self {
		let (tx, _) = broadcast::channel(EVENT_CAPACITY);

		Self(tx)
	}

	/// Returns a receiver that observes every event emitted after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
		self.0.subscribe()
	}

	/// Publishes `event`; having no subscribers is not an error.
	pub fn emit(&self, event: ClientEvent) {
		trace_event!(debug, event = ?event, "client event");

		let _ = self.0.send(event);
	}
}
impl Default for EventBus {
	fn default() -> Self {
		Self::new()
	}
}
