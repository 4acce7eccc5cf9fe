//! Wire message shapes.
//!
//! Commands are plain JSON objects tagged by `type`; the connection is responsible for
//! assigning request ids.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{JsonValue, Result, SubscriptionId};

/// Command type for fetching the full service registry.
pub const GET_SERVICES: &str = "get_services";
/// Command type for registering an event subscription.
pub const SUBSCRIBE_EVENTS: &str = "subscribe_events";
/// Command type for releasing an event subscription.
pub const UNSUBSCRIBE_EVENTS: &str = "unsubscribe_events";

/// A server-push event.
///
/// The payload lives under `data`; consumers rely on this exact shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage<D = JsonValue> {
	/// Name of the event, e.g. `service_registered`.
	pub event_type: String,
	/// Event payload.
	pub data: D,
	/// Where the event originated (`LOCAL` or `REMOTE`).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,
	/// Timestamp reported by the remote.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time_fired: Option<String>,
}

impl<D> EventMessage<D> {
	/// Creates an event without origin or timestamp.
	pub fn new(event_type: impl Into<String>, data: D) -> Self {
		Self {
			event_type: event_type.into(),
			data,
			origin: None,
			time_fired: None,
		}
	}
}

impl EventMessage {
	/// Decodes the untyped payload into `D`.
	pub fn decode<D: DeserializeOwned>(self) -> Result<EventMessage<D>> {
		Ok(EventMessage {
			event_type: self.event_type,
			data: serde_json::from_value(self.data)?,
			origin: self.origin,
			time_fired: self.time_fired,
		})
	}
}

/// Builds the `get_services` command.
pub fn get_services() -> JsonValue {
	json!({ "type": GET_SERVICES })
}

/// Builds the `subscribe_events` command.
pub fn subscribe_events(event_type: Option<&str>) -> JsonValue {
	match event_type {
		Some(event_type) => json!({ "type": SUBSCRIBE_EVENTS, "event_type": event_type }),
		None => json!({ "type": SUBSCRIBE_EVENTS }),
	}
}

/// Builds the `unsubscribe_events` command.
pub fn unsubscribe_events(subscription: SubscriptionId) -> JsonValue {
	json!({ "type": UNSUBSCRIBE_EVENTS, "subscription": subscription.0 })
}

/// Returns the `type` tag of a command.
pub fn message_type(message: &JsonValue) -> Option<&str> {
	message.get("type").and_then(JsonValue::as_str)
}
