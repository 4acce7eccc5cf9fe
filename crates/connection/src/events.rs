//! Typed event subscriptions.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::{Connection, EventHandler, EventMessage, Result, SubscriptionId};

/// Subscribes to `event_type` and decodes each event's payload into `D`.
///
/// Events whose payload does not decode are logged and dropped; they never reach `handler`.
pub async fn subscribe_typed_events<D, F>(conn: &dyn Connection, event_type: &str, handler: F) -> Result<SubscriptionId>
where
	D: DeserializeOwned + 'static,
	F: Fn(EventMessage<D>) + Send + Sync + 'static,
{
	let name = event_type.to_string();
	let handler: EventHandler = Arc::new(move |event: EventMessage| match event.decode::<D>() {
		Ok(event) => handler(event),
		Err(e) => warn!(event_type = %name, error = %e, "Dropping malformed event"),
	});
	conn.subscribe_events(Some(event_type), handler).await
}
