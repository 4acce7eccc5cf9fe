//! Connection contract for live collections.
//!
//! A live collection needs three things from the persistent connection it rides on:
//! * one-shot commands ([`Connection::send_message`]) to fetch an initial snapshot
//! * server-push event subscriptions ([`Connection::subscribe_events`])
//! * deregistration of those subscriptions ([`Connection::unsubscribe_events`])
//!
//! Transport, authentication and reconnection are the implementor's business. The
//! [`messages`] module builds the command payloads and the [`EventMessage`] wire shape,
//! and [`subscribe_typed_events`] decodes pushed events into typed payloads.
//!
//! ## Cargo features
//!
//! - `local`: [`local::LocalConnection`], an in-memory connection with canned responses.
//!   *Disabled by default.*

#![warn(missing_docs)]

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
pub use serde_json::Value as JsonValue;

pub mod events;
#[cfg(feature = "local")]
pub mod local;
pub mod messages;

pub use events::subscribe_typed_events;
pub use messages::EventMessage;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible connection errors.
///
/// Errors are `Clone` so a single outcome can be handed to every waiter of a shared
/// request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The connection is closed and no longer accepts messages.
	#[error("connection closed")]
	ConnectionClosed,
	/// The remote side rejected a command.
	#[error("command failed ({code}): {message}")]
	Command {
		/// Machine readable error code reported by the remote.
		code: String,
		/// Human readable message reported by the remote.
		message: String,
	},
	/// The remote replied with a payload that does not match the expected shape.
	#[error("deserialization failed: {0}")]
	Deserialize(String),
	/// The remote did not answer in time.
	#[error("request timed out")]
	Timeout,
	/// No event subscription with this id exists.
	#[error("unknown subscription {0}")]
	UnknownSubscription(SubscriptionId),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Deserialize(err.to_string())
	}
}

/// Identifier of a server-push event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "sub#{}", self.0)
	}
}

/// Callback invoked for every pushed event of a subscription.
///
/// Handlers are invoked in arrival order, one event at a time.
pub type EventHandler = Arc<dyn Fn(EventMessage) + Send + Sync>;

/// The persistent connection a live collection is built on.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
	/// Sends a command and resolves with its result payload.
	async fn send_message(&self, message: JsonValue) -> Result<JsonValue>;

	/// Registers `handler` for pushed events of `event_type` (all events when `None`).
	///
	/// Resolves once the remote acknowledged the registration.
	async fn subscribe_events(&self, event_type: Option<&str>, handler: EventHandler) -> Result<SubscriptionId>;

	/// Deregisters a subscription created by [`Connection::subscribe_events`].
	async fn unsubscribe_events(&self, subscription: SubscriptionId) -> Result<()>;
}

/// Sends a command and decodes its result payload into `R`.
pub async fn send_command<R: DeserializeOwned>(conn: &dyn Connection, message: JsonValue) -> Result<R> {
	let result = conn.send_message(message).await?;
	Ok(serde_json::from_value(result)?)
}
