//! In-memory connection.
//!
//! [`LocalConnection`] answers commands from a table of canned responses and delivers
//! events synchronously from [`LocalConnection::fire_event`]. Replies for a command type
//! can be held back with [`LocalConnection::hold`] to stage in-flight requests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::messages::{self, SUBSCRIBE_EVENTS, UNSUBSCRIBE_EVENTS};
use crate::{Connection, Error, EventHandler, EventMessage, JsonValue, Result, SubscriptionId};

struct Registration {
	event_type: Option<String>,
	handler: EventHandler,
}

/// In-memory [`Connection`] with canned responses.
pub struct LocalConnection {
	next_id: AtomicU64,
	closed: AtomicBool,
	/// Canned results keyed by command type.
	responses: Mutex<HashMap<String, Result<JsonValue>>>,
	/// Errors returned when subscribing to an event type.
	subscribe_failures: Mutex<HashMap<String, Error>>,
	/// Event handlers in registration order.
	handlers: Mutex<BTreeMap<SubscriptionId, Registration>>,
	/// Every command seen, including subscription management.
	sent: Mutex<Vec<JsonValue>>,
	/// Command types whose replies are currently held back.
	held: watch::Sender<HashSet<String>>,
}

impl LocalConnection {
	/// Creates an open connection with no canned responses.
	pub fn new() -> Arc<Self> {
		let (held, _) = watch::channel(HashSet::new());
		Arc::new(Self {
			next_id: AtomicU64::new(1),
			closed: AtomicBool::new(false),
			responses: Mutex::new(HashMap::new()),
			subscribe_failures: Mutex::new(HashMap::new()),
			handlers: Mutex::new(BTreeMap::new()),
			sent: Mutex::new(Vec::new()),
			held,
		})
	}

	/// Sets the result returned for commands of type `kind`.
	pub fn respond(&self, kind: &str, result: Result<JsonValue>) {
		self.responses.lock().insert(kind.to_string(), result);
	}

	/// Makes subscriptions to `event_type` fail with `error`.
	pub fn fail_subscribe(&self, event_type: &str, error: Error) {
		self.subscribe_failures.lock().insert(event_type.to_string(), error);
	}

	/// Holds back replies to commands of type `kind` until [`LocalConnection::release`].
	pub fn hold(&self, kind: &str) {
		self.held.send_modify(|held| {
			held.insert(kind.to_string());
		});
	}

	/// Lets held replies to commands of type `kind` through.
	pub fn release(&self, kind: &str) {
		self.held.send_modify(|held| {
			held.remove(kind);
		});
	}

	/// Closes the connection; pending and future calls fail with [`Error::ConnectionClosed`].
	pub fn close(&self) {
		self.closed.store(true, Ordering::Release);
		self.handlers.lock().clear();
		self.held.send_modify(HashSet::clear);
	}

	/// Returns every command sent so far.
	pub fn sent(&self) -> Vec<JsonValue> {
		self.sent.lock().clone()
	}

	/// Returns how many commands of type `kind` were sent.
	pub fn sent_count(&self, kind: &str) -> usize {
		self.sent
			.lock()
			.iter()
			.filter(|message| messages::message_type(message) == Some(kind))
			.count()
	}

	/// Returns the number of live event subscriptions.
	pub fn active_subscriptions(&self) -> usize {
		self.handlers.lock().len()
	}

	/// Returns the number of live subscriptions receiving `event_type`.
	pub fn subscribers(&self, event_type: &str) -> usize {
		self.handlers
			.lock()
			.values()
			.filter(|r| r.event_type.as_deref().is_none_or(|t| t == event_type))
			.count()
	}

	/// Delivers `event` to every matching handler and returns how many received it.
	pub fn fire_event(&self, event: EventMessage) -> usize {
		if self.is_closed() {
			return 0;
		}
		let handlers: Vec<EventHandler> = self
			.handlers
			.lock()
			.values()
			.filter(|r| r.event_type.as_deref().is_none_or(|t| t == event.event_type))
			.map(|r| Arc::clone(&r.handler))
			.collect();
		for handler in &handlers {
			handler(event.clone());
		}
		handlers.len()
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	fn record(&self, message: JsonValue) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}
		self.sent.lock().push(message);
		Ok(())
	}

	/// Waits until replies to `kind` are no longer held.
	async fn acknowledge(&self, kind: &str) -> Result<()> {
		let mut held = self.held.subscribe();
		let released = held.wait_for(|held| !held.contains(kind)).await.is_ok();
		if !released || self.is_closed() {
			return Err(Error::ConnectionClosed);
		}
		Ok(())
	}
}

#[async_trait]
impl Connection for LocalConnection {
	async fn send_message(&self, message: JsonValue) -> Result<JsonValue> {
		let kind = messages::message_type(&message).unwrap_or_default().to_string();
		self.record(message)?;
		self.acknowledge(&kind).await?;
		self.responses.lock().get(&kind).cloned().unwrap_or_else(|| {
			Err(Error::Command {
				code: "unknown_command".into(),
				message: format!("no response configured for `{kind}`"),
			})
		})
	}

	async fn subscribe_events(&self, event_type: Option<&str>, handler: EventHandler) -> Result<SubscriptionId> {
		self.record(messages::subscribe_events(event_type))?;
		self.acknowledge(SUBSCRIBE_EVENTS).await?;
		if let Some(error) = event_type.and_then(|t| self.subscribe_failures.lock().get(t).cloned()) {
			return Err(error);
		}

		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
		self.handlers.lock().insert(
			id,
			Registration {
				event_type: event_type.map(str::to_string),
				handler,
			},
		);
		debug!(%id, event_type = ?event_type, "Registered event handler");
		Ok(id)
	}

	async fn unsubscribe_events(&self, subscription: SubscriptionId) -> Result<()> {
		self.record(messages::unsubscribe_events(subscription))?;
		self.acknowledge(UNSUBSCRIBE_EVENTS).await?;

		match self.handlers.lock().remove(&subscription) {
			Some(_) => Ok(()),
			None => Err(Error::UnknownSubscription(subscription)),
		}
	}
}
