//! Release handle for a collection's event subscriptions.

use std::sync::Arc;

use hearth_connection::{Connection, SubscriptionId};
use tracing::warn;

use crate::Result;

/// Releases the event subscriptions a collection attached to its connection.
///
/// Returned by [`Collection::subscribe_updates`](crate::Collection::subscribe_updates) and
/// run by the cache once the last subscriber leaves.
pub struct Disposer {
	conn: Arc<dyn Connection>,
	subscriptions: Vec<SubscriptionId>,
}

impl std::fmt::Debug for Disposer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Disposer")
			.field("subscriptions", &self.subscriptions)
			.finish_non_exhaustive()
	}
}

impl Disposer {
	/// Creates a disposer for `subscriptions` on `conn`.
	pub fn new(conn: Arc<dyn Connection>, subscriptions: Vec<SubscriptionId>) -> Self {
		Self { conn, subscriptions }
	}

	/// Returns the subscriptions this disposer releases.
	pub fn subscriptions(&self) -> &[SubscriptionId] {
		&self.subscriptions
	}

	/// Releases every subscription.
	///
	/// All subscriptions are attempted even if one fails; the first failure is returned.
	pub async fn dispose(self) -> Result<()> {
		let mut first_err = None;
		for id in self.subscriptions {
			if let Err(e) = self.conn.unsubscribe_events(id).await {
				warn!(subscription = %id, error = %e, "Failed to release event subscription");
				first_err.get_or_insert(e);
			}
		}
		match first_err {
			Some(e) => Err(e.into()),
			None => Ok(()),
		}
	}
}
