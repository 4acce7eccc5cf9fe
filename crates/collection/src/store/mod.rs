//! Live value container.
//!
//! A [`Store`] holds the current snapshot of one collection and the ordered set of
//! listeners observing it. Every mutation goes through [`Store::dispatch`] or
//! [`Store::set_state`], which apply the update and notify listeners before the next
//! mutation may start.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

/// An immutable collection value that can absorb partial updates.
pub trait Snapshot: Clone + Send + Sync + 'static {
	/// Partial update merged into a snapshot.
	type Patch: Send + 'static;

	/// Returns a new snapshot with `patch` merged in. `self` is left untouched.
	fn merge(&self, patch: Self::Patch) -> Self;
}

/// Outcome of a reducer.
pub enum Update<S: Snapshot> {
	/// Nothing to apply; listeners are not notified.
	NoChange,
	/// Merge a partial update into the current snapshot.
	Patch(S::Patch),
	/// Replace the snapshot wholesale.
	Replace(S),
}

impl<S: Snapshot> Update<S> {
	/// Returns true for [`Update::NoChange`].
	pub fn is_no_change(&self) -> bool {
		matches!(self, Self::NoChange)
	}

	/// Applies the update on top of `current`, returning the next snapshot if any.
	fn apply_to(self, current: Option<&S>) -> Option<S> {
		match (self, current) {
			(Self::NoChange, _) | (Self::Patch(_), None) => None,
			(Self::Patch(patch), Some(current)) => Some(current.merge(patch)),
			(Self::Replace(next), _) => Some(next),
		}
	}
}

impl<S> std::fmt::Debug for Update<S>
where
	S: Snapshot + std::fmt::Debug,
	S::Patch: std::fmt::Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::NoChange => f.write_str("NoChange"),
			Self::Patch(patch) => f.debug_tuple("Patch").field(patch).finish(),
			Self::Replace(next) => f.debug_tuple("Replace").field(next).finish(),
		}
	}
}

/// Identifier of a store listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;
type PendingAction<S> = Box<dyn FnOnce(Option<&S>) -> Update<S> + Send>;

struct StoreState<S: Snapshot> {
	snapshot: Option<S>,
	listeners: Vec<(ListenerId, Listener<S>)>,
	/// Actions dispatched before the first snapshot, in arrival order.
	pending: VecDeque<PendingAction<S>>,
	/// Set once the first snapshot can no longer arrive; events are then dropped.
	failed: bool,
	next_listener: u64,
}

impl<S: Snapshot> StoreState<S> {
	fn listeners(&self) -> Vec<Listener<S>> {
		self.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
	}
}

struct StoreInner<S: Snapshot> {
	/// Serializes mutate-and-notify. Reentrant so listeners may subscribe or dispatch.
	dispatch: ReentrantMutex<()>,
	state: Mutex<StoreState<S>>,
}

/// Live, shared container for one collection's snapshot.
///
/// Cloning a store yields another handle to the same value.
pub struct Store<S: Snapshot> {
	inner: Arc<StoreInner<S>>,
}

impl<S: Snapshot> Clone for Store<S> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<S: Snapshot> Default for Store<S> {
	fn default() -> Self {
		Self::new()
	}
}

impl<S: Snapshot> std::fmt::Debug for Store<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("Store")
			.field("ready", &state.snapshot.is_some())
			.field("listeners", &state.listeners.len())
			.field("pending", &state.pending.len())
			.finish()
	}
}

impl<S: Snapshot> Store<S> {
	/// Creates a store with no snapshot yet.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(StoreInner {
				dispatch: ReentrantMutex::new(()),
				state: Mutex::new(StoreState {
					snapshot: None,
					listeners: Vec::new(),
					pending: VecDeque::new(),
					failed: false,
					next_listener: 0,
				}),
			}),
		}
	}

	/// Creates a store holding `snapshot`.
	pub fn with_snapshot(snapshot: S) -> Self {
		let store = Self::new();
		store.inner.state.lock().snapshot = Some(snapshot);
		store
	}

	/// Returns the current snapshot, if one has been installed.
	pub fn state(&self) -> Option<S> {
		self.inner.state.lock().snapshot.clone()
	}

	/// Returns true once a snapshot has been installed.
	pub fn is_ready(&self) -> bool {
		self.inner.state.lock().snapshot.is_some()
	}

	/// Returns the number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.inner.state.lock().listeners.len()
	}

	/// Returns the number of actions buffered while waiting for the first snapshot.
	pub fn pending_len(&self) -> usize {
		self.inner.state.lock().pending.len()
	}

	/// Registers `listener` for every future snapshot.
	///
	/// If a snapshot already exists the listener is called with it before this returns.
	pub fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> ListenerId {
		let listener: Listener<S> = Arc::new(listener);
		let _dispatch = self.inner.dispatch.lock();
		let (id, current) = {
			let mut state = self.inner.state.lock();
			let id = ListenerId(state.next_listener);
			state.next_listener += 1;
			state.listeners.push((id, Arc::clone(&listener)));
			(id, state.snapshot.clone())
		};
		if let Some(current) = current {
			listener(&current);
		}
		id
	}

	/// Removes a listener. Returns false if it was already removed.
	///
	/// Waits for an in-progress notification, so the listener is never called after this
	/// returns.
	pub fn unsubscribe(&self, id: ListenerId) -> bool {
		let _dispatch = self.inner.dispatch.lock();
		let mut state = self.inner.state.lock();
		let before = state.listeners.len();
		state.listeners.retain(|(listener, _)| *listener != id);
		state.listeners.len() != before
	}

	/// Runs `reducer` against the current snapshot and applies its outcome.
	///
	/// Before the first snapshot lands the event is buffered and reduced, in arrival
	/// order, against that snapshot once it is installed.
	pub fn dispatch<E, R>(&self, reducer: R, event: E)
	where
		E: Send + 'static,
		R: FnOnce(Option<&S>, &E) -> Update<S> + Send + 'static,
	{
		let _dispatch = self.inner.dispatch.lock();
		let (next, listeners) = {
			let mut state = self.inner.state.lock();
			let Some(current) = state.snapshot.as_ref() else {
				if state.failed {
					return;
				}
				state.pending.push_back(Box::new(move |current: Option<&S>| reducer(current, &event)));
				return;
			};
			let Some(next) = reducer(Some(current), &event).apply_to(Some(current)) else {
				return;
			};
			state.snapshot = Some(next.clone());
			(next, state.listeners())
		};
		notify(&listeners, &next);
	}

	/// Binds `reducer` into an event callback that dispatches into this store.
	pub fn action<E, R>(&self, reducer: R) -> impl Fn(E) + Send + Sync + Clone + 'static + use<S, E, R>
	where
		E: Send + 'static,
		R: Fn(Option<&S>, &E) -> Update<S> + Send + Sync + Clone + 'static,
	{
		let store = self.clone();
		move |event| store.dispatch(reducer.clone(), event)
	}

	/// Marks the store as never receiving its first snapshot.
	///
	/// Buffered actions are discarded and later dispatches are dropped until a snapshot is
	/// installed with [`Store::set_state`]. Has no effect once a snapshot exists.
	pub fn fail(&self) {
		let _dispatch = self.inner.dispatch.lock();
		let mut state = self.inner.state.lock();
		if state.snapshot.is_none() {
			state.failed = true;
			state.pending.clear();
		}
	}

	/// Applies `update` directly, draining buffered actions on top of a fresh baseline.
	///
	/// Returns true if listeners were notified.
	pub fn set_state(&self, update: Update<S>) -> bool {
		let _dispatch = self.inner.dispatch.lock();
		let (next, listeners) = {
			let mut state = self.inner.state.lock();
			let Some(mut next) = update.apply_to(state.snapshot.as_ref()) else {
				return false;
			};
			while let Some(action) = state.pending.pop_front() {
				if let Some(reduced) = action(Some(&next)).apply_to(Some(&next)) {
					next = reduced;
				}
			}
			state.snapshot = Some(next.clone());
			state.failed = false;
			(next, state.listeners())
		};
		notify(&listeners, &next);
		true
	}
}

fn notify<S>(listeners: &[Listener<S>], snapshot: &S) {
	for listener in listeners {
		listener(snapshot);
	}
}

#[cfg(test)]
mod tests;
