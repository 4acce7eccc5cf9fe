use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;

#[derive(Debug, Clone, PartialEq)]
struct Tally(Vec<i32>);

impl Snapshot for Tally {
	type Patch = i32;

	fn merge(&self, patch: i32) -> Self {
		let mut values = self.0.clone();
		values.push(patch);
		Self(values)
	}
}

fn push(_: Option<&Tally>, value: &i32) -> Update<Tally> {
	Update::Patch(*value)
}

fn push_if_ready(state: Option<&Tally>, value: &i32) -> Update<Tally> {
	match state {
		Some(_) => Update::Patch(*value),
		None => Update::NoChange,
	}
}

fn skip_negative(_: Option<&Tally>, value: &i32) -> Update<Tally> {
	if *value < 0 { Update::NoChange } else { Update::Patch(*value) }
}

fn recorder(store: &Store<Tally>) -> (ListenerId, Arc<Mutex<Vec<Vec<i32>>>>) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	let id = store.subscribe(move |tally: &Tally| sink.lock().push(tally.0.clone()));
	(id, seen)
}

#[test]
fn test_dispatch_patches_and_notifies() {
	let store = Store::with_snapshot(Tally(vec![1]));
	let (_, seen) = recorder(&store);

	store.dispatch(push, 2);
	store.dispatch(push, 3);

	assert_eq!(store.state(), Some(Tally(vec![1, 2, 3])));
	assert_eq!(*seen.lock(), vec![vec![1], vec![1, 2], vec![1, 2, 3]]);
}

#[test]
fn test_no_change_skips_notification() {
	let store = Store::with_snapshot(Tally(vec![]));
	let (_, seen) = recorder(&store);

	store.dispatch(skip_negative, -1);
	store.dispatch(skip_negative, 4);

	assert_eq!(*seen.lock(), vec![vec![], vec![4]]);
}

#[test]
fn test_events_before_baseline_are_buffered_in_order() {
	let store = Store::new();
	let (_, seen) = recorder(&store);

	store.dispatch(push_if_ready, 7);
	store.dispatch(push_if_ready, 8);
	assert_eq!(store.pending_len(), 2);
	assert!(!store.is_ready());
	assert!(seen.lock().is_empty());

	assert!(store.set_state(Update::Replace(Tally(vec![1]))));

	assert_eq!(store.pending_len(), 0);
	assert_eq!(store.state(), Some(Tally(vec![1, 7, 8])));
	assert_eq!(*seen.lock(), vec![vec![1, 7, 8]]);
}

#[test]
fn test_patch_without_baseline_is_ignored() {
	let store: Store<Tally> = Store::new();
	assert!(!store.set_state(Update::Patch(3)));
	assert!(!store.set_state(Update::NoChange));
	assert_eq!(store.state(), None);
}

#[test]
fn test_late_listener_gets_current_snapshot() {
	let store = Store::with_snapshot(Tally(vec![5]));
	store.dispatch(push, 6);

	let (_, seen) = recorder(&store);
	assert_eq!(*seen.lock(), vec![vec![5, 6]]);
}

#[test]
fn test_unsubscribe_stops_delivery() {
	let store = Store::with_snapshot(Tally(vec![]));
	let (first, first_seen) = recorder(&store);
	let (_, second_seen) = recorder(&store);
	assert_eq!(store.listener_count(), 2);

	assert!(store.unsubscribe(first));
	assert!(!store.unsubscribe(first));
	store.dispatch(push, 1);

	assert_eq!(*first_seen.lock(), vec![Vec::<i32>::new()]);
	assert_eq!(*second_seen.lock(), vec![vec![], vec![1]]);
	assert_eq!(store.listener_count(), 1);
}

#[test]
fn test_unsubscribe_waits_for_running_notification() {
	use std::sync::atomic::{AtomicBool, Ordering};
	use std::sync::mpsc;
	use std::time::Duration;

	let store = Store::with_snapshot(Tally(vec![]));
	let (entered_tx, entered_rx) = mpsc::channel();
	let (resume_tx, resume_rx) = mpsc::channel::<()>();
	let resume_rx = Mutex::new(resume_rx);
	let unsubscribed = Arc::new(AtomicBool::new(false));
	let returned_during_callback = Arc::new(AtomicBool::new(false));

	let flag = Arc::clone(&unsubscribed);
	let observed = Arc::clone(&returned_during_callback);
	let id = store.subscribe(move |tally: &Tally| {
		if tally.0 == [1] {
			entered_tx.send(()).unwrap();
			resume_rx.lock().recv().unwrap();
			observed.store(flag.load(Ordering::SeqCst), Ordering::SeqCst);
		}
	});

	std::thread::scope(|scope| {
		let dispatcher = store.clone();
		scope.spawn(move || dispatcher.dispatch(push, 1));
		entered_rx.recv().unwrap();

		let remover = store.clone();
		let flag = Arc::clone(&unsubscribed);
		scope.spawn(move || {
			assert!(remover.unsubscribe(id));
			flag.store(true, Ordering::SeqCst);
		});
		std::thread::sleep(Duration::from_millis(50));
		resume_tx.send(()).unwrap();
	});

	assert!(unsubscribed.load(Ordering::SeqCst));
	assert!(!returned_during_callback.load(Ordering::SeqCst));
	assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_listener_may_unsubscribe_itself() {
	let store = Store::with_snapshot(Tally(vec![]));
	let calls = Arc::new(Mutex::new(0));
	let own_id = Arc::new(Mutex::new(None));

	let inner_store = store.clone();
	let sink = Arc::clone(&calls);
	let slot = Arc::clone(&own_id);
	let id = store.subscribe(move |tally: &Tally| {
		*sink.lock() += 1;
		if tally.0 == [1]
			&& let Some(id) = *slot.lock()
		{
			inner_store.unsubscribe(id);
		}
	});
	*own_id.lock() = Some(id);

	store.dispatch(push, 1);
	store.dispatch(push, 2);

	assert_eq!(*calls.lock(), 2);
	assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_failed_store_drops_events() {
	let store = Store::new();
	let (_, seen) = recorder(&store);
	store.dispatch(push, 1);
	assert_eq!(store.pending_len(), 1);

	store.fail();
	assert_eq!(store.pending_len(), 0);
	for i in 0..100 {
		store.dispatch(push, i);
	}
	assert_eq!(store.pending_len(), 0);
	assert_eq!(store.state(), None);

	assert!(store.set_state(Update::Replace(Tally(vec![7]))));
	store.dispatch(push, 8);
	assert_eq!(*seen.lock(), vec![vec![7], vec![7, 8]]);
}

#[test]
fn test_fail_after_baseline_is_ignored() {
	let store = Store::with_snapshot(Tally(vec![1]));
	store.fail();
	store.dispatch(push, 2);
	assert_eq!(store.state(), Some(Tally(vec![1, 2])));
}

#[test]
fn test_action_binds_reducer() {
	let store = Store::with_snapshot(Tally(vec![]));
	let on_event = store.action(push);
	let cloned = on_event.clone();

	on_event(1);
	cloned(2);

	assert_eq!(store.state(), Some(Tally(vec![1, 2])));
}

#[test]
fn test_listener_may_subscribe_reentrantly() {
	let store = Store::with_snapshot(Tally(vec![]));
	let nested = Arc::new(Mutex::new(Vec::new()));

	let inner_store = store.clone();
	let sink = Arc::clone(&nested);
	store.subscribe(move |tally: &Tally| {
		if tally.0 == [1] {
			let sink = Arc::clone(&sink);
			inner_store.subscribe(move |tally: &Tally| sink.lock().push(tally.0.clone()));
		}
	});

	store.dispatch(push, 1);
	store.dispatch(push, 2);

	assert_eq!(*nested.lock(), vec![vec![1], vec![1, 2]]);
}

#[test]
fn test_concurrent_dispatch_is_serialized() {
	let store = Store::with_snapshot(Tally(vec![]));
	let (_, seen) = recorder(&store);

	std::thread::scope(|scope| {
		for worker in 0..4 {
			let store = store.clone();
			scope.spawn(move || {
				for i in 0..25 {
					store.dispatch(push, worker * 100 + i);
				}
			});
		}
	});

	let state = store.state().unwrap();
	assert_eq!(state.0.len(), 100);
	let seen = seen.lock();
	assert_eq!(seen.len(), 101);
	for (len, snapshot) in seen.iter().enumerate() {
		assert_eq!(snapshot.len(), len);
	}
}
