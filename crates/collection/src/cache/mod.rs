//! Connection-scoped cache of live collections.
//!
//! A [`CollectionCache`] belongs to one connection and shares one live value per
//! collection key among all local subscribers.
//!
//! # Lifecycle
//!
//! 1. The first [`CollectionCache::subscribe`] for a key creates an entry and spawns its
//!    initialization: `fetch` and `subscribe_updates` run concurrently. Events that arrive
//!    before the fetch lands are buffered by the [`Store`] and applied on top of it.
//! 2. Later subscribers join the existing entry and are replayed the current snapshot.
//!    Only one initialization ever runs per entry.
//! 3. When the last [`Subscription`] is released the entry is removed and its
//!    [`Disposer`] runs, so the next subscriber fetches from scratch.
//!
//! A failed initialization is published to [`Subscription::ready`] waiters and evicts
//! the entry, allowing a retry on the next subscribe. A fetch that resolves after its
//! entry was torn down is discarded.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use hearth_connection::Connection;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::store::{ListenerId, Snapshot, Store, Update};
use crate::{CollectionConfig, Disposer, Error, Result};

/// A named live value backed by a fetch and a stream of update events.
#[async_trait]
pub trait Collection: Send + Sync + 'static {
	/// The snapshot type held by the collection's store.
	type Snapshot: Snapshot;

	/// Cache key identifying this collection on a connection.
	fn key(&self) -> &str;

	/// Fetches the full snapshot.
	async fn fetch(&self, conn: &Arc<dyn Connection>) -> Result<Self::Snapshot>;

	/// Attaches event listeners that dispatch into `store`.
	///
	/// The returned [`Disposer`] must release everything attached here.
	async fn subscribe_updates(&self, conn: &Arc<dyn Connection>, store: Store<Self::Snapshot>) -> Result<Disposer>;
}

/// Initialization outcome published to [`Subscription::ready`] waiters.
type Outcome<S> = Option<Result<S>>;

/// Reference count and teardown state of one entry.
struct Lifecycle {
	ref_count: usize,
	disposer: Option<Disposer>,
	closed: bool,
}

struct Entry<S: Snapshot> {
	key: String,
	generation: u64,
	collection: Arc<dyn Collection<Snapshot = S>>,
	store: Store<S>,
	lifecycle: Mutex<Lifecycle>,
	ready: watch::Sender<Outcome<S>>,
}

impl<S: Snapshot> Entry<S> {
	fn new(key: String, generation: u64, collection: Arc<dyn Collection<Snapshot = S>>) -> Self {
		let (ready, _) = watch::channel(None);
		Self {
			key,
			generation,
			collection,
			store: Store::new(),
			lifecycle: Mutex::new(Lifecycle {
				ref_count: 1,
				disposer: None,
				closed: false,
			}),
			ready,
		}
	}

	fn is_closed(&self) -> bool {
		self.lifecycle.lock().closed
	}

	/// Records the disposer, or runs it right away if the entry was already torn down.
	fn install_disposer(&self, disposer: Disposer) {
		let mut lifecycle = self.lifecycle.lock();
		if lifecycle.closed {
			drop(lifecycle);
			debug!(key = %self.key, generation = self.generation, "Releasing updates attached after teardown");
			spawn_dispose(self.key.clone(), disposer);
		} else {
			lifecycle.disposer = Some(disposer);
		}
	}

	fn publish(&self, outcome: Result<S>) {
		self.ready.send_replace(Some(outcome));
	}

	fn current(&self) -> Result<S> {
		self.store.state().ok_or_else(|| Error::Evicted {
			key: self.key.clone(),
		})
	}
}

fn spawn_dispose(key: String, disposer: Disposer) {
	let Ok(runtime) = Handle::try_current() else {
		warn!(key = %key, subscriptions = ?disposer.subscriptions(), "No runtime to release collection updates");
		return;
	};
	runtime.spawn(async move {
		if let Err(e) = disposer.dispose().await {
			warn!(key = %key, error = %e, "Failed to dispose collection updates");
		}
	});
}

/// A type-erased entry tagged with its generation.
struct CachedEntry {
	generation: u64,
	entry: Arc<dyn Any + Send + Sync>,
}

struct CacheInner {
	conn: Arc<dyn Connection>,
	config: CollectionConfig,
	entries: Mutex<HashMap<String, CachedEntry>>,
	generations: AtomicU64,
}

impl CacheInner {
	/// Drops one reference; the last one tears the entry down.
	///
	/// Lock order is `entries` then `lifecycle`, matching [`CollectionCache::subscribe`], so a
	/// subscriber can never join an entry that is being torn down.
	fn release<S: Snapshot>(&self, entry: &Entry<S>) {
		let disposer = {
			let mut entries = self.entries.lock();
			let mut lifecycle = entry.lifecycle.lock();
			lifecycle.ref_count = lifecycle.ref_count.saturating_sub(1);
			if lifecycle.ref_count > 0 || lifecycle.closed {
				return;
			}
			lifecycle.closed = true;
			if entries
				.get(&entry.key)
				.is_some_and(|cached| cached.generation == entry.generation)
			{
				entries.remove(&entry.key);
			}
			lifecycle.disposer.take()
		};

		debug!(key = %entry.key, generation = entry.generation, "Tearing down collection");
		if let Some(disposer) = disposer {
			spawn_dispose(entry.key.clone(), disposer);
		}
	}

	/// Removes `entry` from the table if it is still the current generation for its key.
	fn evict<S: Snapshot>(&self, entry: &Entry<S>) {
		let mut entries = self.entries.lock();
		if entries
			.get(&entry.key)
			.is_some_and(|cached| cached.generation == entry.generation)
		{
			entries.remove(&entry.key);
		}
	}

	async fn fetch<S: Snapshot>(&self, entry: &Entry<S>) -> Result<S> {
		let fetch = entry.collection.fetch(&self.conn);
		match self.config.fetch_timeout_duration() {
			Some(limit) => tokio::time::timeout(limit, fetch)
				.await
				.map_err(|_| Error::FetchTimeout {
					key: entry.key.clone(),
				})?,
			None => fetch.await,
		}
	}
}

/// Publishes an abort and evicts the entry if initialization stops without an outcome.
struct InitGuard<S: Snapshot> {
	cache: Arc<CacheInner>,
	entry: Arc<Entry<S>>,
	completed: bool,
}

impl<S: Snapshot> InitGuard<S> {
	fn complete(mut self, outcome: Result<S>) {
		self.completed = true;
		self.entry.publish(outcome);
	}
}

impl<S: Snapshot> Drop for InitGuard<S> {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		self.cache.evict(&self.entry);
		self.entry.store.fail();
		self.entry.publish(Err(Error::InitAborted {
			key: self.entry.key.clone(),
		}));
	}
}

async fn initialize<S: Snapshot>(cache: Arc<CacheInner>, entry: Arc<Entry<S>>) {
	let guard = InitGuard {
		cache: Arc::clone(&cache),
		entry: Arc::clone(&entry),
		completed: false,
	};

	let attach = async {
		let disposer = entry
			.collection
			.subscribe_updates(&cache.conn, entry.store.clone())
			.await?;
		entry.install_disposer(disposer);
		Ok::<_, Error>(())
	};
	let (fetched, attached) = tokio::join!(cache.fetch(&entry), attach);

	let outcome = match (fetched, attached) {
		(Ok(snapshot), Ok(())) => {
			if entry.is_closed() {
				debug!(key = %entry.key, generation = entry.generation, "Discarding fetch result for torn down collection");
				entry.store.fail();
				Err(Error::Evicted {
					key: entry.key.clone(),
				})
			} else {
				entry.store.set_state(Update::Replace(snapshot));
				entry.current()
			}
		}
		(Err(e), _) | (Ok(_), Err(e)) => {
			warn!(key = %entry.key, generation = entry.generation, error = %e, "Collection initialization failed");
			cache.evict(&entry);
			entry.store.fail();
			Err(e)
		}
	};
	guard.complete(outcome);
}

/// Registry of live collections owned by one connection.
///
/// Cloning the cache yields another handle to the same table.
#[derive(Clone)]
pub struct CollectionCache {
	inner: Arc<CacheInner>,
}

impl std::fmt::Debug for CollectionCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CollectionCache")
			.field("config", &self.inner.config)
			.field("entries", &self.len())
			.finish_non_exhaustive()
	}
}

impl CollectionCache {
	/// Creates an empty cache for `conn` with the default configuration.
	pub fn new(conn: Arc<dyn Connection>) -> Self {
		Self::with_config(conn, CollectionConfig::default())
	}

	/// Creates an empty cache for `conn`.
	pub fn with_config(conn: Arc<dyn Connection>, config: CollectionConfig) -> Self {
		Self {
			inner: Arc::new(CacheInner {
				conn,
				config,
				entries: Mutex::new(HashMap::new()),
				generations: AtomicU64::new(0),
			}),
		}
	}

	/// Returns the connection this cache is scoped to.
	pub fn connection(&self) -> &Arc<dyn Connection> {
		&self.inner.conn
	}

	/// Returns the cache configuration.
	pub fn config(&self) -> &CollectionConfig {
		&self.inner.config
	}

	/// Returns the number of live collections.
	pub fn len(&self) -> usize {
		self.inner.entries.lock().len()
	}

	/// Returns true if no collection is live.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns true if a live collection exists for `key`.
	pub fn contains(&self, key: &str) -> bool {
		self.inner.entries.lock().contains_key(key)
	}

	/// Subscribes `on_change` to `collection`, creating and initializing it on first use.
	///
	/// `on_change` is called with every new snapshot, and immediately with the current one
	/// if the collection is already loaded.
	///
	/// # Errors
	///
	/// Returns [`Error::NoRuntime`] outside a tokio runtime, and
	/// [`Error::KeyTypeMismatch`] if the key is live with another snapshot type.
	pub fn subscribe<C, F>(&self, collection: C, on_change: F) -> Result<Subscription<C::Snapshot>>
	where
		C: Collection,
		F: Fn(&C::Snapshot) + Send + Sync + 'static,
	{
		let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
		let key = collection.key().to_string();
		let (entry, created) = {
			let mut entries = self.inner.entries.lock();
			match entries.get(&key) {
				Some(cached) => {
					let entry = Arc::clone(&cached.entry)
						.downcast::<Entry<C::Snapshot>>()
						.map_err(|_| Error::KeyTypeMismatch { key: key.clone() })?;
					entry.lifecycle.lock().ref_count += 1;
					(entry, false)
				}
				None => {
					let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
					let entry = Arc::new(Entry::new(key.clone(), generation, Arc::new(collection)));
					entries.insert(
						key.clone(),
						CachedEntry {
							generation,
							entry: Arc::clone(&entry) as Arc<dyn Any + Send + Sync>,
						},
					);
					(entry, true)
				}
			}
		};

		let listener = entry.store.subscribe(on_change);
		if created {
			debug!(key = %key, generation = entry.generation, "Creating collection");
			runtime.spawn(initialize(Arc::clone(&self.inner), Arc::clone(&entry)));
		}

		Ok(Subscription {
			cache: Arc::clone(&self.inner),
			entry,
			listener,
			released: AtomicBool::new(false),
		})
	}
}

/// One subscriber's handle on a live collection.
///
/// Dropping the handle unsubscribes.
pub struct Subscription<S: Snapshot> {
	cache: Arc<CacheInner>,
	entry: Arc<Entry<S>>,
	listener: ListenerId,
	released: AtomicBool,
}

impl<S: Snapshot> std::fmt::Debug for Subscription<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("key", &self.entry.key)
			.field("generation", &self.entry.generation)
			.field("active", &self.is_active())
			.finish_non_exhaustive()
	}
}

impl<S: Snapshot> Subscription<S> {
	/// Returns the collection key.
	pub fn key(&self) -> &str {
		&self.entry.key
	}

	/// Returns the generation of the entry this subscription belongs to.
	pub fn generation(&self) -> u64 {
		self.entry.generation
	}

	/// Returns false once [`Subscription::unsubscribe`] has been called.
	pub fn is_active(&self) -> bool {
		!self.released.load(Ordering::Acquire)
	}

	/// Returns the last known snapshot.
	pub fn state(&self) -> Option<S> {
		self.entry.store.state()
	}

	/// Waits for the initial snapshot and returns the current one.
	///
	/// # Errors
	///
	/// Returns the fetch or subscription failure that aborted initialization.
	pub async fn ready(&self) -> Result<S> {
		let mut ready = self.entry.ready.subscribe();
		let outcome = ready.wait_for(Option::is_some).await.ok().and_then(|outcome| (*outcome).clone());
		match outcome {
			Some(Ok(_)) => self.entry.current(),
			Some(Err(e)) => Err(e),
			None => Err(Error::InitAborted {
				key: self.entry.key.clone(),
			}),
		}
	}

	/// Fetches the collection again and replaces the snapshot, notifying every subscriber.
	pub async fn refresh(&self) -> Result<S> {
		let snapshot = self.cache.fetch(&self.entry).await?;
		if self.entry.is_closed() {
			return Err(Error::Evicted {
				key: self.entry.key.clone(),
			});
		}
		self.entry.store.set_state(Update::Replace(snapshot));
		self.entry.current()
	}

	/// Stops delivery to this subscriber. Calling it again has no effect.
	pub fn unsubscribe(&self) {
		if self.released.swap(true, Ordering::AcqRel) {
			return;
		}
		self.entry.store.unsubscribe(self.listener);
		self.cache.release(&self.entry);
	}
}

impl<S: Snapshot> Drop for Subscription<S> {
	fn drop(&mut self) {
		self.unsubscribe();
	}
}
