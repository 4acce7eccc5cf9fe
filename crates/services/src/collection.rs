//! Wiring of the service registry into the collection cache.

use std::sync::Arc;

use async_trait::async_trait;
use hearth_collection::{Collection, CollectionCache, Disposer, Result, Store, Subscription};
use hearth_connection::{Connection, messages, send_command, subscribe_typed_events};
use tracing::warn;

use crate::reducer::{process_service_registered, process_service_removed};
use crate::types::{ServiceEvent, ServiceRegistry};

/// Cache key of the service registry collection.
pub const SERVICES_KEY: &str = "_srv";
/// Event announcing a newly registered service.
pub const SERVICE_REGISTERED: &str = "service_registered";
/// Event announcing a removed service.
pub const SERVICE_REMOVED: &str = "service_removed";

/// Fetches the complete service registry.
pub async fn fetch_services(conn: &dyn Connection) -> hearth_connection::Result<ServiceRegistry> {
	send_command(conn, messages::get_services()).await
}

/// Attaches the registry's update events to `store`.
///
/// Both subscriptions are requested concurrently; if one fails the other is released
/// before the error is returned.
pub async fn subscribe_updates(conn: &Arc<dyn Connection>, store: Store<ServiceRegistry>) -> Result<Disposer> {
	let (registered, removed) = tokio::join!(
		subscribe_typed_events::<ServiceEvent, _>(&**conn, SERVICE_REGISTERED, store.action(process_service_registered)),
		subscribe_typed_events::<ServiceEvent, _>(&**conn, SERVICE_REMOVED, store.action(process_service_removed)),
	);

	match (registered, removed) {
		(Ok(registered), Ok(removed)) => Ok(Disposer::new(Arc::clone(conn), vec![registered, removed])),
		(Ok(attached), Err(e)) | (Err(e), Ok(attached)) => {
			if let Err(release_err) = Disposer::new(Arc::clone(conn), vec![attached]).dispose().await {
				warn!(error = %release_err, "Failed to release partial registry subscription");
			}
			Err(e.into())
		}
		(Err(e), Err(_)) => Err(e.into()),
	}
}

/// The service registry as a live collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServicesCollection;

#[async_trait]
impl Collection for ServicesCollection {
	type Snapshot = ServiceRegistry;

	fn key(&self) -> &str {
		SERVICES_KEY
	}

	async fn fetch(&self, conn: &Arc<dyn Connection>) -> Result<ServiceRegistry> {
		Ok(fetch_services(&**conn).await?)
	}

	async fn subscribe_updates(&self, conn: &Arc<dyn Connection>, store: Store<ServiceRegistry>) -> Result<Disposer> {
		subscribe_updates(conn, store).await
	}
}

/// Subscribes `on_change` to the live service registry of `cache`'s connection.
///
/// `on_change` receives every new registry snapshot; dropping or unsubscribing the
/// returned handle stops delivery.
pub fn subscribe_services<F>(cache: &CollectionCache, on_change: F) -> Result<Subscription<ServiceRegistry>>
where
	F: Fn(&ServiceRegistry) + Send + Sync + 'static,
{
	cache.subscribe(ServicesCollection, on_change)
}
