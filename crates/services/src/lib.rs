//! Live view of a remote service registry.
//!
//! The registry is fetched once per connection, then kept current from
//! `service_registered` and `service_removed` events. All local subscribers share that
//! one live value through a [`CollectionCache`](hearth_collection::CollectionCache):
//!
//! ```ignore
//! let cache = CollectionCache::new(conn);
//! let sub = subscribe_services(&cache, |registry| {
//!     println!("{} domains", registry.len());
//! })?;
//! let registry = sub.ready().await?;
//! ```

#![warn(missing_docs)]

pub mod collection;
pub mod reducer;
pub mod types;

pub use collection::{
	SERVICE_REGISTERED, SERVICE_REMOVED, SERVICES_KEY, ServicesCollection, fetch_services, subscribe_services,
	subscribe_updates,
};
pub use reducer::{ServiceRegisteredEvent, ServiceRemovedEvent, process_service_registered, process_service_removed};
pub use types::{DomainPatch, DomainServices, ServiceDescriptor, ServiceEvent, ServiceRegistry};
