//! Connection-scoped live collections.
//!
//! This crate provides the subscribe-collection pattern:
//! * [`Store`]: a live snapshot with ordered listeners and a single mutation path
//! * [`Collection`]: how to fetch a snapshot and attach its update events
//! * [`CollectionCache`]: one shared, reference-counted live value per key and connection
//! * [`Subscription`]: a subscriber's handle, released on drop

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod disposer;
mod error;
pub mod store;

pub use cache::{Collection, CollectionCache, Subscription};
pub use config::CollectionConfig;
pub use disposer::Disposer;
pub use error::{Error, Result};
pub use store::{ListenerId, Snapshot, Store, Update};
