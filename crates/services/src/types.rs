//! Service registry snapshot types.

use std::sync::Arc;

use hearth_collection::Snapshot;
use hearth_connection::JsonValue;
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Description of one callable service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
	/// Human readable description.
	#[serde(default)]
	pub description: String,
	/// Accepted fields keyed by field name.
	#[serde(default)]
	pub fields: IndexMap<String, JsonValue>,
}

impl ServiceDescriptor {
	/// The descriptor recorded for a service announced by an event.
	///
	/// Events carry only the service name, so description and fields stay empty.
	pub fn placeholder() -> Self {
		Self::default()
	}
}

/// Services of one domain keyed by service name.
pub type DomainServices = IndexMap<String, ServiceDescriptor>;

/// Immutable snapshot of the remote service registry.
///
/// Maps domain name to that domain's services. Cloning is cheap, and a snapshot derived
/// through [`Snapshot::merge`] shares every untouched domain with its parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceRegistry {
	domains: Arc<IndexMap<String, Arc<DomainServices>>>,
}

impl ServiceRegistry {
	/// Returns the services of `domain`.
	pub fn domain(&self, domain: &str) -> Option<&DomainServices> {
		self.domains.get(domain).map(|services| &**services)
	}

	/// Returns the descriptor of `domain.service`.
	pub fn service(&self, domain: &str, service: &str) -> Option<&ServiceDescriptor> {
		self.domain(domain)?.get(service)
	}

	/// Returns true if `domain.service` is registered.
	pub fn has_service(&self, domain: &str, service: &str) -> bool {
		self.service(domain, service).is_some()
	}

	/// Iterates domain names in registry order.
	pub fn domains(&self) -> impl Iterator<Item = &str> {
		self.domains.keys().map(String::as_str)
	}

	/// Returns the number of domains.
	pub fn len(&self) -> usize {
		self.domains.len()
	}

	/// Returns true if no domain is registered.
	pub fn is_empty(&self) -> bool {
		self.domains.is_empty()
	}
}

impl From<IndexMap<String, DomainServices>> for ServiceRegistry {
	fn from(domains: IndexMap<String, DomainServices>) -> Self {
		Self {
			domains: Arc::new(
				domains
					.into_iter()
					.map(|(domain, services)| (domain, Arc::new(services)))
					.collect(),
			),
		}
	}
}

impl Serialize for ServiceRegistry {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.domains.len()))?;
		for (domain, services) in self.domains.iter() {
			map.serialize_entry(domain, &**services)?;
		}
		map.end()
	}
}

impl<'de> Deserialize<'de> for ServiceRegistry {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		IndexMap::<String, DomainServices>::deserialize(deserializer).map(Self::from)
	}
}

/// Replacement services for a single domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainPatch {
	/// Domain being replaced.
	pub domain: String,
	/// The domain's complete new service map.
	pub services: DomainServices,
}

impl Snapshot for ServiceRegistry {
	type Patch = DomainPatch;

	fn merge(&self, patch: DomainPatch) -> Self {
		let mut domains = (*self.domains).clone();
		domains.insert(patch.domain, Arc::new(patch.services));
		Self {
			domains: Arc::new(domains),
		}
	}
}

/// Payload of `service_registered` and `service_removed` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEvent {
	/// Domain of the service.
	pub domain: String,
	/// Service name within the domain.
	pub service: String,
}

impl ServiceEvent {
	/// Creates a payload for `domain.service`.
	pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
		Self {
			domain: domain.into(),
			service: service.into(),
		}
	}
}
