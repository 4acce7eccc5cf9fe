//! Reducers turning registry events into snapshot patches.
//!
//! Both reducers are pure. They return [`Update::NoChange`] while no snapshot exists and
//! for events that would not change it, so duplicate or out-of-order events are harmless.

use hearth_collection::Update;
use hearth_connection::EventMessage;

use crate::types::{DomainPatch, DomainServices, ServiceDescriptor, ServiceEvent, ServiceRegistry};

/// A `service_registered` event.
pub type ServiceRegisteredEvent = EventMessage<ServiceEvent>;
/// A `service_removed` event.
pub type ServiceRemovedEvent = EventMessage<ServiceEvent>;

/// Adds the announced service, with a placeholder descriptor, to its domain.
pub fn process_service_registered(state: Option<&ServiceRegistry>, event: &ServiceRegisteredEvent) -> Update<ServiceRegistry> {
	let Some(state) = state else {
		return Update::NoChange;
	};
	let ServiceEvent { domain, service } = &event.data;

	let mut services = state.domain(domain).cloned().unwrap_or_default();
	services.insert(service.clone(), ServiceDescriptor::placeholder());

	Update::Patch(DomainPatch {
		domain: domain.clone(),
		services,
	})
}

/// Removes the service from its domain. The domain itself stays, even when emptied.
pub fn process_service_removed(state: Option<&ServiceRegistry>, event: &ServiceRemovedEvent) -> Update<ServiceRegistry> {
	let Some(state) = state else {
		return Update::NoChange;
	};
	let ServiceEvent { domain, service } = &event.data;

	let Some(current) = state.domain(domain) else {
		return Update::NoChange;
	};
	if !current.contains_key(service) {
		return Update::NoChange;
	}

	let services: DomainServices = current
		.iter()
		.filter(|(name, _)| *name != service)
		.map(|(name, descriptor)| (name.clone(), descriptor.clone()))
		.collect();

	Update::Patch(DomainPatch {
		domain: domain.clone(),
		services,
	})
}
