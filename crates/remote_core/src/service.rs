//! Local service registry: the narrow interface through which the export
//! dispatcher learns about services of this framework.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use remote_model::constants::{
    OBJECTCLASS, SERVICE_EXPORTED_CONFIGS, SERVICE_EXPORTED_INTERFACES, SERVICE_ID,
};
use remote_model::Properties;

use crate::listener::{ListenerId, ListenerList};

/// Snapshot of a registered service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReference {
    id: i64,
    properties: Properties,
}

impl ServiceReference {
    /// `service.id` is forced to `id` in the stored properties.
    pub fn new(id: i64, mut properties: Properties) -> Self {
        properties.insert(SERVICE_ID.to_string(), Value::from(id));
        Self { id, properties }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Whether the service asks to be exported at all.
    pub fn has_export_intent(&self) -> bool {
        self.properties.contains_key(SERVICE_EXPORTED_CONFIGS)
            || self.properties.contains_key(SERVICE_EXPORTED_INTERFACES)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Registered(ServiceReference),
    /// Properties changed.
    Modified(ServiceReference),
    /// Properties changed and the service dropped its export intent.
    ModifiedEndMatch(ServiceReference),
    Unregistering(ServiceReference),
}

impl ServiceEvent {
    pub fn reference(&self) -> &ServiceReference {
        match self {
            Self::Registered(r)
            | Self::Modified(r)
            | Self::ModifiedEndMatch(r)
            | Self::Unregistering(r) => r,
        }
    }
}

pub trait ServiceListener: Send + Sync {
    fn service_changed(&self, event: &ServiceEvent);
}

struct RegistryState {
    next_id: i64,
    services: IndexMap<i64, ServiceReference>,
    listeners: ListenerList<dyn ServiceListener>,
}

/// In-memory registry of the services hosted by this framework.
///
/// Listeners are called after the registry lock is released, so they may
/// query the registry.
pub struct ServiceRegistry {
    state: Mutex<RegistryState>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                next_id: 1,
                services: IndexMap::new(),
                listeners: ListenerList::new(),
            }),
        }
    }

    /// Registers a service advertising `specifications`.
    pub fn register(
        &self,
        specifications: &[&str],
        mut properties: Properties,
    ) -> ServiceReference {
        properties.insert(
            OBJECTCLASS.to_string(),
            Value::from(specifications.to_vec()),
        );

        let (reference, listeners) = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            let reference = ServiceReference::new(id, properties);
            state.services.insert(id, reference.clone());
            (reference, state.listeners.snapshot())
        };

        debug!(service_id = reference.id(), "service registered");
        let event = ServiceEvent::Registered(reference.clone());
        for listener in listeners {
            listener.service_changed(&event);
        }
        reference
    }

    /// Replaces the properties of a service. `objectClass` and `service.id`
    /// cannot be changed. Returns `None` for an unknown service.
    pub fn set_properties(&self, id: i64, mut properties: Properties) -> Option<ServiceReference> {
        let (reference, ended, listeners) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let current = state.services.get_mut(&id)?;
            if let Some(specs) = current.property(OBJECTCLASS) {
                properties.insert(OBJECTCLASS.to_string(), specs.clone());
            }
            let had_intent = current.has_export_intent();
            *current = ServiceReference::new(id, properties);
            let ended = had_intent && !current.has_export_intent();
            (current.clone(), ended, state.listeners.snapshot())
        };

        debug!(service_id = id, "service modified");
        let event = if ended {
            ServiceEvent::ModifiedEndMatch(reference.clone())
        } else {
            ServiceEvent::Modified(reference.clone())
        };
        for listener in listeners {
            listener.service_changed(&event);
        }
        Some(reference)
    }

    /// Returns false for an unknown service.
    pub fn unregister(&self, id: i64) -> bool {
        let (reference, listeners) = {
            let mut state = self.state.lock();
            match state.services.shift_remove(&id) {
                Some(reference) => (reference, state.listeners.snapshot()),
                None => return false,
            }
        };

        debug!(service_id = id, "service unregistering");
        let event = ServiceEvent::Unregistering(reference);
        for listener in listeners {
            listener.service_changed(&event);
        }
        true
    }

    pub fn get(&self, id: i64) -> Option<ServiceReference> {
        self.state.lock().services.get(&id).cloned()
    }

    pub fn references(&self) -> Vec<ServiceReference> {
        self.state.lock().services.values().cloned().collect()
    }

    /// Services asking to be exported, in registration order.
    pub fn exported_references(&self) -> Vec<ServiceReference> {
        self.state
            .lock()
            .services
            .values()
            .filter(|r| r.has_export_intent())
            .cloned()
            .collect()
    }

    pub fn add_listener(&self, listener: Arc<dyn ServiceListener>) -> ListenerId {
        self.state.lock().listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.lock().listeners.remove(id)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
