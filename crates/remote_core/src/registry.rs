//! Registry of the endpoints imported from other frameworks.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use remote_model::{ImportEndpoint, Properties};

use crate::listener::{ImportListener, ListenerId, ListenerList};

struct ImportsState {
    endpoints: IndexMap<String, ImportEndpoint>,
    /// Framework UID -> UIDs of its endpoints.
    frameworks: HashMap<String, Vec<String>>,
    listeners: ListenerList<dyn ImportListener>,
}

pub struct ImportsRegistry {
    framework_uid: String,
    state: Mutex<ImportsState>,
}

impl ImportsRegistry {
    pub fn new(framework_uid: impl Into<String>) -> Self {
        Self {
            framework_uid: framework_uid.into(),
            state: Mutex::new(ImportsState {
                endpoints: IndexMap::new(),
                frameworks: HashMap::new(),
                listeners: ListenerList::new(),
            }),
        }
    }

    pub fn framework_uid(&self) -> &str {
        &self.framework_uid
    }

    /// Stores an endpoint. Endpoints of the local framework and already
    /// known UIDs are refused.
    pub fn add(&self, endpoint: ImportEndpoint) -> bool {
        if endpoint.framework_uid() == self.framework_uid {
            debug!(uid = endpoint.uid(), "ignoring endpoint of the local framework");
            return false;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.endpoints.contains_key(endpoint.uid()) {
            debug!(uid = endpoint.uid(), "endpoint already known");
            return false;
        }

        info!(
            uid = endpoint.uid(),
            name = endpoint.name(),
            framework = endpoint.framework_uid(),
            "endpoint imported"
        );
        state
            .frameworks
            .entry(endpoint.framework_uid().to_string())
            .or_default()
            .push(endpoint.uid().to_string());
        for listener in state.listeners.iter() {
            listener.endpoint_added(&endpoint);
        }
        state.endpoints.insert(endpoint.uid().to_string(), endpoint);
        true
    }

    /// Replaces the properties of a known endpoint. Unknown UIDs are ignored.
    pub fn update(&self, uid: &str, properties: Properties) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(endpoint) = state.endpoints.get_mut(uid) else {
            return false;
        };

        let old = endpoint.set_properties(properties);
        debug!(uid, "imported endpoint updated");
        for listener in state.listeners.iter() {
            listener.endpoint_updated(endpoint, &old);
        }
        true
    }

    pub fn remove(&self, uid: &str) -> bool {
        let mut guard = self.state.lock();
        match remove_endpoint(&mut guard, uid) {
            Some(_) => true,
            None => {
                warn!(uid, "unknown imported endpoint");
                false
            }
        }
    }

    /// Drops every endpoint of a framework that went away. Returns how many
    /// endpoints were removed.
    pub fn lost_framework(&self, framework_uid: &str) -> usize {
        let mut guard = self.state.lock();
        let Some(uids) = guard.frameworks.get(framework_uid).cloned() else {
            return 0;
        };

        let removed = uids
            .iter()
            .filter(|uid| remove_endpoint(&mut guard, uid).is_some())
            .count();
        guard.frameworks.remove(framework_uid);
        info!(framework = framework_uid, removed, "framework lost");
        removed
    }

    pub fn get(&self, uid: &str) -> Option<ImportEndpoint> {
        self.state.lock().endpoints.get(uid).cloned()
    }

    pub fn endpoints(&self) -> Vec<ImportEndpoint> {
        self.state.lock().endpoints.values().cloned().collect()
    }

    /// UIDs of the frameworks with at least one imported endpoint.
    pub fn frameworks(&self) -> Vec<String> {
        self.state.lock().frameworks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attaches a listener and replays every stored endpoint as added.
    pub fn add_listener(&self, listener: Arc<dyn ImportListener>) -> ListenerId {
        let mut state = self.state.lock();
        for endpoint in state.endpoints.values() {
            listener.endpoint_added(endpoint);
        }
        state.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.lock().listeners.remove(id)
    }
}

fn remove_endpoint(state: &mut ImportsState, uid: &str) -> Option<ImportEndpoint> {
    let endpoint = state.endpoints.shift_remove(uid)?;

    let framework = endpoint.framework_uid();
    if let Some(uids) = state.frameworks.get_mut(framework) {
        uids.retain(|u| u != uid);
        if uids.is_empty() {
            state.frameworks.remove(framework);
        }
    }

    debug!(uid, "imported endpoint removed");
    for listener in state.listeners.iter() {
        listener.endpoint_removed(&endpoint);
    }
    Some(endpoint)
}
