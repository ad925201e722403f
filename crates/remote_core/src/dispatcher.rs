//! Export dispatcher: turns local services with export intent into
//! endpoints, through every matching exporter backend.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use remote_model::constants::{EXPORT_ALL, PROP_ENDPOINT_NAME, SERVICE_EXPORTED_CONFIGS};
use remote_model::properties::string_list;
use remote_model::ExportEndpoint;

use crate::error::ExportError;
use crate::exporter::ServiceExporter;
use crate::listener::{ExportListener, ListenerId, ListenerList};
use crate::service::{ServiceEvent, ServiceListener, ServiceReference};

/// A service with export intent and the UIDs of its endpoints.
struct ExportedService {
    reference: ServiceReference,
    uids: Vec<String>,
}

struct DispatcherState {
    exporters: Vec<Arc<dyn ServiceExporter>>,
    listeners: ListenerList<dyn ExportListener>,
    services: IndexMap<i64, ExportedService>,
    endpoints: IndexMap<String, ExportEndpoint>,
    uid_exporter: HashMap<String, Arc<dyn ServiceExporter>>,
}

pub struct ExportDispatcher {
    framework_uid: String,
    state: Mutex<DispatcherState>,
}

/// Endpoint name of a service: its non-empty `endpoint.name` property,
/// else `service_<id>`.
fn endpoint_name(reference: &ServiceReference) -> String {
    reference
        .property(PROP_ENDPOINT_NAME)
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("service_{}", reference.id()))
}

/// Whether the service's configuration filter selects this exporter. No
/// filter, or `"*"`, selects every exporter.
fn selects(reference: &ServiceReference, exporter: &dyn ServiceExporter) -> bool {
    let configs = reference
        .property(SERVICE_EXPORTED_CONFIGS)
        .and_then(string_list)
        .unwrap_or_default();
    configs.is_empty() || configs.iter().any(|c| c == EXPORT_ALL) || exporter.handles(&configs)
}

impl ExportDispatcher {
    pub fn new(framework_uid: impl Into<String>) -> Self {
        Self {
            framework_uid: framework_uid.into(),
            state: Mutex::new(DispatcherState {
                exporters: Vec::new(),
                listeners: ListenerList::new(),
                services: IndexMap::new(),
                endpoints: IndexMap::new(),
                uid_exporter: HashMap::new(),
            }),
        }
    }

    pub fn framework_uid(&self) -> &str {
        &self.framework_uid
    }

    /// Attaches a backend and offers it every known service. Returns false
    /// if a backend with the same name is already attached.
    pub fn add_exporter(&self, exporter: Arc<dyn ServiceExporter>) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.exporters.iter().any(|e| e.name() == exporter.name()) {
            warn!(exporter = exporter.name(), "exporter already attached");
            return false;
        }
        state.exporters.push(exporter.clone());
        info!(exporter = exporter.name(), "exporter attached");

        let ids: Vec<i64> = state.services.keys().copied().collect();
        for id in ids {
            let Some(reference) = state.services.get(&id).map(|s| s.reference.clone()) else {
                continue;
            };
            if !selects(&reference, exporter.as_ref()) {
                continue;
            }
            let name = endpoint_name(&reference);
            let added = export_with(
                state,
                &self.framework_uid,
                &reference,
                &name,
                &[exporter.clone()],
            );
            notify_added(state, &added);
        }
        true
    }

    /// Detaches a backend, unexporting every endpoint it produced.
    pub fn remove_exporter(&self, name: &str) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(pos) = state.exporters.iter().position(|e| e.name() == name) else {
            return false;
        };
        state.exporters.remove(pos);

        let uids: Vec<String> = state
            .uid_exporter
            .iter()
            .filter(|(_, exporter)| exporter.name() == name)
            .map(|(uid, _)| uid.clone())
            .collect();
        for uid in uids {
            drop_endpoint(state, &uid);
        }
        info!(exporter = name, "exporter detached");
        true
    }

    /// Attaches a listener, replaying the current endpoints as one batch.
    pub fn add_listener(&self, listener: Arc<dyn ExportListener>) -> ListenerId {
        let mut state = self.state.lock();
        if !state.endpoints.is_empty() {
            let current: Vec<ExportEndpoint> = state.endpoints.values().cloned().collect();
            listener.endpoints_added(&current);
        }
        state.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.lock().listeners.remove(id)
    }

    /// Exports services that are not known yet, e.g. those registered
    /// before the dispatcher started listening.
    pub fn scan<I>(&self, references: I)
    where
        I: IntoIterator<Item = ServiceReference>,
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        for reference in references {
            if reference.has_export_intent() && !state.services.contains_key(&reference.id()) {
                export_service(state, &self.framework_uid, reference);
            }
        }
    }

    pub fn endpoint(&self, uid: &str) -> Option<ExportEndpoint> {
        self.state.lock().endpoints.get(uid).cloned()
    }

    pub fn endpoints(&self) -> Vec<ExportEndpoint> {
        self.state.lock().endpoints.values().cloned().collect()
    }

    /// Endpoints of one local service.
    pub fn service_endpoints(&self, service_id: i64) -> Vec<ExportEndpoint> {
        let state = self.state.lock();
        state
            .services
            .get(&service_id)
            .map(|service| {
                service
                    .uids
                    .iter()
                    .filter_map(|uid| state.endpoints.get(uid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ServiceListener for ExportDispatcher {
    fn service_changed(&self, event: &ServiceEvent) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let reference = event.reference();
        let known = state.services.contains_key(&reference.id());

        match event {
            ServiceEvent::Registered(_) if reference.has_export_intent() && !known => {
                export_service(state, &self.framework_uid, reference.clone());
            }
            ServiceEvent::Modified(_) if known && reference.has_export_intent() => {
                update_service(state, &self.framework_uid, reference.clone());
            }
            ServiceEvent::Modified(_) if known => unexport_service(state, reference.id()),
            ServiceEvent::Modified(_) if reference.has_export_intent() => {
                export_service(state, &self.framework_uid, reference.clone());
            }
            ServiceEvent::ModifiedEndMatch(_) | ServiceEvent::Unregistering(_) if known => {
                unexport_service(state, reference.id());
            }
            _ => {}
        }
    }
}

fn notify_added(state: &DispatcherState, added: &[ExportEndpoint]) {
    if added.is_empty() {
        return;
    }
    for listener in state.listeners.iter() {
        listener.endpoints_added(added);
    }
}

/// Runs `exporters` on a known service and indexes what they produce.
fn export_with(
    state: &mut DispatcherState,
    framework_uid: &str,
    reference: &ServiceReference,
    name: &str,
    exporters: &[Arc<dyn ServiceExporter>],
) -> Vec<ExportEndpoint> {
    let mut added = Vec::new();
    for exporter in exporters {
        match exporter.export_service(reference, name, framework_uid) {
            Ok(Some(endpoint)) => {
                let uid = endpoint.uid().to_string();
                state.uid_exporter.insert(uid.clone(), exporter.clone());
                state.endpoints.insert(uid.clone(), endpoint.clone());
                if let Some(service) = state.services.get_mut(&reference.id()) {
                    service.uids.push(uid);
                }
                added.push(endpoint);
            }
            Ok(None) => {
                debug!(exporter = exporter.name(), service_id = reference.id(), "export declined")
            }
            Err(err) => error!(
                exporter = exporter.name(),
                service_id = reference.id(),
                error = %err,
                "export failed"
            ),
        }
    }
    added
}

fn export_service(state: &mut DispatcherState, framework_uid: &str, reference: ServiceReference) {
    let id = reference.id();
    let exporters: Vec<Arc<dyn ServiceExporter>> = state
        .exporters
        .iter()
        .filter(|e| selects(&reference, e.as_ref()))
        .cloned()
        .collect();
    if exporters.is_empty() {
        warn!(service_id = id, "no exporter handles this service");
    }

    state.services.insert(
        id,
        ExportedService {
            reference: reference.clone(),
            uids: Vec::new(),
        },
    );
    let name = endpoint_name(&reference);
    let added = export_with(state, framework_uid, &reference, &name, &exporters);
    notify_added(state, &added);
}

/// Renames and refreshes the endpoints of a modified service.
fn update_service(state: &mut DispatcherState, framework_uid: &str, reference: ServiceReference) {
    let id = reference.id();
    let name = endpoint_name(&reference);
    let uids = match state.services.get_mut(&id) {
        Some(service) => {
            service.reference = reference.clone();
            service.uids.clone()
        }
        None => return,
    };

    let mut handled: Vec<String> = Vec::new();
    for uid in uids {
        let Some(exporter) = state.uid_exporter.get(&uid).cloned() else {
            continue;
        };
        handled.push(exporter.name().to_string());

        if !selects(&reference, exporter.as_ref()) {
            debug!(uid = %uid, exporter = exporter.name(), "configuration no longer selected");
            drop_endpoint(state, &uid);
            continue;
        }

        let Some(endpoint) = state.endpoints.get_mut(&uid) else {
            continue;
        };
        let old_properties = endpoint.properties();
        endpoint.set_service_properties(reference.properties().clone());

        match exporter.update_export(endpoint, &name, &old_properties) {
            Ok(()) => {
                for listener in state.listeners.iter() {
                    listener.endpoint_updated(endpoint, &old_properties);
                }
            }
            Err(ExportError::NameInUse { name }) => {
                warn!(uid = %uid, name = %name, "rename rejected, endpoint dropped");
                drop_endpoint(state, &uid);
            }
            Err(err) => {
                error!(uid = %uid, error = %err, "endpoint update failed, endpoint dropped");
                drop_endpoint(state, &uid);
            }
        }
    }

    let fresh: Vec<Arc<dyn ServiceExporter>> = state
        .exporters
        .iter()
        .filter(|e| !handled.iter().any(|name| name == e.name()))
        .filter(|e| selects(&reference, e.as_ref()))
        .cloned()
        .collect();
    if !fresh.is_empty() {
        let added = export_with(state, framework_uid, &reference, &name, &fresh);
        notify_added(state, &added);
    }
}

fn unexport_service(state: &mut DispatcherState, service_id: i64) {
    let Some(service) = state.services.get(&service_id) else {
        return;
    };
    for uid in service.uids.clone() {
        drop_endpoint(state, &uid);
    }
    state.services.shift_remove(&service_id);
}

/// Unexports one endpoint through its backend and fires the removal.
fn drop_endpoint(state: &mut DispatcherState, uid: &str) {
    let Some(endpoint) = state.endpoints.shift_remove(uid) else {
        return;
    };
    if let Some(exporter) = state.uid_exporter.remove(uid) {
        exporter.unexport_service(&endpoint);
    }
    if let Some(service_id) = endpoint.service_id() {
        if let Some(service) = state.services.get_mut(&service_id) {
            service.uids.retain(|u| u != uid);
        }
    }
    for listener in state.listeners.iter() {
        listener.endpoint_removed(&endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::NamedEndpointExporter;
    use crate::service::ServiceRegistry;
    use remote_model::Properties;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Added(Vec<String>),
        Updated(String, String),
        Removed(String),
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Seen>>,
    }

    impl ExportListener for Recorder {
        fn endpoints_added(&self, endpoints: &[ExportEndpoint]) {
            let names = endpoints.iter().map(|e| e.name().to_string()).collect();
            self.seen.lock().push(Seen::Added(names));
        }

        fn endpoint_updated(&self, endpoint: &ExportEndpoint, old: &Properties) {
            let old_name = old[PROP_ENDPOINT_NAME].as_str().unwrap_or_default().to_string();
            self.seen
                .lock()
                .push(Seen::Updated(old_name, endpoint.name().to_string()));
        }

        fn endpoint_removed(&self, endpoint: &ExportEndpoint) {
            self.seen.lock().push(Seen::Removed(endpoint.name().to_string()));
        }
    }

    fn props(value: Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    struct Fixture {
        registry: ServiceRegistry,
        dispatcher: Arc<ExportDispatcher>,
        recorder: Arc<Recorder>,
    }

    fn fixture(exporters: &[(&str, &str)]) -> Fixture {
        let registry = ServiceRegistry::new();
        let dispatcher = Arc::new(ExportDispatcher::new("fw-local"));
        for (name, config) in exporters {
            dispatcher.add_exporter(Arc::new(NamedEndpointExporter::new(
                *name,
                vec![config.to_string()],
            )));
        }
        let recorder = Arc::new(Recorder::default());
        dispatcher.add_listener(recorder.clone());
        registry.add_listener(dispatcher.clone());
        Fixture {
            registry,
            dispatcher,
            recorder,
        }
    }

    #[test]
    fn export_all_gives_one_endpoint_and_one_notification() {
        let f = fixture(&[("jsonrpc", "jsonrpc")]);
        f.registry.register(
            &["Foo", "Bar"],
            props(json!({"service.exported.interfaces": "*"})),
        );

        let endpoints = f.dispatcher.endpoints();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].specifications(), ["java:/Foo", "java:/Bar"]);
        assert_eq!(endpoints[0].framework_uid(), "fw-local");
        assert_eq!(
            *f.recorder.seen.lock(),
            vec![Seen::Added(vec!["service_1".into()])]
        );
    }

    #[test]
    fn one_endpoint_per_matching_exporter() {
        let f = fixture(&[("a", "jsonrpc"), ("b", "xmlrpc"), ("c", "mqtt")]);
        let r = f.registry.register(
            &["Foo"],
            props(json!({
                "service.exported.interfaces": "*",
                "service.exported.configs": ["jsonrpc", "xmlrpc"],
            })),
        );

        let endpoints = f.dispatcher.service_endpoints(r.id());
        assert_eq!(endpoints.len(), 2);
        assert_ne!(endpoints[0].uid(), endpoints[1].uid());
        assert_eq!(f.recorder.seen.lock().len(), 1);
        assert!(f.dispatcher.endpoint(endpoints[0].uid()).is_some());
    }

    #[test]
    fn service_without_intent_is_ignored() {
        let f = fixture(&[("a", "jsonrpc")]);
        f.registry.register(&["Foo"], Properties::new());
        assert!(f.dispatcher.endpoints().is_empty());
        assert!(f.recorder.seen.lock().is_empty());
    }

    #[test]
    fn modified_service_is_renamed_in_place() {
        let f = fixture(&[("a", "jsonrpc")]);
        let r = f.registry.register(
            &["Foo"],
            props(json!({"service.exported.interfaces": "*"})),
        );
        let uid = f.dispatcher.endpoints()[0].uid().to_string();

        f.registry.set_properties(
            r.id(),
            props(json!({"service.exported.interfaces": "*", "endpoint.name": "calc", "k": 1})),
        );

        let endpoint = f.dispatcher.endpoint(&uid).unwrap();
        assert_eq!(endpoint.name(), "calc");
        assert_eq!(endpoint.properties()["k"], json!(1));
        assert_eq!(
            f.recorder.seen.lock().last(),
            Some(&Seen::Updated("service_1".into(), "calc".into()))
        );
    }

    #[test]
    fn rename_conflict_drops_the_endpoint() {
        let f = fixture(&[("a", "jsonrpc")]);
        f.registry.register(
            &["Foo"],
            props(json!({"service.exported.interfaces": "*", "endpoint.name": "taken"})),
        );
        let b = f.registry.register(
            &["Bar"],
            props(json!({"service.exported.interfaces": "*"})),
        );

        f.registry.set_properties(
            b.id(),
            props(json!({"service.exported.interfaces": "*", "endpoint.name": "taken"})),
        );

        assert_eq!(f.dispatcher.endpoints().len(), 1);
        assert!(f.dispatcher.service_endpoints(b.id()).is_empty());
        assert_eq!(
            f.recorder.seen.lock().last(),
            Some(&Seen::Removed("service_2".into()))
        );
    }

    #[test]
    fn empty_endpoint_name_falls_back_to_service_id() {
        let f = fixture(&[("a", "jsonrpc")]);
        for spec in ["Foo", "Bar"] {
            f.registry.register(
                &[spec],
                props(json!({"service.exported.interfaces": "*", "endpoint.name": ""})),
            );
        }

        let names: Vec<String> = f
            .dispatcher
            .endpoints()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, ["service_1", "service_2"]);
    }

    #[test]
    fn losing_intent_unexports() {
        let f = fixture(&[("a", "jsonrpc")]);
        let r = f.registry.register(
            &["Foo"],
            props(json!({"service.exported.interfaces": "*"})),
        );
        f.registry.set_properties(r.id(), props(json!({"color": "red"})));

        assert!(f.dispatcher.endpoints().is_empty());
        assert!(f.dispatcher.service_endpoints(r.id()).is_empty());
        assert_eq!(
            f.recorder.seen.lock().last(),
            Some(&Seen::Removed("service_1".into()))
        );
    }

    #[test]
    fn gaining_intent_exports() {
        let f = fixture(&[("a", "jsonrpc")]);
        let r = f.registry.register(&["Foo"], Properties::new());
        f.registry
            .set_properties(r.id(), props(json!({"service.exported.interfaces": "*"})));
        assert_eq!(f.dispatcher.endpoints().len(), 1);
    }

    #[test]
    fn unregistering_removes_every_endpoint() {
        let f = fixture(&[("a", "jsonrpc"), ("b", "xmlrpc")]);
        let r = f.registry.register(
            &["Foo"],
            props(json!({"service.exported.interfaces": "*"})),
        );
        assert_eq!(f.dispatcher.endpoints().len(), 2);

        f.registry.unregister(r.id());
        assert!(f.dispatcher.endpoints().is_empty());
        let removed = f
            .recorder
            .seen
            .lock()
            .iter()
            .filter(|s| matches!(s, Seen::Removed(_)))
            .count();
        assert_eq!(removed, 2);
    }

    #[test]
    fn late_exporter_is_offered_known_services() {
        let f = fixture(&[]);
        f.registry.register(
            &["Foo"],
            props(json!({
                "service.exported.interfaces": "*",
                "service.exported.configs": "xmlrpc",
            })),
        );
        assert!(f.dispatcher.endpoints().is_empty());

        let json = Arc::new(NamedEndpointExporter::new("a", vec!["jsonrpc".into()]));
        let xml = Arc::new(NamedEndpointExporter::new("b", vec!["xmlrpc".into()]));
        assert!(f.dispatcher.add_exporter(json));
        assert!(f.dispatcher.endpoints().is_empty());
        assert!(f.dispatcher.add_exporter(xml.clone()));
        assert_eq!(f.dispatcher.endpoints().len(), 1);
        assert!(!f.dispatcher.add_exporter(xml));
    }

    #[test]
    fn removing_exporter_unexports_its_endpoints() {
        let f = fixture(&[("a", "jsonrpc"), ("b", "xmlrpc")]);
        f.registry.register(
            &["Foo"],
            props(json!({"service.exported.interfaces": "*"})),
        );

        assert!(f.dispatcher.remove_exporter("a"));
        assert!(!f.dispatcher.remove_exporter("a"));
        assert_eq!(f.dispatcher.endpoints().len(), 1);
        assert_eq!(f.dispatcher.endpoints()[0].configurations(), ["xmlrpc"]);
    }

    #[test]
    fn new_listener_gets_replay() {
        let f = fixture(&[("a", "jsonrpc")]);
        f.registry.register(&["Foo"], props(json!({"service.exported.interfaces": "*"})));
        f.registry.register(&["Bar"], props(json!({"service.exported.interfaces": "*"})));

        let late = Arc::new(Recorder::default());
        let id = f.dispatcher.add_listener(late.clone());
        assert_eq!(
            *late.seen.lock(),
            vec![Seen::Added(vec!["service_1".into(), "service_2".into()])]
        );
        assert!(f.dispatcher.remove_listener(id));
    }

    #[test]
    fn scan_exports_preexisting_services() {
        let registry = ServiceRegistry::new();
        registry.register(&["Foo"], props(json!({"service.exported.interfaces": "*"})));
        registry.register(&["Plain"], Properties::new());

        let dispatcher = ExportDispatcher::new("fw");
        dispatcher.add_exporter(Arc::new(NamedEndpointExporter::new(
            "a",
            vec!["jsonrpc".into()],
        )));
        dispatcher.scan(registry.references());
        dispatcher.scan(registry.references());
        assert_eq!(dispatcher.endpoints().len(), 1);
    }
}
