//! Exporter backends turning local services into endpoints.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, warn};

use remote_model::constants::{PROP_ENDPOINT_NAME, PROP_HTTP_ACCESSES};
use remote_model::{ExportEndpoint, Properties};

use crate::error::{ExportError, Result};
use crate::service::ServiceReference;

/// A mechanism able to make a local service reachable remotely.
pub trait ServiceExporter: Send + Sync {
    /// Unique name of the backend.
    fn name(&self) -> &str;

    /// Export configurations handled by this backend.
    fn configurations(&self) -> &[String];

    /// Whether one of the requested configurations is handled.
    fn handles(&self, configurations: &[String]) -> bool {
        configurations
            .iter()
            .any(|config| self.configurations().contains(config))
    }

    /// Creates the endpoint of a service. `Ok(None)` declines the export.
    fn export_service(
        &self,
        reference: &ServiceReference,
        name: &str,
        framework_uid: &str,
    ) -> Result<Option<ExportEndpoint>>;

    /// Renames an endpoint in place, failing with [`ExportError::NameInUse`]
    /// when the new name is taken.
    fn update_export(
        &self,
        endpoint: &mut ExportEndpoint,
        new_name: &str,
        old_properties: &Properties,
    ) -> Result<()>;

    fn unexport_service(&self, endpoint: &ExportEndpoint);
}

/// Exporter keeping a table of endpoint names, each name being unique.
///
/// It does not carry calls itself: it describes where the RPC layer serves
/// the endpoints, through an optional HTTP access URL template.
pub struct NamedEndpointExporter {
    name: String,
    configurations: Vec<String>,
    access_url: Option<String>,
    /// Endpoint name -> endpoint UID.
    endpoints: Mutex<HashMap<String, String>>,
}

impl NamedEndpointExporter {
    pub fn new(name: impl Into<String>, configurations: Vec<String>) -> Self {
        Self {
            name: name.into(),
            configurations,
            access_url: None,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Advertises `http://{server}:<port><path>` on every endpoint; peers
    /// substitute `{server}` with the address they learned the endpoint from.
    pub fn with_http_access(mut self, port: u16, path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        self.access_url = Some(format!("http://{{server}}:{port}{path}"));
        self
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.lock().keys().cloned().collect()
    }
}

impl ServiceExporter for NamedEndpointExporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn configurations(&self) -> &[String] {
        &self.configurations
    }

    fn export_service(
        &self,
        reference: &ServiceReference,
        name: &str,
        framework_uid: &str,
    ) -> Result<Option<ExportEndpoint>> {
        let mut endpoints = self.endpoints.lock();
        if endpoints.contains_key(name) {
            error!(exporter = %self.name, name, "endpoint name already in use");
            return Ok(None);
        }

        let mut extra = Properties::new();
        extra.insert(PROP_ENDPOINT_NAME.to_string(), Value::from(name));
        if let Some(url) = &self.access_url {
            extra.insert(PROP_HTTP_ACCESSES.to_string(), Value::from(url.as_str()));
        }

        let endpoint = ExportEndpoint::new(
            uuid::Uuid::new_v4().to_string(),
            framework_uid,
            self.configurations.clone(),
            name,
            reference.properties().clone(),
            extra,
        )?;

        endpoints.insert(name.to_string(), endpoint.uid().to_string());
        Ok(Some(endpoint))
    }

    fn update_export(
        &self,
        endpoint: &mut ExportEndpoint,
        new_name: &str,
        _old_properties: &Properties,
    ) -> Result<()> {
        if endpoint.name() == new_name {
            return Ok(());
        }

        let mut endpoints = self.endpoints.lock();
        if endpoints.contains_key(new_name) {
            return Err(ExportError::NameInUse {
                name: new_name.to_string(),
            });
        }

        let uid = endpoints
            .remove(endpoint.name())
            .unwrap_or_else(|| endpoint.uid().to_string());
        endpoints.insert(new_name.to_string(), uid);

        endpoint.set_name(new_name);
        endpoint.set_extra_property(PROP_ENDPOINT_NAME, Value::from(new_name));
        Ok(())
    }

    fn unexport_service(&self, endpoint: &ExportEndpoint) {
        let mut endpoints = self.endpoints.lock();
        match endpoints.get(endpoint.name()) {
            Some(uid) if uid == endpoint.uid() => {
                endpoints.remove(endpoint.name());
            }
            _ => warn!(exporter = %self.name, uid = endpoint.uid(), "unknown endpoint"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference(id: i64) -> ServiceReference {
        ServiceReference::new(
            id,
            json!({"objectClass": ["Foo"], "service.exported.interfaces": "*"})
                .as_object()
                .cloned()
                .unwrap(),
        )
    }

    fn exporter() -> NamedEndpointExporter {
        NamedEndpointExporter::new("jsonrpc-exporter", vec!["jsonrpc".into()])
            .with_http_access(8080, "JSON-RPC")
    }

    #[test]
    fn handles_matching_configurations() {
        let exp = exporter();
        assert!(exp.handles(&["xmlrpc".into(), "jsonrpc".into()]));
        assert!(!exp.handles(&["xmlrpc".into()]));
    }

    #[test]
    fn export_adds_name_and_access() {
        let exp = exporter();
        let ep = exp.export_service(&reference(1), "svc", "fw").unwrap().unwrap();

        assert!(!ep.uid().is_empty());
        assert_eq!(ep.name(), "svc");
        assert_eq!(ep.configurations(), ["jsonrpc"]);
        let props = ep.properties();
        assert_eq!(props[PROP_ENDPOINT_NAME], json!("svc"));
        assert_eq!(
            props[PROP_HTTP_ACCESSES],
            json!("http://{server}:8080/JSON-RPC")
        );
    }

    #[test]
    fn duplicate_name_is_declined() {
        let exp = exporter();
        assert!(exp.export_service(&reference(1), "svc", "fw").unwrap().is_some());
        assert!(exp.export_service(&reference(2), "svc", "fw").unwrap().is_none());
    }

    #[test]
    fn service_without_specification_fails() {
        let exp = exporter();
        let bare = ServiceReference::new(3, Properties::new());
        let err = exp.export_service(&bare, "svc", "fw").unwrap_err();
        assert!(matches!(err, ExportError::Model(_)));
        assert!(exp.endpoint_names().is_empty());
    }

    #[test]
    fn rename_rejects_taken_names() {
        let exp = exporter();
        let mut a = exp.export_service(&reference(1), "a", "fw").unwrap().unwrap();
        exp.export_service(&reference(2), "b", "fw").unwrap().unwrap();

        let err = exp.update_export(&mut a, "b", &Properties::new()).unwrap_err();
        assert!(matches!(err, ExportError::NameInUse { .. }));
        assert_eq!(a.name(), "a");

        exp.update_export(&mut a, "c", &Properties::new()).unwrap();
        assert_eq!(a.name(), "c");
        assert_eq!(a.properties()[PROP_ENDPOINT_NAME], json!("c"));

        let mut names = exp.endpoint_names();
        names.sort();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn same_name_update_is_noop() {
        let exp = exporter();
        let mut a = exp.export_service(&reference(1), "a", "fw").unwrap().unwrap();
        exp.update_export(&mut a, "a", &Properties::new()).unwrap();
        assert_eq!(a.name(), "a");
    }

    #[test]
    fn unexport_frees_the_name() {
        let exp = exporter();
        let a = exp.export_service(&reference(1), "a", "fw").unwrap().unwrap();
        exp.unexport_service(&a);
        assert!(exp.endpoint_names().is_empty());
        assert!(exp.export_service(&reference(2), "a", "fw").unwrap().is_some());
    }
}
