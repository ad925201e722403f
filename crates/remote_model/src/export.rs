//! Endpoints describing a local service exported by one backend.

use serde_json::Value;

use crate::constants::*;
use crate::error::{ModelError, Result};
use crate::properties::{string_list, Properties};
use crate::specs::format_specifications;

#[derive(Debug, Clone)]
pub struct ExportEndpoint {
    uid: String,
    framework_uid: String,
    name: String,
    configurations: Vec<String>,
    specifications: Vec<String>,
    service_properties: Properties,
    extra_properties: Properties,
}

impl ExportEndpoint {
    /// Builds the endpoint of a service, given a snapshot of its properties.
    ///
    /// Fails if `uid` is empty or if the export filters leave no
    /// specification to export.
    pub fn new(
        uid: impl Into<String>,
        framework_uid: impl Into<String>,
        configurations: Vec<String>,
        name: impl Into<String>,
        service_properties: Properties,
        extra_properties: Properties,
    ) -> Result<Self> {
        let uid = uid.into();
        if uid.is_empty() {
            return Err(ModelError::EmptyUid);
        }

        let specifications = compute_specifications(&service_properties);
        if specifications.is_empty() {
            return Err(ModelError::NoSpecification { uid });
        }

        Ok(Self {
            uid,
            framework_uid: framework_uid.into(),
            name: name.into(),
            configurations,
            specifications,
            service_properties,
            extra_properties,
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn framework_uid(&self) -> &str {
        &self.framework_uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configurations(&self) -> &[String] {
        &self.configurations
    }

    /// Exported specifications, formatted as `lang:/name`.
    pub fn specifications(&self) -> &[String] {
        &self.specifications
    }

    /// Local identifier of the underlying service, if known.
    pub fn service_id(&self) -> Option<i64> {
        self.service_properties.get(SERVICE_ID).and_then(Value::as_i64)
    }

    /// Service properties merged with the endpoint extras. `objectClass` and
    /// `service.id` always come from the service.
    pub fn properties(&self) -> Properties {
        let mut merged = self.service_properties.clone();
        for (key, value) in &self.extra_properties {
            merged.insert(key.clone(), value.clone());
        }
        for key in [OBJECTCLASS, SERVICE_ID] {
            match self.service_properties.get(key) {
                Some(value) => merged.insert(key.to_string(), value.clone()),
                None => merged.remove(key),
            };
        }
        merged
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Sets an endpoint-specific property, overriding the service one.
    pub fn set_extra_property(&mut self, key: impl Into<String>, value: Value) {
        self.extra_properties.insert(key.into(), value);
    }

    /// Replaces the service snapshot after a property change. The exported
    /// specifications are not recomputed.
    pub fn set_service_properties(&mut self, properties: Properties) {
        self.service_properties = properties;
    }
}

impl PartialEq for ExportEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for ExportEndpoint {}

/// Advertised specifications intersected with the export filter.
fn compute_specifications(properties: &Properties) -> Vec<String> {
    let advertised = properties
        .get(OBJECTCLASS)
        .and_then(string_list)
        .unwrap_or_default();

    let rejected = properties
        .get(PROP_EXPORT_REJECT)
        .and_then(string_list)
        .unwrap_or_default();

    let filter = properties
        .get(SERVICE_EXPORTED_INTERFACES)
        .and_then(string_list)
        .unwrap_or_default();

    let exported: Vec<&String> = if filter.iter().any(|f| f == EXPORT_ALL) {
        advertised
            .iter()
            .filter(|spec| !rejected.contains(spec))
            .collect()
    } else {
        advertised
            .iter()
            .filter(|spec| filter.contains(spec))
            .collect()
    };

    let mut specs = format_specifications(exported);
    let mut seen = std::collections::HashSet::new();
    specs.retain(|spec| seen.insert(spec.clone()));
    specs
}
