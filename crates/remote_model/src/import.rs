//! Endpoints discovered on remote frameworks.

use crate::properties::Properties;
use crate::specs::extract_specifications;

#[derive(Debug, Clone)]
pub struct ImportEndpoint {
    uid: String,
    framework_uid: String,
    name: String,
    configurations: Vec<String>,
    specifications: Vec<String>,
    properties: Properties,
    server: Option<String>,
}

impl ImportEndpoint {
    /// `specifications` are given in their wire form; only the native ones
    /// are kept, as plain names.
    pub fn new<S: AsRef<str>>(
        uid: impl Into<String>,
        framework_uid: impl Into<String>,
        configurations: Vec<String>,
        name: impl Into<String>,
        specifications: &[S],
        properties: Properties,
    ) -> Self {
        Self {
            uid: uid.into(),
            framework_uid: framework_uid.into(),
            name: name.into(),
            configurations,
            specifications: extract_specifications(specifications),
            properties,
            server: None,
        }
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

    pub fn specifications(&self) -> &[String] {
        &self.specifications
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Replaces the properties wholesale, returning the previous ones.
    pub fn set_properties(&mut self, properties: Properties) -> Properties {
        std::mem::replace(&mut self.properties, properties)
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    /// Stores the address the endpoint was learned from. Bare IPv6
    /// addresses are wrapped in brackets so they can be used in URLs.
    pub fn set_server(&mut self, server: &str) {
        let server = if server.contains(':') && !server.starts_with('[') {
            format!("[{server}]")
        } else {
            server.to_string()
        };
        self.server = Some(server);
    }
}

impl PartialEq for ImportEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for ImportEndpoint {}
