//! JSON representation of an endpoint, exchanged over HTTP in both
//! directions.

use serde::{Deserialize, Serialize};

use crate::export::ExportEndpoint;
use crate::import::ImportEndpoint;
use crate::properties::{to_import_properties, Properties};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub uid: String,
    /// UID of the framework exporting the endpoint.
    pub sender: String,
    pub name: String,
    pub configurations: Vec<String>,
    pub specifications: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl EndpointDescription {
    /// Converts a received description into an import endpoint, applying
    /// the export-to-import property transform.
    pub fn into_import_endpoint(self, server: Option<&str>) -> ImportEndpoint {
        let properties = to_import_properties(&self.sender, self.properties);
        let mut endpoint = ImportEndpoint::new(
            self.uid,
            self.sender,
            self.configurations,
            self.name,
            &self.specifications,
            properties,
        );
        if let Some(server) = server {
            endpoint.set_server(server);
        }
        endpoint
    }
}

impl From<&ExportEndpoint> for EndpointDescription {
    fn from(endpoint: &ExportEndpoint) -> Self {
        Self {
            uid: endpoint.uid().to_string(),
            sender: endpoint.framework_uid().to_string(),
            name: endpoint.name().to_string(),
            configurations: endpoint.configurations().to_vec(),
            specifications: endpoint.specifications().to_vec(),
            properties: endpoint.properties(),
        }
    }
}
