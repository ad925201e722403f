//! Endpoint model: export/import endpoints, specification names, property
//! transform and the JSON description shared by every framework.

pub mod constants;
pub mod description;
pub mod error;
pub mod export;
pub mod import;
pub mod properties;
pub mod specs;

pub use description::EndpointDescription;
pub use error::ModelError;
pub use export::ExportEndpoint;
pub use import::ImportEndpoint;
pub use properties::{to_import_properties, Properties};
