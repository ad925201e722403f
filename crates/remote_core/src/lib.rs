//! Core of the remote services layer: the local service registry, the
//! export dispatcher with its exporter backends, and the registry of
//! endpoints imported from other frameworks.

pub mod dispatcher;
pub mod error;
pub mod exporter;
pub mod listener;
pub mod registry;
pub mod service;

pub use dispatcher::ExportDispatcher;
pub use error::ExportError;
pub use exporter::{NamedEndpointExporter, ServiceExporter};
pub use listener::{ExportListener, ImportListener, ListenerId};
pub use registry::ImportsRegistry;
pub use service::{ServiceEvent, ServiceListener, ServiceReference, ServiceRegistry};
