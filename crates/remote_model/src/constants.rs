//! Well-known service and endpoint property keys.

/// Specifications (interface names) advertised by a service.
pub const OBJECTCLASS: &str = "objectClass";
/// Local identifier of a service, assigned by the service registry.
pub const SERVICE_ID: &str = "service.id";

pub const SERVICE_EXPORTED_CONFIGS: &str = "service.exported.configs";
pub const SERVICE_EXPORTED_INTERFACES: &str = "service.exported.interfaces";
pub const SERVICE_EXPORTED_INTENTS: &str = "service.exported.intents";
pub const SERVICE_EXPORTED_INTENTS_EXTRA: &str = "service.exported.intents.extra";

pub const SERVICE_IMPORTED: &str = "service.imported";
pub const SERVICE_IMPORTED_CONFIGS: &str = "service.imported.configs";

/// Preferred endpoint name; falls back to `service_<id>`.
pub const PROP_ENDPOINT_NAME: &str = "endpoint.name";
/// Specifications excluded from a `"*"` export.
pub const PROP_EXPORT_REJECT: &str = "pelix.remote.export.reject";
/// UID of the framework an imported endpoint originates from.
pub const PROP_FRAMEWORK_UID: &str = "pelix.remote.framework.uid";
/// URL template (`http://{server}:<port><path>`) added by HTTP based exporters.
pub const PROP_HTTP_ACCESSES: &str = "pelix.remote.http.accesses";

/// Export filter value meaning "every advertised specification".
pub const EXPORT_ALL: &str = "*";
