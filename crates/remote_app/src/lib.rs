//! Node wiring: configuration, component assembly, maintenance loops.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use remote_api::{build_router, ServletState};
use remote_core::{
    ExportDispatcher, ImportListener, ImportsRegistry, NamedEndpointExporter, ServiceRegistry,
};
use remote_discovery::discovery::{
    DEFAULT_MULTICAST_GROUP, DEFAULT_MULTICAST_PORT, DEFAULT_SERVLET_PATH,
};
use remote_discovery::{DiscoveryConfig, HttpPeerClient, MulticastDiscovery, PeerClient};
use remote_model::{ImportEndpoint, Properties};

pub const DEFAULT_CONFIG_FILE: &str = "remote.toml";

/// An exporter backend declared in the configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    pub name: String,
    pub configurations: Vec<String>,
    /// Path the RPC layer serves calls on, advertised to peers.
    #[serde(default)]
    pub http_path: Option<String>,
}

/// A local service registered at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub specifications: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Port advertised to peers; the listen port when absent.
    #[serde(default)]
    pub http_port: Option<u16>,
    #[serde(default = "default_multicast_group")]
    pub multicast_group: String,
    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,
    #[serde(default = "default_servlet_path")]
    pub servlet_path: String,
    #[serde(default)]
    pub framework_uid: Option<String>,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
    #[serde(default)]
    pub framework_timeout_secs: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_exporters")]
    pub exporters: Vec<ExporterConfig>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_multicast_group() -> String {
    DEFAULT_MULTICAST_GROUP.into()
}
fn default_multicast_port() -> u16 {
    DEFAULT_MULTICAST_PORT
}
fn default_servlet_path() -> String {
    DEFAULT_SERVLET_PATH.into()
}
fn default_discovery_interval() -> u64 {
    60
}
fn default_http_timeout() -> u64 {
    5000
}
fn default_exporters() -> Vec<ExporterConfig> {
    vec![ExporterConfig {
        name: "jsonrpc-exporter".into(),
        configurations: vec!["jsonrpc".into()],
        http_path: Some("/JSON-RPC".into()),
    }]
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            http_port: None,
            multicast_group: default_multicast_group(),
            multicast_port: default_multicast_port(),
            servlet_path: default_servlet_path(),
            framework_uid: None,
            discovery_interval_secs: default_discovery_interval(),
            framework_timeout_secs: 0,
            http_timeout_ms: default_http_timeout(),
            exporters: default_exporters(),
            services: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.listen))
    }

    pub fn advertised_port(&self) -> Result<u16> {
        match self.http_port {
            Some(port) => Ok(port),
            None => Ok(self.listen_addr()?.port()),
        }
    }

    pub fn discovery_config(&self) -> Result<DiscoveryConfig> {
        Ok(DiscoveryConfig {
            multicast_group: self.multicast_group.clone(),
            multicast_port: self.multicast_port,
            servlet_path: self.servlet_path.clone(),
            http_port: self.advertised_port()?,
        })
    }
}

/// Reads the configuration file, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> Result<NodeConfig> {
    if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let config: NodeConfig =
            toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
        Ok(config)
    } else {
        Ok(NodeConfig::default())
    }
}

/// Reports imported endpoints in the log.
pub struct LoggingImportListener;

impl ImportListener for LoggingImportListener {
    fn endpoint_added(&self, endpoint: &ImportEndpoint) {
        info!(
            uid = endpoint.uid(),
            name = endpoint.name(),
            framework = endpoint.framework_uid(),
            server = endpoint.server().unwrap_or("-"),
            specifications = ?endpoint.specifications(),
            "remote service available"
        );
    }

    fn endpoint_updated(&self, endpoint: &ImportEndpoint, _old_properties: &Properties) {
        info!(uid = endpoint.uid(), name = endpoint.name(), "remote service updated");
    }

    fn endpoint_removed(&self, endpoint: &ImportEndpoint) {
        info!(uid = endpoint.uid(), name = endpoint.name(), "remote service gone");
    }
}

/// Every component of one framework, wired together.
pub struct Node {
    pub config: NodeConfig,
    pub services: Arc<ServiceRegistry>,
    pub dispatcher: Arc<ExportDispatcher>,
    pub registry: Arc<ImportsRegistry>,
    pub discovery: Arc<MulticastDiscovery>,
}

impl Node {
    pub fn build(config: NodeConfig) -> Result<Self> {
        let client = HttpPeerClient::new(config.http_timeout_ms)?;
        Self::with_client(config, Arc::new(client))
    }

    pub fn with_client(config: NodeConfig, client: Arc<dyn PeerClient>) -> Result<Self> {
        let framework_uid = config
            .framework_uid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let advertised_port = config.advertised_port()?;

        let services = Arc::new(ServiceRegistry::new());
        let dispatcher = Arc::new(ExportDispatcher::new(framework_uid.clone()));
        let registry = Arc::new(ImportsRegistry::new(framework_uid.clone()));

        for exporter in &config.exporters {
            let mut backend =
                NamedEndpointExporter::new(exporter.name.clone(), exporter.configurations.clone());
            if let Some(path) = &exporter.http_path {
                backend = backend.with_http_access(advertised_port, path);
            }
            dispatcher.add_exporter(Arc::new(backend));
        }
        services.add_listener(dispatcher.clone());

        for service in &config.services {
            let specs: Vec<&str> = service.specifications.iter().map(String::as_str).collect();
            let reference = services.register(&specs, service.properties.clone());
            info!(service_id = reference.id(), specifications = ?specs, "service registered");
        }

        let discovery = Arc::new(MulticastDiscovery::new(
            config.discovery_config()?,
            dispatcher.clone(),
            registry.clone(),
            client,
        ));

        info!(framework = %framework_uid, "node assembled");
        Ok(Self {
            config,
            services,
            dispatcher,
            registry,
            discovery,
        })
    }

    pub fn framework_uid(&self) -> &str {
        self.dispatcher.framework_uid()
    }

    /// Router of the endpoint description servlet.
    pub fn router(&self) -> Router {
        build_router(Arc::new(ServletState {
            dispatcher: self.dispatcher.clone(),
            registry: self.registry.clone(),
            servlet_path: self.config.servlet_path.clone(),
        }))
    }

    /// Starts periodic re-discovery and framework liveness checks, each
    /// disabled by a zero interval.
    pub fn spawn_maintenance(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if self.config.discovery_interval_secs > 0 {
            let discovery = self.discovery.clone();
            let interval = Duration::from_secs(self.config.discovery_interval_secs);
            tasks.push(tokio::spawn(async move {
                rediscovery_loop(discovery, interval).await;
            }));
        }

        if self.config.framework_timeout_secs > 0 {
            let discovery = self.discovery.clone();
            let timeout = Duration::from_secs(self.config.framework_timeout_secs);
            tasks.push(tokio::spawn(async move {
                liveness_loop(discovery, timeout).await;
            }));
        }

        tasks
    }
}

async fn rediscovery_loop(discovery: Arc<MulticastDiscovery>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        discovery.broadcast_discovery();
    }
}

async fn liveness_loop(discovery: Arc<MulticastDiscovery>, timeout: Duration) {
    let mut ticker = tokio::time::interval(timeout);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let lost = discovery.check_frameworks(timeout);
        if !lost.is_empty() {
            warn!(lost = lost.len(), "frameworks lost");
        }
    }
}
