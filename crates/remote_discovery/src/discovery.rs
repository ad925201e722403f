//! Multicast discovery: announces local endpoints on a UDP group and pulls
//! the endpoints announced by other frameworks over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use remote_core::{ExportDispatcher, ExportListener, ImportsRegistry, ListenerId};
use remote_model::{to_import_properties, EndpointDescription, ExportEndpoint, Properties};

use crate::client::PeerClient;
use crate::error::{DiscoveryError, Result};
use crate::frameworks::{FrameworkDirectory, FrameworkEntry};
use crate::multicast;
use crate::packet::{Access, DiscoveryPacket, PacketEvent};

pub const DEFAULT_MULTICAST_GROUP: &str = "239.0.0.1";
pub const DEFAULT_MULTICAST_PORT: u16 = 42000;
pub const DEFAULT_SERVLET_PATH: &str = "/pelix-dispatcher";

const MAX_DATAGRAM: usize = 65_536;
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub multicast_group: String,
    pub multicast_port: u16,
    /// Path of the local endpoint description servlet.
    pub servlet_path: String,
    /// Port peers reach the servlet on.
    pub http_port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_group: DEFAULT_MULTICAST_GROUP.to_string(),
            multicast_port: DEFAULT_MULTICAST_PORT,
            servlet_path: DEFAULT_SERVLET_PATH.to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Stopped,
    Starting,
    Running,
}

struct Running {
    socket: Arc<UdpSocket>,
    group: SocketAddr,
    outbound: mpsc::UnboundedSender<DiscoveryPacket>,
    listener: ListenerId,
    tasks: Vec<JoinHandle<()>>,
}

enum Lifecycle {
    Stopped,
    Starting,
    Running(Running),
}

pub struct MulticastDiscovery {
    config: DiscoveryConfig,
    access: Access,
    dispatcher: Arc<ExportDispatcher>,
    registry: Arc<ImportsRegistry>,
    client: Arc<dyn PeerClient>,
    frameworks: Mutex<FrameworkDirectory>,
    lifecycle: Mutex<Lifecycle>,
}

impl MulticastDiscovery {
    pub fn new(
        config: DiscoveryConfig,
        dispatcher: Arc<ExportDispatcher>,
        registry: Arc<ImportsRegistry>,
        client: Arc<dyn PeerClient>,
    ) -> Self {
        let access = Access {
            path: config.servlet_path.clone(),
            port: config.http_port,
        };
        Self {
            config,
            access,
            dispatcher,
            registry,
            client,
            frameworks: Mutex::new(FrameworkDirectory::new()),
            lifecycle: Mutex::new(Lifecycle::Stopped),
        }
    }

    pub fn framework_uid(&self) -> &str {
        self.dispatcher.framework_uid()
    }

    pub fn state(&self) -> DiscoveryState {
        match &*self.lifecycle.lock() {
            Lifecycle::Stopped => DiscoveryState::Stopped,
            Lifecycle::Starting => DiscoveryState::Starting,
            Lifecycle::Running(_) => DiscoveryState::Running,
        }
    }

    /// Joins the multicast group, starts the receive and send tasks,
    /// announces local endpoints and asks peers for theirs.
    ///
    /// On failure the component stays stopped.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if !matches!(*lifecycle, Lifecycle::Stopped) {
                return Err(DiscoveryError::AlreadyRunning);
            }
            *lifecycle = Lifecycle::Starting;
        }

        let opened = match multicast::resolve_group(
            &self.config.multicast_group,
            self.config.multicast_port,
        )
        .await
        {
            Ok(group) => multicast::open_socket(group).map(|socket| (socket, group)),
            Err(e) => Err(e),
        };
        let (socket, group) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                *self.lifecycle.lock() = Lifecycle::Stopped;
                return Err(e);
            }
        };

        let socket = Arc::new(socket);
        let (tx, rx) = mpsc::unbounded_channel();
        let tasks = vec![
            tokio::spawn(receive_loop(Arc::clone(self), Arc::clone(&socket))),
            tokio::spawn(send_loop(Arc::clone(&socket), group, rx)),
        ];

        let listener = self.dispatcher.add_listener(Arc::new(AnnouncementListener {
            framework_uid: self.framework_uid().to_string(),
            access: self.access.clone(),
            outbound: tx.clone(),
        }));
        self.install(Running {
            socket,
            group,
            outbound: tx,
            listener,
            tasks,
        })?;

        info!(
            %group,
            framework = self.framework_uid(),
            "multicast discovery running"
        );
        self.broadcast_discovery();
        Ok(())
    }

    /// Moves from starting to running. A `stop()` that raced the start
    /// wins: the new tasks and listener are released.
    fn install(&self, running: Running) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(*lifecycle, Lifecycle::Starting) {
                *lifecycle = Lifecycle::Running(running);
                return Ok(());
            }
        }
        warn!(framework = self.framework_uid(), "stopped while starting");
        self.release(running);
        Err(DiscoveryError::Cancelled)
    }

    /// Leaves the group and stops announcing. Returns false if not running.
    pub fn stop(&self) -> bool {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        let Lifecycle::Running(running) = previous else {
            return false;
        };

        self.release(running);
        info!(framework = self.framework_uid(), "multicast discovery stopped");
        true
    }

    fn release(&self, running: Running) {
        self.dispatcher.remove_listener(running.listener);
        for task in &running.tasks {
            task.abort();
        }
        multicast::leave_group(&running.socket, running.group);
    }

    /// Asks every framework on the group to send its endpoints.
    pub fn broadcast_discovery(&self) {
        self.enqueue(DiscoveryPacket::new(
            self.framework_uid(),
            PacketEvent::Discovery,
            &self.access,
        ));
    }

    fn enqueue(&self, packet: DiscoveryPacket) {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(running) => {
                if running.outbound.send(packet).is_err() {
                    warn!("announcement queue closed");
                }
            }
            _ => debug!(event = packet.event.as_str(), "not running, packet dropped"),
        }
    }

    /// Frameworks heard on the group.
    pub fn frameworks(&self) -> Vec<FrameworkEntry> {
        self.frameworks.lock().all().into_iter().cloned().collect()
    }

    /// Advances framework liveness and drops the imports of frameworks not
    /// heard from in two `timeout` periods. Returns the lost frameworks.
    pub fn check_frameworks(&self, timeout: Duration) -> Vec<String> {
        let lost = self.frameworks.lock().tick(timeout);
        for framework in &lost {
            let removed = self.registry.lost_framework(framework);
            warn!(framework = %framework, removed, "framework timed out");
        }
        lost
    }

    /// Handles one datagram received from `source`.
    pub async fn handle_packet(&self, source: SocketAddr, data: &[u8]) {
        let packet = match DiscoveryPacket::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(%source, error = %e, "dropping malformed packet");
                return;
            }
        };

        if packet.sender == self.framework_uid() {
            debug!("ignoring own packet");
            return;
        }

        let host = source.ip().to_string();
        if self
            .frameworks
            .lock()
            .upsert(&packet.sender, &host, &packet.access)
        {
            info!(framework = %packet.sender, %host, "new framework");
        }

        match packet.event {
            PacketEvent::Discovery => self.answer_discovery(&host, &packet.access).await,
            PacketEvent::Add => {
                let uids = packet
                    .uids
                    .into_iter()
                    .flatten()
                    .chain(packet.uid)
                    .collect::<Vec<_>>();
                for uid in uids {
                    self.import_endpoint(&packet.sender, &host, &packet.access, &uid)
                        .await;
                }
            }
            PacketEvent::Remove => match packet.uid {
                Some(uid) => {
                    self.registry.remove(&uid);
                }
                None => warn!(framework = %packet.sender, "remove packet without uid"),
            },
            PacketEvent::Update => match (packet.uid, packet.new_properties) {
                (Some(uid), Some(properties)) => {
                    let properties = to_import_properties(&packet.sender, properties);
                    if !self.registry.update(&uid, properties) {
                        debug!(uid = %uid, "update for unknown endpoint");
                    }
                }
                _ => warn!(framework = %packet.sender, "incomplete update packet"),
            },
            PacketEvent::Discovered | PacketEvent::Other(_) => {
                debug!(event = packet.event.as_str(), "ignoring packet");
            }
        }
    }

    async fn answer_discovery(&self, host: &str, access: &Access) {
        let descriptions: Vec<EndpointDescription> = self
            .dispatcher
            .endpoints()
            .iter()
            .map(EndpointDescription::from)
            .collect();
        if descriptions.is_empty() {
            return;
        }

        if let Err(e) = self
            .client
            .send_discovered(host, access.port, &access.path, &descriptions)
            .await
        {
            warn!(%host, error = %e, "failed to answer discovery");
        }
    }

    async fn import_endpoint(&self, sender: &str, host: &str, access: &Access, uid: &str) {
        match self
            .client
            .fetch_endpoint(host, access.port, &access.path, uid)
            .await
        {
            Ok(Some(description)) if description.uid != uid || description.sender != sender => {
                warn!(
                    %host,
                    uid,
                    framework = sender,
                    got_uid = %description.uid,
                    got_framework = %description.sender,
                    "fetched description does not match the announcement"
                );
            }
            Ok(Some(description)) => {
                self.registry.add(description.into_import_endpoint(Some(host)));
            }
            Ok(None) => warn!(%host, uid, "announced endpoint not found"),
            Err(e) => warn!(%host, uid, error = %e, "failed to fetch endpoint"),
        }
    }
}

async fn receive_loop(discovery: Arc<MulticastDiscovery>, socket: Arc<UdpSocket>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, source)) => discovery.handle_packet(source, &buf[..len]).await,
            Err(e) => {
                warn!(error = %e, "multicast receive failed");
                tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
            }
        }
    }
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    group: SocketAddr,
    mut outbound: mpsc::UnboundedReceiver<DiscoveryPacket>,
) {
    while let Some(packet) = outbound.recv().await {
        let data = match packet.encode() {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "failed to encode packet");
                continue;
            }
        };
        if let Err(e) = socket.send_to(&data, group).await {
            warn!(event = packet.event.as_str(), error = %e, "multicast send failed");
        }
    }
}

/// Turns dispatcher notifications into queued multicast packets.
struct AnnouncementListener {
    framework_uid: String,
    access: Access,
    outbound: mpsc::UnboundedSender<DiscoveryPacket>,
}

impl AnnouncementListener {
    fn packet(&self, event: PacketEvent) -> DiscoveryPacket {
        DiscoveryPacket::new(&self.framework_uid, event, &self.access)
    }

    fn send(&self, packet: DiscoveryPacket) {
        if self.outbound.send(packet).is_err() {
            debug!("announcement queue closed");
        }
    }
}

impl ExportListener for AnnouncementListener {
    fn endpoints_added(&self, endpoints: &[ExportEndpoint]) {
        let uids = endpoints.iter().map(|e| e.uid().to_string()).collect();
        self.send(self.packet(PacketEvent::Add).with_uids(uids));
    }

    fn endpoint_updated(&self, endpoint: &ExportEndpoint, _old_properties: &Properties) {
        let properties = to_import_properties(&self.framework_uid, endpoint.properties());
        self.send(
            self.packet(PacketEvent::Update)
                .with_uid(endpoint.uid())
                .with_properties(properties),
        );
    }

    fn endpoint_removed(&self, endpoint: &ExportEndpoint) {
        self.send(self.packet(PacketEvent::Remove).with_uid(endpoint.uid()));
    }
}
