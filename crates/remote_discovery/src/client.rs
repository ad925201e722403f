//! HTTP exchanges with peer servlets.

use std::collections::HashMap;

use parking_lot::Mutex;
use remote_model::EndpointDescription;

/// Client side of the endpoint description servlet of a peer.
#[async_trait::async_trait]
pub trait PeerClient: Send + Sync {
    /// Fetches `<path>/endpoint/<uid>`. `Ok(None)` when the peer does not
    /// know the UID.
    async fn fetch_endpoint(
        &self,
        host: &str,
        port: u16,
        path: &str,
        uid: &str,
    ) -> anyhow::Result<Option<EndpointDescription>>;

    /// POSTs local endpoint descriptions to `<path>`, answering a discovery.
    async fn send_discovered(
        &self,
        host: &str,
        port: u16,
        path: &str,
        endpoints: &[EndpointDescription],
    ) -> anyhow::Result<()>;
}

/// `http://host:port`, with IPv6 hosts bracketed.
pub fn base_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

/// A fetch made through [`MockPeerClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub uid: String,
}

/// A discovery answer sent through [`MockPeerClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub endpoints: Vec<EndpointDescription>,
}

/// Mock client for tests: serves canned descriptions and records calls.
#[derive(Default)]
pub struct MockPeerClient {
    descriptions: Mutex<HashMap<String, EndpointDescription>>,
    failing: Mutex<bool>,
    fetches: Mutex<Vec<Fetch>>,
    posts: Mutex<Vec<Post>>,
}

impl MockPeerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, description: EndpointDescription) {
        self.descriptions
            .lock()
            .insert(description.uid.clone(), description);
    }

    /// Makes every call fail, as an unreachable peer would.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn take_fetches(&self) -> Vec<Fetch> {
        std::mem::take(&mut *self.fetches.lock())
    }

    pub fn take_posts(&self) -> Vec<Post> {
        std::mem::take(&mut *self.posts.lock())
    }
}

#[async_trait::async_trait]
impl PeerClient for MockPeerClient {
    async fn fetch_endpoint(
        &self,
        host: &str,
        port: u16,
        path: &str,
        uid: &str,
    ) -> anyhow::Result<Option<EndpointDescription>> {
        self.fetches.lock().push(Fetch {
            host: host.to_string(),
            port,
            path: path.to_string(),
            uid: uid.to_string(),
        });
        if *self.failing.lock() {
            anyhow::bail!("connection refused");
        }
        Ok(self.descriptions.lock().get(uid).cloned())
    }

    async fn send_discovered(
        &self,
        host: &str,
        port: u16,
        path: &str,
        endpoints: &[EndpointDescription],
    ) -> anyhow::Result<()> {
        self.posts.lock().push(Post {
            host: host.to_string(),
            port,
            path: path.to_string(),
            endpoints: endpoints.to_vec(),
        });
        if *self.failing.lock() {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}
