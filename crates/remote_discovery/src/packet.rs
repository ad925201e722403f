//! Multicast discovery packets: UTF-8 JSON datagrams.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use remote_model::Properties;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PacketError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketEvent {
    /// Asks every peer to send its endpoints.
    Discovery,
    /// Reply to a discovery, sent over HTTP rather than multicast.
    Discovered,
    Add,
    Remove,
    Update,
    Other(String),
}

impl PacketEvent {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Discovery => "discovery",
            Self::Discovered => "discovered",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Update => "update",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for PacketEvent {
    fn from(name: String) -> Self {
        match name.as_str() {
            "discovery" => Self::Discovery,
            "discovered" => Self::Discovered,
            "add" => Self::Add,
            "remove" => Self::Remove,
            "update" => Self::Update,
            _ => Self::Other(name),
        }
    }
}

impl Serialize for PacketEvent {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PacketEvent {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// Where the sender serves its endpoint descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub path: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryPacket {
    pub sender: String,
    pub event: PacketEvent,
    pub access: Access,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_properties: Option<Properties>,
}

impl DiscoveryPacket {
    pub fn new(sender: &str, event: PacketEvent, access: &Access) -> Self {
        Self {
            sender: sender.to_string(),
            event,
            access: access.clone(),
            uid: None,
            uids: None,
            new_properties: None,
        }
    }

    pub fn with_uid(mut self, uid: &str) -> Self {
        self.uid = Some(uid.to_string());
        self
    }

    pub fn with_uids(mut self, uids: Vec<String>) -> Self {
        self.uids = Some(uids);
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.new_properties = Some(properties);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn access() -> Access {
        Access {
            path: "/pelix-dispatcher".into(),
            port: 8080,
        }
    }

    #[test]
    fn add_packet_layout() {
        let packet = DiscoveryPacket::new("fw-a", PacketEvent::Add, &access())
            .with_uids(vec!["u1".into(), "u2".into()]);
        let value: serde_json::Value = serde_json::from_slice(&packet.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "sender": "fw-a",
                "event": "add",
                "access": {"path": "/pelix-dispatcher", "port": 8080},
                "uids": ["u1", "u2"],
            })
        );
    }

    #[test]
    fn decodes_update_from_peer() {
        let raw = br#"{"sender":"fw-b","event":"update","uid":"u9",
            "access":{"path":"/p","port":9000},"new_properties":{"k":"v"}}"#;
        let packet = DiscoveryPacket::decode(raw).unwrap();

        assert_eq!(packet.event, PacketEvent::Update);
        assert_eq!(packet.uid.as_deref(), Some("u9"));
        assert_eq!(packet.access.port, 9000);
        assert_eq!(packet.new_properties.unwrap()["k"], json!("v"));
    }

    #[test]
    fn unknown_event_is_kept() {
        let raw = br#"{"sender":"x","event":"ping","access":{"path":"/","port":1}}"#;
        let packet = DiscoveryPacket::decode(raw).unwrap();
        assert_eq!(packet.event, PacketEvent::Other("ping".into()));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(DiscoveryPacket::decode(b"not json").is_err());
        assert!(DiscoveryPacket::decode(br#"{"sender":"x"}"#).is_err());
    }
}
