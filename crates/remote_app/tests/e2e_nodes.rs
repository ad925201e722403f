//! End-to-end test: two fully wired nodes exchanging endpoints through their
//! HTTP servlets on localhost.
//!
//! Multicast is not used: packets a node would receive on the group are fed
//! to its packet handler with a localhost source address.

use std::net::SocketAddr;

use serde_json::json;

use remote_app::{Node, NodeConfig, ServiceConfig};

const GROUP_SOURCE: &str = "127.0.0.1:42000";

fn exported_service(spec: &str, name: &str) -> ServiceConfig {
    ServiceConfig {
        specifications: vec![spec.into()],
        properties: json!({"service.exported.interfaces": "*", "endpoint.name": name})
            .as_object()
            .cloned()
            .unwrap(),
    }
}

fn node(uid: &str, services: Vec<ServiceConfig>) -> Node {
    let config = NodeConfig {
        listen: "127.0.0.1:0".into(),
        framework_uid: Some(uid.into()),
        http_timeout_ms: 2_000,
        services,
        ..NodeConfig::default()
    };
    Node::build(config).unwrap()
}

async fn serve(node: &Node) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = node.router();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });
    port
}

fn packet(sender: &str, event: &str, port: u16, extra: serde_json::Value) -> Vec<u8> {
    let mut value = json!({
        "sender": sender,
        "event": event,
        "access": {"path": "/pelix-dispatcher", "port": port},
    });
    if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        target.extend(extra.clone());
    }
    serde_json::to_vec(&value).unwrap()
}

#[tokio::test]
async fn imported_endpoint_follows_remote_lifecycle() {
    let a = node("fw-a", vec![exported_service("org.Calculator", "calc")]);
    let port_a = serve(&a).await;
    let b = node("fw-b", vec![]);
    let source: SocketAddr = GROUP_SOURCE.parse().unwrap();

    let uid = a.dispatcher.endpoints()[0].uid().to_string();

    // add
    b.discovery
        .handle_packet(source, &packet("fw-a", "add", port_a, json!({"uids": [uid]})))
        .await;
    let imported = b.registry.get(&uid).unwrap();
    assert_eq!(imported.name(), "calc");
    assert_eq!(imported.server(), Some("127.0.0.1"));
    assert_eq!(imported.properties()["pelix.remote.framework.uid"], json!("fw-a"));

    // update: the last one wins
    for version in [1, 2] {
        let extra = json!({"uid": uid, "new_properties": {"version": version}});
        b.discovery
            .handle_packet(source, &packet("fw-a", "update", port_a, extra))
            .await;
    }
    assert_eq!(b.registry.get(&uid).unwrap().properties()["version"], json!(2));

    // remove
    b.discovery
        .handle_packet(source, &packet("fw-a", "remove", port_a, json!({"uid": uid})))
        .await;
    assert!(b.registry.is_empty());
}

#[tokio::test]
async fn discovery_request_pushes_local_endpoints() {
    let a = node("fw-a", vec![]);
    let port_a = serve(&a).await;
    let b = node(
        "fw-b",
        vec![
            exported_service("org.Echo", "echo"),
            exported_service("org.Clock", "clock"),
        ],
    );

    b.discovery
        .handle_packet(
            GROUP_SOURCE.parse().unwrap(),
            &packet("fw-a", "discovery", port_a, json!({})),
        )
        .await;

    let imported = a.registry.endpoints();
    assert_eq!(imported.len(), 2);
    assert!(imported.iter().all(|e| e.framework_uid() == "fw-b"));
    assert_eq!(a.registry.frameworks(), vec!["fw-b"]);
}

#[tokio::test]
async fn own_packets_are_ignored() {
    let a = node("fw-a", vec![exported_service("org.Calculator", "calc")]);
    let port_a = serve(&a).await;
    let uid = a.dispatcher.endpoints()[0].uid().to_string();

    a.discovery
        .handle_packet(
            GROUP_SOURCE.parse().unwrap(),
            &packet("fw-a", "add", port_a, json!({"uids": [uid]})),
        )
        .await;
    assert!(a.registry.is_empty());
    assert!(a.discovery.frameworks().is_empty());
}
