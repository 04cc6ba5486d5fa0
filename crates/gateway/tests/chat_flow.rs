#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the visitor chat flow and the admin console.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    futures::StreamExt,
    secrecy::Secret,
    serde_json::{Value, json},
    tokio::net::TcpListener,
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
    },
};

use {
    relaydesk_channels::ConnectionRegistry,
    relaydesk_chat::ScriptedEngine,
    relaydesk_config::RelaydeskConfig,
    relaydesk_gateway::{
        server::build_gateway_app,
        session::welcome_message,
        state::{GatewayDeps, GatewayState, OfflineOutbound},
    },
    relaydesk_sessions::{SqliteSessionStore, SqliteSettingsStore},
};

const API_KEY: &str = "test-key";

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Spin up a test gateway on an ephemeral port, return the bound address.
async fn start_test_server(api_key: Option<&str>) -> SocketAddr {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    relaydesk_sessions::run_migrations(&pool).await.unwrap();

    let mut config = RelaydeskConfig::default();
    config.server.api_key = api_key.map(|k| Secret::new(k.to_string()));
    let state = GatewayState::new(&config, GatewayDeps {
        store: Arc::new(SqliteSessionStore::new(pool.clone())),
        settings: Some(Arc::new(SqliteSettingsStore::new(pool))),
        engine: Arc::new(ScriptedEngine::new()),
        outbound: Arc::new(OfflineOutbound),
        registry: Arc::new(ConnectionRegistry::new()),
        resolver: None,
    });
    let app = build_gateway_app(state, &["*".to_string()]);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn post(addr: SocketAddr, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .header("x-api-key", API_KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn get(addr: SocketAddr, path: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .get(format!("http://{addr}{path}"))
        .header("x-api-key", API_KEY)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn start_chat(addr: SocketAddr, visitor_id: &str) -> String {
    let (status, body) = post(
        addr,
        "/chat/start",
        json!({ "visitorId": visitor_id, "visitorName": "Budi" }),
    )
    .await;
    assert_eq!(status, 200);
    body["sessionId"].as_str().unwrap().to_string()
}

/// Wait until the hub has registered `admins` admin connections.
async fn wait_for_admins(addr: SocketAddr, admins: u64) {
    for _ in 0..50 {
        let (_, body) = get(addr, "/status").await;
        if body["hub"]["admins"] == admins {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("admin socket never registered");
}

async fn next_event(ws: &mut Socket, wanted: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            let frame: Value = serde_json::from_str(&text).unwrap();
            if frame["event"] == wanted {
                return frame["data"].clone();
            }
        }
    }
}

#[tokio::test]
async fn start_chat_resumes_open_session() {
    let addr = start_test_server(None).await;
    let first = start_chat(addr, "visitor-1").await;

    let (status, body) = post(addr, "/chat/start", json!({ "visitorId": "visitor-1" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["sessionId"], first.as_str());
    assert_eq!(body["resumed"], true);
    assert_eq!(body["status"], "bot");

    let (status, body) = post(addr, "/chat/start", json!({ "visitorName": "x" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn bot_replies_and_history_is_kept() {
    let addr = start_test_server(None).await;
    let id = start_chat(addr, "visitor-2").await;

    let (status, body) = post(
        addr,
        "/chat/message",
        json!({ "sessionId": id, "content": "halo, berapa harga sewa?" }),
    )
    .await;
    assert_eq!(status, 200);
    assert!(!body["reply"].as_str().unwrap().is_empty());

    let (status, body) = get(addr, &format!("/chat/history/{id}")).await;
    assert_eq!(status, 200);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["sender"], "bot");
    assert_eq!(messages[0]["content"], welcome_message("Budi").as_str());
    assert_eq!(messages[1]["sender"], "visitor");
    assert_eq!(messages[2]["sender"], "bot");

    let (status, _) = get(addr, "/chat/history/unknown").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn handover_is_queued_and_claimed() {
    let addr = start_test_server(Some(API_KEY)).await;
    let id = start_chat(addr, "visitor-3").await;

    let (mut admin, _) = connect_async(format!("ws://{addr}/admin-chat/ws?api_key={API_KEY}"))
        .await
        .expect("ws connect failed");
    wait_for_admins(addr, 1).await;

    let (status, body) = post(addr, "/chat/handover", json!({ "sessionId": id })).await;
    assert_eq!(status, 200);
    assert_eq!(body["adminOnline"], false);
    let update = next_event(&mut admin, "queue-update").await;
    assert_eq!(update["type"], "new");
    assert_eq!(update["session"]["id"], id.as_str());

    let (_, body) = get(addr, "/admin-chat/queue").await;
    assert_eq!(body["count"], 1);

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/admin-chat/claim/{id}"))
        .header("x-api-key", API_KEY)
        .header("x-admin-id", "a1")
        .header("x-admin-name", "Sari")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["summary"].is_string());
    let update = next_event(&mut admin, "queue-update").await;
    assert_eq!(update["type"], "claimed");
    assert_eq!(update["adminId"], "a1");

    let (_, body) = get(addr, "/admin-chat/queue").await;
    assert_eq!(body["count"], 0);

    // Live sessions skip the bot.
    let (status, body) = post(
        addr,
        "/chat/message",
        json!({ "sessionId": id, "content": "masih di sana?" }),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body.get("reply").is_none());
    let message = next_event(&mut admin, "chat-message").await;
    assert_eq!(message["sender"], "visitor");

    admin.close(None).await.ok();
}

#[tokio::test]
async fn admin_routes_require_api_key() {
    let addr = start_test_server(Some(API_KEY)).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/admin-chat/queue"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let resp = client
        .get(format!("http://{addr}/admin-chat/queue"))
        .header("x-api-key", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let (status, _) = get(addr, "/admin-chat/queue").await;
    assert_eq!(status, 200);

    let resp = client
        .get(format!("http://{addr}/chat/history/none"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn settings_and_status() {
    let addr = start_test_server(None).await;

    let (status, body) = post(
        addr,
        "/settings/whatsapp",
        json!({ "agentPhone": " 0812-3456-789 ", "mainNumber": "" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["settings"]["agentPhone"], "0812-3456-789");
    assert!(body["settings"]["mainNumber"].is_null());

    let (_, body) = get(addr, "/settings/whatsapp").await;
    assert_eq!(body["settings"]["agentPhone"], "0812-3456-789");

    let (status, body) = get(addr, "/status").await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["hub"]["admins"], 0);
}
