#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    relaydesk_channels::{
        ConnectionRegistry, Error, MessagingEvent, MessagingEventSink, MessagingOutbound,
    },
    relaydesk_identity::ContactLookup,
    relaydesk_whatsapp::WhatsAppClient,
    serde_json::{Value, json},
    tokio::{net::TcpListener, sync::mpsc},
    tokio_tungstenite::{accept_async, tungstenite::Message},
    tokio_util::sync::CancellationToken,
};

struct RecordingSink {
    registry: Arc<ConnectionRegistry>,
    tx: mpsc::UnboundedSender<(String, MessagingEvent)>,
}

#[async_trait]
impl MessagingEventSink for RecordingSink {
    async fn handle_event(&self, client_id: &str, event: MessagingEvent) {
        self.registry.apply(client_id, &event);
        let _ = self.tx.send((client_id.to_string(), event));
    }
}

/// Accepts one gateway connection, announces the `bot` client, delivers one
/// inbound message and answers requests.
async fn spawn_mock_sidecar() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let hello = json!({"type": "connected", "account_id": "bot", "phone_number": "62800"});
        ws.send(Message::Text(hello.to_string().into())).await.unwrap();
        let inbound = json!({
            "type": "inbound_message",
            "account_id": "bot",
            "message_id": "m1",
            "chat_jid": "62811@s.whatsapp.net",
            "sender_jid": "62811@s.whatsapp.net",
            "body": "ini struknya",
            "media_type": "image",
            "timestamp": 1_700_000_000
        });
        ws.send(Message::Text(inbound.to_string().into())).await.unwrap();

        while let Some(Ok(frame)) = ws.next().await {
            let Message::Text(text) = frame else { continue };
            let req: Value = serde_json::from_str(text.as_str()).unwrap();
            let request_id = req["request_id"].clone();
            let reply = match req["type"].as_str() {
                Some("send_text") if req["to"] == "unknown@s.whatsapp.net" => json!({
                    "type": "send_result", "request_id": request_id,
                    "success": false, "error": "recipient not on whatsapp"
                }),
                Some("send_text") => json!({
                    "type": "send_result", "request_id": request_id,
                    "success": true, "message_id": "out-1"
                }),
                Some("lookup_contacts") => {
                    let mappings: serde_json::Map<String, Value> = req["ids"]
                        .as_array()
                        .unwrap()
                        .iter()
                        .filter(|id| id.as_str() != Some("999@lid"))
                        .map(|id| (id.as_str().unwrap().to_string(), json!("62811@s.whatsapp.net")))
                        .collect();
                    json!({
                        "type": "lookup_result", "request_id": request_id,
                        "success": true, "mappings": mappings
                    })
                },
                _ => continue,
            };
            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        }
    });
    format!("ws://{addr}")
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<(String, MessagingEvent)>) -> (String, MessagingEvent) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

#[tokio::test]
async fn sidecar_round_trip() {
    let url = spawn_mock_sidecar().await;
    let registry = Arc::new(ConnectionRegistry::new());
    let client = WhatsAppClient::new(&url, Duration::from_secs(2), Arc::clone(&registry), "bot");
    let outbound = client.outbound();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = Arc::new(RecordingSink {
        registry: Arc::clone(&registry),
        tx,
    });
    let cancel = CancellationToken::new();
    let run = tokio::spawn(client.run(sink, cancel.clone()));

    assert_eq!(next_event(&mut rx).await, ("bot".to_string(), MessagingEvent::Connected));
    assert!(outbound.is_ready("bot"));
    assert!(!outbound.is_ready("leads"));

    let (client_id, event) = next_event(&mut rx).await;
    assert_eq!(client_id, "bot");
    let MessagingEvent::Message(msg) = event else {
        panic!("expected message, got {event:?}");
    };
    assert_eq!(msg.body, "[Image] ini struknya");
    assert!(msg.has_media);

    // Handle installation can trail the first events slightly.
    let mut sent = outbound
        .send_text("bot", "62811@s.whatsapp.net", "halo")
        .await;
    for _ in 0..50 {
        if !matches!(sent, Err(Error::Unavailable { .. })) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        sent = outbound
            .send_text("bot", "62811@s.whatsapp.net", "halo")
            .await;
    }
    sent.unwrap();

    let rejected = outbound
        .send_text("bot", "unknown@s.whatsapp.net", "halo")
        .await
        .unwrap_err();
    assert!(rejected.to_string().contains("recipient not on whatsapp"));

    let mappings = outbound
        .lookup(&["123@lid".to_string(), "999@lid".to_string()])
        .await
        .unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings["123@lid"], "62811@s.whatsapp.net");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
}
