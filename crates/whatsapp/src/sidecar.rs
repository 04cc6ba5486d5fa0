//! WebSocket connection to the messaging sidecar.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    futures::{SinkExt, StreamExt},
    relaydesk_channels::{Error, Result},
    tokio::sync::{mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::types::{GatewayMessage, SidecarMessage};

/// Called for every unsolicited sidecar message (events, not responses).
pub type MessageCallback = Arc<dyn Fn(SidecarMessage) + Send + Sync>;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<SidecarMessage>>>>;

/// Handle to a live sidecar connection.
#[derive(Clone)]
pub struct SidecarHandle {
    outgoing: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl SidecarHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send a request and wait for the response carrying the same request id.
    pub async fn request(
        &self,
        operation: &str,
        build: impl FnOnce(String) -> GatewayMessage,
    ) -> Result<SidecarMessage> {
        if !self.is_connected() {
            return Err(Error::unavailable("sidecar not connected"));
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id.clone(), tx);

        let frame = serde_json::to_string(&build(request_id.clone()))?;
        if self.outgoing.send(frame).is_err() {
            self.forget(&request_id);
            return Err(Error::unavailable("sidecar connection closed"));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::unavailable("sidecar connection closed")),
            Err(_) => {
                self.forget(&request_id);
                Err(Error::timeout(operation))
            },
        }
    }

    fn forget(&self, request_id: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(request_id);
    }
}

/// Connect once. The returned receiver fires when the connection drops.
pub async fn connect(
    url: &str,
    callback: MessageCallback,
    request_timeout: Duration,
) -> Result<(SidecarHandle, oneshot::Receiver<()>)> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| Error::external(format!("connect to sidecar at {url}"), e))?;
    let (mut write, mut read) = ws.split();
    info!(url, "connected to messaging sidecar");

    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let connected = Arc::new(AtomicBool::new(true));
    let (disconnect_tx, disconnect_rx) = oneshot::channel();

    let write_connected = Arc::clone(&connected);
    tokio::spawn(async move {
        while let Some(frame) = outgoing_rx.recv().await {
            if let Err(e) = write.send(Message::Text(frame.into())).await {
                warn!(error = %e, "sidecar write failed");
                break;
            }
        }
        write_connected.store(false, Ordering::Release);
        let _ = write.close().await;
    });

    let read_pending = Arc::clone(&pending);
    let read_connected = Arc::clone(&connected);
    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(t)) => t,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "sidecar read failed");
                    break;
                },
            };
            let msg: SidecarMessage = match serde_json::from_str(text.as_str()) {
                Ok(m) => m,
                Err(e) => {
                    debug!(error = %e, "ignoring unparseable sidecar frame");
                    continue;
                },
            };
            let waiter = msg.request_id().and_then(|id| {
                read_pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(id)
            });
            match waiter {
                Some(tx) => {
                    let _ = tx.send(msg);
                },
                None => callback(msg),
            }
        }
        read_connected.store(false, Ordering::Release);
        // Dropping the senders fails every in-flight request.
        read_pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        info!("messaging sidecar connection closed");
        let _ = disconnect_tx.send(());
    });

    Ok((
        SidecarHandle {
            outgoing,
            pending,
            connected,
            request_timeout,
        },
        disconnect_rx,
    ))
}

/// Connect with up to `attempts` tries, waiting a growing delay in between.
pub async fn connect_with_retry(
    url: &str,
    callback: MessageCallback,
    request_timeout: Duration,
    attempts: u32,
) -> Result<(SidecarHandle, oneshot::Receiver<()>)> {
    let attempts = attempts.max(1);
    let mut delay = Duration::from_millis(500);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connect(url, Arc::clone(&callback), request_timeout).await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < attempts => {
                debug!(url, attempt, error = %e, "sidecar not reachable yet, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(10));
            },
            Err(e) => return Err(e),
        }
    }
}
