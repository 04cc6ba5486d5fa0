//! Realtime fan-out to visitor widgets and admin consoles.
//!
//! One task owns the subscriber tables and applies commands in arrival
//! order, so every subscriber sees events in publish order. Each connection
//! has a bounded buffer; a full buffer drops the event for that connection
//! only.

use std::collections::HashMap;

use {
    serde::Serialize,
    serde_json::Value,
    tokio::sync::{mpsc, oneshot},
    tracing::{debug, info, warn},
};

pub mod event {
    pub const CHAT_MESSAGE: &str = "chat-message";
    pub const STATUS_CHANGE: &str = "status-change";
    pub const ADMIN_JOINED: &str = "admin-joined";
    pub const QUEUE_UPDATE: &str = "queue-update";
    pub const TYPING: &str = "typing";
    pub const PAGE_CHANGE: &str = "page-change";
    pub const SESSION_CLOSED: &str = "session-closed";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Audience {
    /// Visitor widgets of one session (several tabs allowed).
    Session(String),
    /// Every admin console.
    Admins,
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    data: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub visitors: usize,
    pub sessions: usize,
    pub admins: usize,
}

enum Command {
    Register {
        conn_id: String,
        audience: Audience,
        sender: mpsc::Sender<String>,
    },
    Unregister {
        conn_id: String,
    },
    Publish {
        audience: Audience,
        frame: String,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// A registered connection's inbound side.
pub struct Subscription {
    pub conn_id: String,
    pub receiver: mpsc::Receiver<String>,
}

/// Cheap, cloneable handle to the hub task.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
    send_buffer: usize,
}

impl Hub {
    /// Start the hub task. Must be called inside a tokio runtime.
    pub fn spawn(send_buffer: usize) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self {
            commands,
            send_buffer: send_buffer.max(1),
        }
    }

    pub fn register(&self, audience: Audience) -> Subscription {
        let conn_id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::channel(self.send_buffer);
        self.command(Command::Register {
            conn_id: conn_id.clone(),
            audience,
            sender,
        });
        Subscription { conn_id, receiver }
    }

    pub fn unregister(&self, conn_id: &str) {
        self.command(Command::Unregister {
            conn_id: conn_id.to_string(),
        });
    }

    pub fn publish(&self, audience: Audience, event: &str, data: Value) {
        let frame = match serde_json::to_string(&Envelope { event, data }) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event, error = %e, "failed to serialize hub event");
                return;
            },
        };
        self.command(Command::Publish { audience, frame });
    }

    pub fn to_session(&self, session_id: &str, event: &str, data: Value) {
        self.publish(Audience::Session(session_id.to_string()), event, data);
    }

    pub fn to_admins(&self, event: &str, data: Value) {
        self.publish(Audience::Admins, event, data);
    }

    /// Connection counts. Also a barrier: every earlier command has been
    /// applied when this returns.
    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Stats { reply });
        rx.await.unwrap_or_default()
    }

    fn command(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            warn!("hub task stopped; dropping command");
        }
    }
}

#[derive(Default)]
struct Tables {
    sessions: HashMap<String, HashMap<String, mpsc::Sender<String>>>,
    admins: HashMap<String, mpsc::Sender<String>>,
    audience_of: HashMap<String, Audience>,
}

impl Tables {
    fn register(&mut self, conn_id: String, audience: Audience, sender: mpsc::Sender<String>) {
        match &audience {
            Audience::Session(id) => {
                self.sessions
                    .entry(id.clone())
                    .or_default()
                    .insert(conn_id.clone(), sender);
                info!(session_id = %id, conn_id = %conn_id, "visitor connected to hub");
            },
            Audience::Admins => {
                self.admins.insert(conn_id.clone(), sender);
                info!(conn_id = %conn_id, admins = self.admins.len(), "admin connected to hub");
            },
        }
        self.audience_of.insert(conn_id, audience);
    }

    fn unregister(&mut self, conn_id: &str) {
        match self.audience_of.remove(conn_id) {
            Some(Audience::Session(id)) => {
                if let Some(conns) = self.sessions.get_mut(&id) {
                    conns.remove(conn_id);
                    if conns.is_empty() {
                        self.sessions.remove(&id);
                    }
                }
                debug!(session_id = %id, conn_id, "visitor left hub");
            },
            Some(Audience::Admins) => {
                self.admins.remove(conn_id);
                debug!(conn_id, "admin left hub");
            },
            None => {},
        }
    }

    fn publish(&mut self, audience: &Audience, frame: &str) {
        let targets = match audience {
            Audience::Session(id) => self.sessions.get(id),
            Audience::Admins => Some(&self.admins),
        };
        let Some(targets) = targets else { return };

        let mut closed = Vec::new();
        for (conn_id, sender) in targets {
            match sender.try_send(frame.to_string()) {
                Ok(()) => {},
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(conn_id = %conn_id, "subscriber buffer full, event dropped");
                },
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(conn_id.clone()),
            }
        }
        for conn_id in closed {
            self.unregister(&conn_id);
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            visitors: self.sessions.values().map(HashMap::len).sum(),
            sessions: self.sessions.len(),
            admins: self.admins.len(),
        }
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut tables = Tables::default();
    while let Some(cmd) = commands.recv().await {
        match cmd {
            Command::Register {
                conn_id,
                audience,
                sender,
            } => tables.register(conn_id, audience, sender),
            Command::Unregister { conn_id } => tables.unregister(&conn_id),
            Command::Publish { audience, frame } => tables.publish(&audience, &frame),
            Command::Stats { reply } => {
                let _ = reply.send(tables.stats());
            },
        }
    }
    debug!("hub task finished");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use serde_json::json;

    use super::*;

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn events_reach_only_their_audience_in_order() {
        let hub = Hub::spawn(16);
        let mut visitor = hub.register(Audience::Session("s1".into()));
        let mut other = hub.register(Audience::Session("s2".into()));
        let mut admin = hub.register(Audience::Admins);

        for i in 0..5 {
            hub.to_session("s1", event::CHAT_MESSAGE, json!({ "n": i }));
        }
        hub.to_admins(event::QUEUE_UPDATE, json!({ "type": "new" }));

        let stats = hub.stats().await;
        assert_eq!(stats, HubStats {
            visitors: 2,
            sessions: 2,
            admins: 1,
        });

        for i in 0..5 {
            let frame = parse(&visitor.receiver.recv().await.unwrap());
            assert_eq!(frame["event"], "chat-message");
            assert_eq!(frame["data"]["n"], i);
        }
        assert!(other.receiver.try_recv().is_err());
        let frame = parse(&admin.receiver.recv().await.unwrap());
        assert_eq!(frame["event"], "queue-update");
        assert_eq!(frame["data"]["type"], "new");
    }

    #[tokio::test]
    async fn full_buffer_drops_for_that_subscriber_only() {
        let hub = Hub::spawn(2);
        let mut slow = hub.register(Audience::Admins);
        let mut fast = hub.register(Audience::Admins);

        for i in 0..3 {
            hub.to_admins(event::TYPING, json!({ "n": i }));
            hub.stats().await;
            let frame = parse(&fast.receiver.recv().await.unwrap());
            assert_eq!(frame["data"]["n"], i);
        }

        assert_eq!(parse(&slow.receiver.recv().await.unwrap())["data"]["n"], 0);
        assert_eq!(parse(&slow.receiver.recv().await.unwrap())["data"]["n"], 1);
        assert!(slow.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_tab_of_a_session_receives_events() {
        let hub = Hub::spawn(8);
        let mut tab1 = hub.register(Audience::Session("s1".into()));
        let mut tab2 = hub.register(Audience::Session("s1".into()));
        hub.to_session("s1", event::STATUS_CHANGE, json!({ "status": "closed" }));
        hub.stats().await;
        assert!(tab1.receiver.try_recv().is_ok());
        assert!(tab2.receiver.try_recv().is_ok());

        hub.unregister(&tab1.conn_id);
        assert_eq!(hub.stats().await.visitors, 1);
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned_on_publish() {
        let hub = Hub::spawn(8);
        let gone = hub.register(Audience::Admins);
        drop(gone.receiver);
        hub.to_admins(event::QUEUE_UPDATE, json!({}));
        assert_eq!(hub.stats().await.admins, 0);
    }
}
