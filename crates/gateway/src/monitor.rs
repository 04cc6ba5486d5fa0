//! Health alerts to the on-duty agent.
//!
//! Watched targets are the messaging clients, fed by connection events and
//! re-checked every tick, plus an optional HTTP health endpoint. A target
//! must stay down for the grace period before the first alert, and a
//! recovery notice follows once it is back. Alerts that cannot go out yet
//! (the bot client itself is offline) wait for the next chance.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use {
    chrono::{DateTime, Local, Utc},
    relaydesk_channels::{ConnectionRegistry, MessagingEvent},
    relaydesk_config::RelaydeskConfig,
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{auth::millis, notify::AgentNotifier};

/// Target name of the HTTP health check.
pub const WEB_TARGET: &str = "web";

/// Undelivered alerts kept for a later attempt; older ones are dropped.
const MAX_PENDING: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Up,
    Slow,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Down,
    Slow,
    Recovery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub target: String,
    pub at: DateTime<Utc>,
    pub down_since: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
}

impl Alert {
    pub fn text(&self) -> String {
        let when = self.at.with_timezone(&Local).format("%d %b %Y %H:%M");
        let since = self
            .down_since
            .map(|s| s.with_timezone(&Local).format("%H:%M").to_string());
        let subject = if self.target == WEB_TARGET {
            "Sistem Valpro Intertech".to_string()
        } else {
            format!("Koneksi WhatsApp ({})", self.target)
        };
        match self.kind {
            AlertKind::Down => format!(
                "🚨 *SISTEM DOWN*\n\n🕐 {when}\n⏱️ Down sejak: {}\n\n{subject} tidak dapat diakses. Tim teknis sedang menangani.",
                since.unwrap_or_else(|| "-".into())
            ),
            AlertKind::Slow => format!(
                "⚠️ *SISTEM LAMBAT*\n\n🕐 {when}\n⏱️ Latency: {}ms\n\nRespon {subject} lebih lambat dari normal.",
                self.latency_ms.unwrap_or_default()
            ),
            AlertKind::Recovery => match since {
                Some(since) => format!(
                    "✅ *SISTEM PULIH*\n\n🕐 {when}\n⏱️ Gangguan sejak: {since}\n\n{subject} kembali online setelah mengalami gangguan."
                ),
                None => format!(
                    "✅ *SISTEM PULIH*\n\n🕐 {when}\n\n{subject} kembali online setelah mengalami gangguan."
                ),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub down_grace: chrono::Duration,
    pub slow_checks: u32,
}

/// What the monitor knows about one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub last: Health,
    pub down_since: Option<DateTime<Utc>>,
    pub alert_sent: bool,
    pub slow_count: u32,
}

impl Default for TargetStatus {
    fn default() -> Self {
        Self {
            last: Health::Up,
            down_since: None,
            alert_sent: false,
            slow_count: 0,
        }
    }
}

impl TargetStatus {
    /// Record one observation and return the alert it triggers.
    pub fn observe(
        &mut self,
        target: &str,
        health: Health,
        latency_ms: Option<u64>,
        now: DateTime<Utc>,
        rules: &Thresholds,
    ) -> Option<Alert> {
        let previous = std::mem::replace(&mut self.last, health);
        let alert = |kind, down_since| Alert {
            kind,
            target: target.to_string(),
            at: now,
            down_since,
            latency_ms,
        };
        match health {
            Health::Down => {
                if previous != Health::Down {
                    self.down_since = Some(now);
                    self.alert_sent = false;
                }
                let since = self.down_since.unwrap_or(now);
                if !self.alert_sent && now - since >= rules.down_grace {
                    self.alert_sent = true;
                    return Some(alert(AlertKind::Down, Some(since)));
                }
                None
            },
            Health::Slow => {
                self.slow_count = self.slow_count.saturating_add(1);
                (self.slow_count == rules.slow_checks.max(1)).then(|| alert(AlertKind::Slow, None))
            },
            Health::Up => {
                let since = self.down_since.take();
                let long_outage = since.is_some_and(|s| now - s >= rules.down_grace);
                let recovered = previous == Health::Down && (self.alert_sent || long_outage);
                self.slow_count = 0;
                self.alert_sent = false;
                recovered.then(|| alert(AlertKind::Recovery, since))
            },
        }
    }
}

struct HttpCheck {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
    slow: Duration,
}

impl HttpCheck {
    async fn run(&self) -> (Health, u64) {
        let started = Instant::now();
        let result = self.http.get(&self.url).timeout(self.timeout).send().await;
        let elapsed = started.elapsed();
        let latency = millis(elapsed);
        match result {
            Ok(resp) if resp.status().is_server_error() => {
                warn!(url = %self.url, status = %resp.status(), "health check returned a server error");
                (Health::Down, latency)
            },
            Ok(_) if elapsed > self.slow => (Health::Slow, latency),
            Ok(_) => (Health::Up, latency),
            Err(e) => {
                warn!(url = %self.url, error = %e, "health check failed");
                (Health::Down, latency)
            },
        }
    }
}

pub struct HealthMonitor {
    notifier: Arc<AgentNotifier>,
    registry: Arc<ConnectionRegistry>,
    clients: Vec<String>,
    http: Option<HttpCheck>,
    rules: Thresholds,
    targets: Mutex<HashMap<String, TargetStatus>>,
    pending: Mutex<Vec<Alert>>,
}

impl HealthMonitor {
    pub fn new(
        config: &RelaydeskConfig,
        notifier: Arc<AgentNotifier>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let monitor = &config.monitor;
        let clients = if !monitor.enabled || config.messaging.sidecar_url.is_none() {
            Vec::new()
        } else if monitor.clients.is_empty() {
            vec![config.messaging.bot_client_id.clone()]
        } else {
            monitor.clients.clone()
        };
        let http = monitor
            .health_url
            .as_deref()
            .map(str::trim)
            .filter(|u| monitor.enabled && !u.is_empty())
            .map(|url| HttpCheck {
                http: reqwest::Client::new(),
                url: url.to_string(),
                timeout: monitor.request_timeout(),
                slow: monitor.slow_latency(),
            });
        Self {
            notifier,
            registry,
            clients,
            http,
            rules: Thresholds {
                down_grace: chrono::Duration::from_std(monitor.down_grace())
                    .unwrap_or(chrono::Duration::MAX),
                slow_checks: monitor.slow_checks,
            },
            targets: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Whether there is anything to watch.
    pub fn is_active(&self) -> bool {
        !self.clients.is_empty() || self.http.is_some()
    }

    fn targets(&self) -> MutexGuard<'_, HashMap<String, TargetStatus>> {
        self.targets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pending(&self) -> MutexGuard<'_, Vec<Alert>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> HashMap<String, TargetStatus> {
        self.targets().clone()
    }

    fn observe(&self, target: &str, health: Health, latency_ms: Option<u64>) -> Option<Alert> {
        let mut targets = self.targets();
        let status = targets.entry(target.to_string()).or_default();
        if status.last != health {
            info!(watched = target, from = ?status.last, to = ?health, "health changed");
        }
        status.observe(target, health, latency_ms, Utc::now(), &self.rules)
    }

    /// Feed a messaging connection event for a watched client.
    pub async fn connection_event(&self, client_id: &str, event: &MessagingEvent) {
        if !self.clients.iter().any(|c| c == client_id) {
            return;
        }
        let health = match event {
            MessagingEvent::Connected => Health::Up,
            MessagingEvent::Disconnected { .. }
            | MessagingEvent::LoggedOut
            | MessagingEvent::StreamReplaced => Health::Down,
            MessagingEvent::Message(_)
            | MessagingEvent::LabelEdit { .. }
            | MessagingEvent::LabelAssociation { .. } => return,
        };
        if let Some(alert) = self.observe(client_id, health, None) {
            self.deliver(alert).await;
        }
        if health == Health::Up {
            self.flush_pending().await;
        }
    }

    /// One monitoring pass over every target.
    pub async fn check_once(&self) {
        let mut alerts = Vec::new();
        for client in &self.clients {
            let health = if self.registry.is_ready(client) {
                Health::Up
            } else {
                Health::Down
            };
            alerts.extend(self.observe(client, health, None));
        }
        if let Some(http) = &self.http {
            let (health, latency) = http.run().await;
            debug!(url = %http.url, ?health, latency_ms = latency, "health check");
            alerts.extend(self.observe(WEB_TARGET, health, Some(latency)));
        }
        for alert in alerts {
            self.deliver(alert).await;
        }
        self.flush_pending().await;
    }

    async fn deliver(&self, alert: Alert) {
        if alert.kind == AlertKind::Recovery {
            // The outage is over; its undelivered alerts are stale.
            self.pending().retain(|p| p.target != alert.target);
        }
        if self.notifier.notify(&alert.target, &alert.text()).await {
            info!(watched = %alert.target, kind = ?alert.kind, "health alert sent");
            return;
        }
        debug!(watched = %alert.target, kind = ?alert.kind, "health alert kept for a later attempt");
        let mut pending = self.pending();
        pending.push(alert);
        if pending.len() > MAX_PENDING {
            pending.remove(0);
        }
    }

    async fn flush_pending(&self) {
        if !self.notifier.is_ready() {
            return;
        }
        let pending = std::mem::take(&mut *self.pending());
        for alert in pending {
            self.deliver(alert).await;
        }
    }

    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.check_once().await,
                }
            }
        })
    }
}
