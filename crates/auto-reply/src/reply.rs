use std::sync::Arc;

use {
    async_trait::async_trait,
    relaydesk_channels::{InboundMessage, MessagingOutbound},
    relaydesk_common::{RetryError, RetryPolicy, with_retry},
    relaydesk_config::AutoReplyConfig,
    relaydesk_sessions::extract_session_id,
    tracing::{debug, info, warn},
};

use crate::{
    cooldown::CooldownMap,
    error::{Error, Result},
};

pub const DEFAULT_TEMPLATE: &str = "Halo! 👋 Terima kasih telah menghubungi Valpro Intertech.
Pesan Anda telah diterima secara otomatis oleh sistem kami.

✅ *Konfirmasi Pembayaran*
Apabila Anda melampirkan bukti transfer pembayaran Invoice, mohon pastikan *Nomor Invoice* terlihat atau disebutkan. Tim Finance kami akan segera memverifikasi dan memperbarui status tagihan Anda pada jam kerja.

💬 *Informasi & Bantuan CS*
Jika Anda membutuhkan bantuan Admin, pertanyaan teknis, atau layanan lainnya, silakan hubungi Customer Service kami di saluran berikut:
📞 WhatsApp/Telp: +62 813-9971-0085
📧 Email: mail@valprointertech.com
🌐 Website: valprointertech.com

_Mohon diperhatikan bahwa nomor ini digunakan oleh sistem robot untuk pengiriman notifikasi otomatis tagihan, sehingga balasan manual mungkin memerlukan waktu lebih lama._

Terima kasih atas kepercayaan Anda kepada Valpro Intertech! ✨";

/// Decides whether a sender is one of our own admins.
#[async_trait]
pub trait AdminCheck: Send + Sync {
    async fn is_authorized_admin(&self, identifier: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    FromMe,
    BridgeReply,
    Admin,
    ClientNotReady,
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    Skipped(SkipReason),
}

pub struct AutoResponder {
    enabled: bool,
    template: String,
    cooldown: CooldownMap,
    admins: Arc<dyn AdminCheck>,
    outbound: Arc<dyn MessagingOutbound>,
    retry: RetryPolicy,
}

impl AutoResponder {
    pub fn new(
        config: &AutoReplyConfig,
        admins: Arc<dyn AdminCheck>,
        outbound: Arc<dyn MessagingOutbound>,
    ) -> Self {
        let template = config
            .template
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TEMPLATE)
            .to_string();
        Self {
            enabled: config.enabled,
            template,
            cooldown: CooldownMap::new(config.cooldown()),
            admins,
            outbound,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn cooldown(&self) -> &CooldownMap {
        &self.cooldown
    }

    /// Acknowledge `msg` through `client_id` unless one of the skip rules
    /// applies. The cooldown is marked before sending and stays marked if
    /// the send fails.
    pub async fn handle(&self, client_id: &str, msg: &InboundMessage) -> Result<Outcome> {
        if let Some(reason) = self.skip_reason(client_id, msg).await {
            debug!(client_id, from = %msg.from, ?reason, "auto-reply skipped");
            return Ok(Outcome::Skipped(reason));
        }

        let to = if msg.chat_id.is_empty() {
            msg.from.as_str()
        } else {
            msg.chat_id.as_str()
        };
        info!(client_id, to, "sending auto-reply");
        with_retry(self.retry, "auto_reply_send", || {
            self.outbound.send_text(client_id, to, &self.template)
        })
        .await
        .map_err(|e| {
            let (attempts, source) = match e {
                RetryError::Permanent(source) => (1, source),
                RetryError::Exhausted { attempts, last } => (attempts, last),
            };
            warn!(client_id, to, attempts, error = %source, "auto-reply send failed");
            Error::Send { attempts, source }
        })?;
        Ok(Outcome::Sent)
    }

    async fn skip_reason(&self, client_id: &str, msg: &InboundMessage) -> Option<SkipReason> {
        if !self.enabled {
            return Some(SkipReason::Disabled);
        }
        if msg.from_me {
            return Some(SkipReason::FromMe);
        }
        if msg
            .quoted_body
            .as_deref()
            .is_some_and(|q| extract_session_id(q).is_some())
        {
            return Some(SkipReason::BridgeReply);
        }
        if self.admins.is_authorized_admin(&msg.from).await {
            return Some(SkipReason::Admin);
        }
        if !self.outbound.is_ready(client_id) {
            return Some(SkipReason::ClientNotReady);
        }
        if !self.cooldown.try_acquire(&msg.from) {
            return Some(SkipReason::Cooldown);
        }
        None
    }
}
