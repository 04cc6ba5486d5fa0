use {
    async_trait::async_trait,
    relaydesk_sessions::{ChatMessage, Sender},
};

use crate::{
    ChatEngine, EngineReply,
    error::Result,
    signals::{Sentiment, detect_sentiment, truncate, wants_human},
};

pub const HANDOVER_REPLY: &str = "Baik, saya akan menghubungkan Anda dengan tim kami. Silakan \
     tekan tombol \"Chat dengan Admin\" dan admin kami akan segera membalas.";

pub const DEFAULT_REPLY: &str = "Terima kasih atas pesannya! Untuk informasi layanan website, \
     aplikasi, dan IT dari Valpro Intertech, tim kami siap membantu. Jika ingin berbicara \
     langsung dengan admin, tekan tombol \"Chat dengan Admin\".";

pub const NEGATIVE_REPLY: &str = "Mohon maaf atas ketidaknyamanannya. Admin kami dapat membantu \
     menyelesaikan masalah Anda; tekan tombol \"Chat dengan Admin\" untuk terhubung.";

/// Keyword-driven engine used when no completion endpoint is configured, and
/// as the degraded path when one fails.
#[derive(Debug, Default, Clone)]
pub struct ScriptedEngine;

impl ScriptedEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Synchronous reply used as a fallback by callers that cannot fail.
    #[must_use]
    pub fn canned_reply(message: &str) -> EngineReply {
        let sentiment = detect_sentiment(message);
        let (reply, suggest_handover) = if wants_human(message) {
            (HANDOVER_REPLY, true)
        } else if sentiment == Sentiment::Negative {
            (NEGATIVE_REPLY, true)
        } else {
            (DEFAULT_REPLY, false)
        };
        EngineReply {
            reply: reply.to_string(),
            suggest_handover,
            sentiment,
        }
    }

    /// Last few visitor messages joined, for admins when no model is available.
    #[must_use]
    pub fn plain_summary(history: &[ChatMessage]) -> String {
        let visitor: Vec<&str> = history
            .iter()
            .filter(|m| m.sender == Sender::Visitor)
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if visitor.is_empty() {
            return "Pengunjung belum mengirim pesan.".to_string();
        }
        let start = visitor.len().saturating_sub(3);
        let recent = visitor[start..]
            .iter()
            .map(|c| format!("- {}", truncate(c, 160)))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Pesan terakhir pengunjung:\n{recent}")
    }
}

#[async_trait]
impl ChatEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn reply(&self, _history: &[ChatMessage], message: &str) -> Result<EngineReply> {
        Ok(Self::canned_reply(message))
    }

    async fn summarize(&self, history: &[ChatMessage]) -> Result<String> {
        Ok(Self::plain_summary(history))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[tokio::test]
    async fn human_request_suggests_handover() {
        let out = ScriptedEngine::new()
            .reply(&[], "Saya mau bicara dengan admin")
            .await
            .unwrap();
        assert!(out.suggest_handover);
        assert_eq!(out.reply, HANDOVER_REPLY);
    }

    #[tokio::test]
    async fn plain_message_stays_with_bot() {
        let out = ScriptedEngine::new().reply(&[], "halo").await.unwrap();
        assert!(!out.suggest_handover);
        assert_eq!(out.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn summary_keeps_last_three_visitor_messages() {
        let now = chrono::Utc::now();
        let history: Vec<ChatMessage> = ["a", "b", "c", "d"]
            .iter()
            .map(|c| ChatMessage::new("s", Sender::Visitor, *c, now))
            .chain(std::iter::once(ChatMessage::new("s", Sender::Bot, "bot", now)))
            .collect();
        let summary = ScriptedEngine::plain_summary(&history);
        assert!(!summary.contains("- a"));
        assert!(summary.contains("- b\n- c\n- d"));
        assert_eq!(
            ScriptedEngine::plain_summary(&[]),
            "Pengunjung belum mengirim pesan."
        );
    }
}
