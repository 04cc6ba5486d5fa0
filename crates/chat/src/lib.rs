//! Bot replies for visitor conversations: the [`ChatEngine`] seam, an
//! OpenAI-compatible engine, a scripted engine for deployments without an
//! API key, and keyword signals for sentiment and handover intent.

use {async_trait::async_trait, relaydesk_sessions::ChatMessage, serde::Serialize};

pub mod error;
pub mod openai;
pub mod scripted;
pub mod signals;

pub use {
    error::{Error, Result},
    openai::OpenAiEngine,
    scripted::ScriptedEngine,
    signals::{Sentiment, detect_sentiment, truncate, wants_human},
};

/// Result of a bot turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineReply {
    pub reply: String,
    /// Advisory only; the visitor decides whether to request a human.
    pub suggest_handover: bool,
    pub sentiment: Sentiment,
}

#[async_trait]
pub trait ChatEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Answer `message` given the prior conversation (oldest first, not
    /// including `message`).
    async fn reply(&self, history: &[ChatMessage], message: &str) -> Result<EngineReply>;

    /// Short summary of a conversation for the admin who picks it up.
    async fn summarize(&self, history: &[ChatMessage]) -> Result<String>;
}
