use std::time::Duration;

use {
    async_trait::async_trait,
    relaydesk_config::AiConfig,
    relaydesk_sessions::{ChatMessage, Sender},
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, trace, warn},
};

use crate::{
    ChatEngine, EngineReply,
    error::{Error, Result},
    signals::{detect_sentiment, wants_human},
};

/// Marker the model appends when it thinks a human should take over.
const HANDOVER_MARKER: &str = "[HANDOVER]";

const DEFAULT_SYSTEM_PROMPT: &str = "Kamu adalah asisten virtual Valpro Intertech, perusahaan \
     jasa pembuatan website, aplikasi, dan layanan IT. Jawab dalam bahasa yang dipakai \
     pengunjung, singkat dan ramah. Jika pengunjung meminta admin atau pertanyaannya tidak bisa \
     kamu jawab, akhiri jawaban dengan [HANDOVER].";

const SUMMARY_PROMPT: &str = "Ringkas percakapan berikut dalam 2-3 kalimat bahasa Indonesia \
     untuk admin yang akan mengambil alih: kebutuhan pengunjung, informasi penting, dan \
     pertanyaan yang belum terjawab.";

/// Chat engine for any OpenAI-compatible `/chat/completions` endpoint
/// (Groq by default).
pub struct OpenAiEngine {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    system_prompt: String,
    client: reqwest::Client,
}

impl OpenAiEngine {
    pub fn new(
        api_key: Secret<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            client,
        })
    }

    /// Build from config; `None` when no API key is configured.
    pub fn from_config(cfg: &AiConfig) -> Result<Option<Self>> {
        let Some(key) = cfg.api_key.clone() else {
            return Ok(None);
        };
        let mut engine = Self::new(key, &cfg.model, &cfg.base_url, cfg.timeout())?;
        if let Some(prompt) = cfg.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            engine.system_prompt = prompt.to_string();
        }
        Ok(Some(engine))
    }

    async fn complete(&self, messages: Vec<serde_json::Value>) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.4,
        });
        debug!(model = %self.model, messages_count = messages_len(&body), "chat completion request");
        trace!(body = %body, "chat completion request body");

        let http_resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, body = %body, "chat completion API error");
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let resp = http_resp.json::<serde_json::Value>().await?;
        trace!(response = %resp, "chat completion raw response");
        resp["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or(Error::EmptyResponse)
    }
}

fn messages_len(body: &serde_json::Value) -> usize {
    body["messages"].as_array().map_or(0, Vec::len)
}

fn role(sender: Sender) -> &'static str {
    match sender {
        Sender::Visitor => "user",
        Sender::Bot | Sender::Admin => "assistant",
    }
}

#[async_trait]
impl ChatEngine for OpenAiEngine {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn reply(&self, history: &[ChatMessage], message: &str) -> Result<EngineReply> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(serde_json::json!({ "role": "system", "content": self.system_prompt }));
        messages.extend(
            history
                .iter()
                .map(|m| serde_json::json!({ "role": role(m.sender), "content": m.content })),
        );
        messages.push(serde_json::json!({ "role": "user", "content": message }));

        let raw = self.complete(messages).await?;
        let model_suggests = raw.contains(HANDOVER_MARKER);
        let reply = raw.replace(HANDOVER_MARKER, "").trim().to_string();
        Ok(EngineReply {
            reply,
            suggest_handover: model_suggests || wants_human(message),
            sentiment: detect_sentiment(message),
        })
    }

    async fn summarize(&self, history: &[ChatMessage]) -> Result<String> {
        let transcript = history
            .iter()
            .map(|m| format!("{}: {}", m.sender, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = vec![
            serde_json::json!({ "role": "system", "content": SUMMARY_PROMPT }),
            serde_json::json!({ "role": "user", "content": transcript }),
        ];
        self.complete(messages).await
    }
}
