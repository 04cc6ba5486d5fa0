use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    relaydesk_channels::{ConnectionRegistry, Error, MessagingOutbound, Result},
    relaydesk_identity::{ContactLookup, LookupError},
    tokio::sync::RwLock,
    tracing::{debug, warn},
};

use crate::{
    sidecar::SidecarHandle,
    types::{GatewayMessage, SidecarMessage},
};

pub(crate) type SharedHandle = Arc<RwLock<Option<SidecarHandle>>>;

/// Sends through whichever sidecar connection is currently live.
#[derive(Clone)]
pub struct WhatsAppOutbound {
    sidecar: SharedHandle,
    registry: Arc<ConnectionRegistry>,
    /// Client used for contact lookups.
    lookup_client_id: String,
}

impl WhatsAppOutbound {
    pub(crate) fn new(
        sidecar: SharedHandle,
        registry: Arc<ConnectionRegistry>,
        lookup_client_id: impl Into<String>,
    ) -> Self {
        Self {
            sidecar,
            registry,
            lookup_client_id: lookup_client_id.into(),
        }
    }

    async fn handle(&self) -> Option<SidecarHandle> {
        self.sidecar
            .read()
            .await
            .as_ref()
            .filter(|h| h.is_connected())
            .cloned()
    }
}

#[async_trait]
impl MessagingOutbound for WhatsAppOutbound {
    async fn send_text(&self, client_id: &str, to: &str, text: &str) -> Result<()> {
        if to.trim().is_empty() {
            return Err(Error::invalid_input("empty recipient"));
        }
        let Some(handle) = self.handle().await else {
            return Err(Error::unavailable("sidecar not connected"));
        };
        let response = handle
            .request("send_text", |request_id| GatewayMessage::SendText {
                request_id,
                account_id: client_id.to_string(),
                to: to.to_string(),
                text: text.to_string(),
            })
            .await?;
        match response {
            SidecarMessage::SendResult { success: true, message_id, .. } => {
                debug!(client_id, to, ?message_id, "message sent");
                Ok(())
            },
            SidecarMessage::SendResult { error, .. } => {
                let error = error.unwrap_or_else(|| "send failed".into());
                warn!(client_id, to, error = %error, "sidecar rejected send");
                Err(Error::rejected(error))
            },
            other => Err(Error::rejected(format!("unexpected sidecar response: {other:?}"))),
        }
    }

    fn is_ready(&self, client_id: &str) -> bool {
        self.registry.is_ready(client_id)
    }
}

#[async_trait]
impl ContactLookup for WhatsAppOutbound {
    async fn lookup(&self, opaque: &[String]) -> std::result::Result<HashMap<String, String>, LookupError> {
        let Some(handle) = self.handle().await else {
            return Err(LookupError::Network("sidecar not connected".into()));
        };
        let response = handle
            .request("lookup_contacts", |request_id| GatewayMessage::LookupContacts {
                request_id,
                account_id: self.lookup_client_id.clone(),
                ids: opaque.to_vec(),
            })
            .await
            .map_err(|e| LookupError::from_message(e.to_string()))?;
        match response {
            SidecarMessage::LookupResult { success: true, mappings, .. } => Ok(mappings),
            SidecarMessage::LookupResult { error, .. } => Err(LookupError::from_message(
                error.unwrap_or_else(|| "lookup failed".into()),
            )),
            other => Err(LookupError::Network(format!(
                "unexpected sidecar response: {other:?}"
            ))),
        }
    }
}
