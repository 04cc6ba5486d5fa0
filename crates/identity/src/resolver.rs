use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use {
    async_trait::async_trait,
    relaydesk_common::ErrorKind,
    relaydesk_config::IdentityConfig,
    tracing::{debug, info, warn},
};

use crate::{
    cache::IdentityCache,
    jid::{is_canonical, split_jid},
};

/// Outcome of resolving one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Canonical phone id (user part only).
    Resolved(String),
    /// The input identifier, unchanged.
    Unresolved(String),
}

impl Resolution {
    #[must_use]
    pub fn canonical(&self) -> Option<&str> {
        match self {
            Self::Resolved(id) => Some(id),
            Self::Unresolved(_) => None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    #[error("contact lookup rate limited: {0}")]
    RateLimited(String),
    #[error("contact lookup failed: {0}")]
    Network(String),
}

impl LookupError {
    /// Classify a transport error message.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match ErrorKind::classify(&message) {
            ErrorKind::RateLimited => Self::RateLimited(message),
            _ => Self::Network(message),
        }
    }
}

/// Network lookup of opaque user ids.
#[async_trait]
pub trait ContactLookup: Send + Sync {
    /// Resolve a batch of opaque user ids. Ids absent from the returned map
    /// are unknown to the network.
    async fn lookup(&self, opaque: &[String]) -> Result<HashMap<String, String>, LookupError>;
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub initial_batch_size: usize,
    pub success_delay: Duration,
    pub failure_delay: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&IdentityConfig::default())
    }
}

impl From<&IdentityConfig> for ResolverSettings {
    fn from(cfg: &IdentityConfig) -> Self {
        Self {
            initial_batch_size: cfg.initial_batch_size.max(1),
            success_delay: cfg.success_delay(),
            failure_delay: cfg.failure_delay(),
        }
    }
}

/// Maps opaque identifiers to canonical contact ids.
///
/// Canonical ids never touch the network, cached ids never touch it twice,
/// and a rate-limit signal stops all further lookups for the rest of the
/// current pass.
pub struct IdentityResolver {
    cache: Arc<IdentityCache>,
    lookup: Option<Arc<dyn ContactLookup>>,
    settings: ResolverSettings,
}

impl IdentityResolver {
    pub fn new(
        cache: Arc<IdentityCache>,
        lookup: Option<Arc<dyn ContactLookup>>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            cache,
            lookup,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    pub async fn resolve(&self, id: &str) -> Resolution {
        self.resolve_all(&[id.to_string()])
            .await
            .pop()
            .unwrap_or_else(|| Resolution::Unresolved(id.to_string()))
    }

    /// One resolution pass. Results are returned in input order.
    pub async fn resolve_all(&self, ids: &[String]) -> Vec<Resolution> {
        let mut out: Vec<Option<Resolution>> = vec![None; ids.len()];
        let mut pending = VecDeque::new();

        for (idx, id) in ids.iter().enumerate() {
            let (user, _) = split_jid(id);
            if is_canonical(id) {
                out[idx] = Some(Resolution::Resolved(user.to_string()));
            } else if let Some(canonical) = self.cache.get(user) {
                out[idx] = Some(Resolution::Resolved(canonical));
            } else {
                pending.push_back((idx, user.to_string()));
            }
        }

        if let Some(lookup) = &self.lookup
            && !pending.is_empty()
        {
            self.lookup_pending(lookup.as_ref(), pending, &mut out).await;
        }

        out.into_iter()
            .zip(ids)
            .map(|(r, id)| r.unwrap_or_else(|| Resolution::Unresolved(id.clone())))
            .collect()
    }

    async fn lookup_pending(
        &self,
        lookup: &dyn ContactLookup,
        mut pending: VecDeque<(usize, String)>,
        out: &mut [Option<Resolution>],
    ) {
        let mut batch_size = self.settings.initial_batch_size.max(1);
        let total = pending.len();
        let mut resolved = 0usize;

        while !pending.is_empty() {
            let take = batch_size.min(pending.len());
            let batch: Vec<(usize, String)> = pending.drain(..take).collect();
            let mut users: Vec<String> = batch.iter().map(|(_, u)| u.clone()).collect();
            users.dedup();

            match lookup.lookup(&users).await {
                Ok(found) => {
                    for (idx, user) in &batch {
                        let Some(canonical) = found.get(user) else {
                            continue;
                        };
                        let canonical = split_jid(canonical).0.to_string();
                        if let Err(e) = self.cache.set(user, &canonical).await {
                            warn!(opaque = %user, error = %e, "failed to persist identity mapping");
                        }
                        out[*idx] = Some(Resolution::Resolved(canonical));
                        resolved += 1;
                    }
                    if !pending.is_empty() {
                        tokio::time::sleep(self.settings.success_delay).await;
                    }
                },
                Err(LookupError::RateLimited(e)) => {
                    warn!(
                        remaining = pending.len() + batch.len(),
                        error = %e,
                        "contact lookup rate limited, skipping the rest of this pass"
                    );
                    break;
                },
                Err(LookupError::Network(e)) => {
                    batch_size = (batch_size / 2).max(1);
                    warn!(batch = batch.len(), next_batch_size = batch_size, error = %e, "contact lookup failed");
                    tokio::time::sleep(self.settings.failure_delay).await;
                },
            }
        }

        if total > 1 {
            info!(total, resolved, "identity resolution pass finished");
        } else {
            debug!(total, resolved, "identity resolution finished");
        }
    }
}
