//! Contact identity: JID normalization, the opaque → canonical cache, batched
//! network resolution, and the contact label index.

pub mod cache;
pub mod error;
pub mod jid;
pub mod labels;
pub mod resolver;

pub use {
    cache::IdentityCache,
    error::{Error, Result},
    labels::{LabelStore, LabelSummary},
    resolver::{ContactLookup, IdentityResolver, LookupError, Resolution, ResolverSettings},
};
