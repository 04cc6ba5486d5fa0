//! WhatsApp messaging client.
//!
//! A sidecar process owns the WhatsApp Web sessions and speaks a JSON
//! protocol over a WebSocket. This crate keeps that connection alive,
//! turns sidecar frames into [`relaydesk_channels::MessagingEvent`]s and
//! sends text and contact lookups back through it.

pub mod outbound;
pub mod plugin;
pub mod sidecar;
pub mod types;

pub use {
    outbound::WhatsAppOutbound,
    plugin::{WhatsAppClient, to_event},
    sidecar::SidecarHandle,
    types::{GatewayMessage, SidecarMessage},
};
