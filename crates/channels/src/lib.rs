//! Messaging network seam.
//!
//! A messaging client (the WhatsApp sidecar bridge in production) pushes
//! [`MessagingEvent`]s into a [`MessagingEventSink`] and accepts text sends
//! through [`MessagingOutbound`]. Per-client readiness is tracked in the
//! [`ConnectionRegistry`].

pub mod error;
pub mod plugin;
pub mod state;

pub use {
    error::{Error, Result},
    plugin::{InboundMessage, MessageKind, MessagingEvent, MessagingEventSink, MessagingOutbound},
    state::{ConnectionRegistry, ConnectionState},
};
