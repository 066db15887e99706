//! Chat transport for the cutout bot.
//!
//! This crate provides:
//! - The `ChatTransport` / `UpdateSource` seams the core depends on
//! - A thin Telegram Bot API client implementing both
//! - A recording fake for tests (`test-util` feature)

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod transport;
pub mod types;

pub use client::{TelegramClient, TelegramConfig};
pub use error::{TransportError, TransportResult};
pub use transport::{ChatTransport, UpdateSource};
pub use types::{InboundContent, InboundMedia, InboundUpdate, MediaPayload, UpdateBatch};
