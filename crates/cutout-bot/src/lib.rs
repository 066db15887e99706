//! Chat front end for the cutout bot.
//!
//! This crate provides:
//! - Size-based admission control for uploads
//! - Staging of accepted uploads and job enqueue
//! - The long-poll update loop answering commands and rejections

pub mod bot;
pub mod config;
pub mod error;
pub mod intake;

pub use bot::{handle_update, Bot};
pub use config::BotConfig;
pub use error::{IntakeError, IntakeResult};
pub use intake::{Admission, IntakeValidator};
