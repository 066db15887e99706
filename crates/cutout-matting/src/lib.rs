//! Background-removal backends.
//!
//! This crate provides:
//! - The `MattingBackend` seam the worker calls without knowing the variant
//! - A hosted backend speaking a Replicate-style prediction API
//! - A local backend driving the `backgroundremover` CLI
//! - Environment-driven configuration and the startup factory

pub mod backend;
pub mod config;
pub mod error;
pub mod hosted;
pub mod local;

pub use backend::{build_backend, MattingBackend};
pub use config::{BackendKind, DevicePreference, HostedConfig, LocalConfig, MattingConfig};
pub use error::{BackendError, BackendResult};
pub use hosted::{extract_output_url, HostedBackend};
pub use local::LocalBackend;
