//! Backend configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BackendError, BackendResult};

/// Which backend the worker runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Hosted,
    Local,
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hosted" | "replicate" => Ok(BackendKind::Hosted),
            "local" => Ok(BackendKind::Local),
            other => Err(BackendError::config(format!(
                "BACKEND must be 'hosted' or 'local', got '{other}'"
            ))),
        }
    }
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Hosted => "hosted",
            BackendKind::Local => "local",
        }
    }
}

/// Compute device hint for the local CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Hide CUDA and keep PyTorch on the CPU
    #[default]
    Cpu,
    /// Hide CUDA, allow Apple Metal
    Mps,
    /// Leave the environment alone
    Other(String),
}

impl DevicePreference {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "cpu" => DevicePreference::Cpu,
            "mps" => DevicePreference::Mps,
            other => DevicePreference::Other(other.to_string()),
        }
    }

    /// Variables to set on the child when the parent has not set them.
    ///
    /// `is_set` reports whether the parent environment already defines a
    /// variable; those are never overridden.
    pub fn child_env(&self, is_set: impl Fn(&str) -> bool) -> Vec<(&'static str, &'static str)> {
        let defaults: &[(&'static str, &'static str)] = match self {
            DevicePreference::Cpu | DevicePreference::Mps => &[
                ("CUDA_VISIBLE_DEVICES", ""),
                ("PYTORCH_ENABLE_MPS_FALLBACK", "1"),
            ],
            DevicePreference::Other(_) => &[],
        };

        defaults
            .iter()
            .filter(|(key, _)| !is_set(key))
            .copied()
            .collect()
    }
}

/// Hosted prediction API settings.
#[derive(Debug, Clone)]
pub struct HostedConfig {
    pub api_token: Option<String>,
    pub api_url: String,
    /// `owner/name` or `owner/name:version`
    pub model: String,
    pub poll_interval: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl Default for HostedConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            api_url: "https://api.replicate.com".to_string(),
            model: "pfnet/robust-video-matting".to_string(),
            poll_interval: Duration::from_secs(2),
            max_retries: 2,
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Local CLI settings.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Executable name or path
    pub binary: String,
    pub device: DevicePreference,
    /// Where output files are created
    pub output_dir: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            binary: "backgroundremover".to_string(),
            device: DevicePreference::Cpu,
            output_dir: std::env::temp_dir(),
        }
    }
}

/// Full backend configuration.
#[derive(Debug, Clone, Default)]
pub struct MattingConfig {
    pub backend: BackendKind,
    pub hosted: HostedConfig,
    pub local: LocalConfig,
}

impl MattingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> BackendResult<Self> {
        let hosted_defaults = HostedConfig::default();
        let local_defaults = LocalConfig::default();

        let backend = match std::env::var("BACKEND") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => BackendKind::default(),
        };

        let hosted = HostedConfig {
            api_token: std::env::var("REPLICATE_API_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            api_url: std::env::var("REPLICATE_API_URL").unwrap_or(hosted_defaults.api_url),
            model: std::env::var("REPLICATE_MODEL").unwrap_or(hosted_defaults.model),
            poll_interval: std::env::var("REPLICATE_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(hosted_defaults.poll_interval),
            max_retries: std::env::var("REPLICATE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(hosted_defaults.max_retries),
            request_timeout: hosted_defaults.request_timeout,
        };

        let local = LocalConfig {
            binary: std::env::var("BACKGROUNDREMOVER_BIN").unwrap_or(local_defaults.binary),
            device: std::env::var("BACKGROUNDREMOVER_DEVICE")
                .map(|raw| DevicePreference::parse(&raw))
                .unwrap_or_default(),
            output_dir: local_defaults.output_dir,
        };

        Ok(Self {
            backend,
            hosted,
            local,
        })
    }
}
