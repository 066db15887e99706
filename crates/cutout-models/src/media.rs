//! Matting results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{ModelError, ModelResult};

/// Kind of media, which decides the delivery call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Video,
    Animation,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Animation => "animation",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the processed artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRef {
    /// Remote, fetchable by the transport
    Url(Url),
    /// Local file; bytes must be streamed to the transport
    LocalPath(PathBuf),
}

impl OutputRef {
    pub fn url(&self) -> Option<&Url> {
        match self {
            OutputRef::Url(url) => Some(url),
            OutputRef::LocalPath(_) => None,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            OutputRef::Url(_) => None,
            OutputRef::LocalPath(path) => Some(path),
        }
    }

    /// Lowercased file extension of the URL path or local file, if any.
    pub fn extension(&self) -> Option<String> {
        let ext = match self {
            OutputRef::Url(url) => Path::new(url.path())
                .extension()
                .map(|e| e.to_string_lossy().into_owned()),
            OutputRef::LocalPath(path) => path
                .extension()
                .map(|e| e.to_string_lossy().into_owned()),
        };
        ext.map(|e| e.to_ascii_lowercase())
    }
}

/// Result of a successful matting call.
///
/// Exactly one of URL / local path is set. The enum guarantees it for
/// typed construction; [`MediaResult::from_parts`] and deserialization
/// check it for loose input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMediaResult", into = "RawMediaResult")]
pub struct MediaResult {
    pub output: OutputRef,
    pub kind: MediaKind,
    /// Backend provenance (model name, backend id). Diagnostic only.
    pub meta: BTreeMap<String, String>,
}

impl MediaResult {
    pub fn from_url(url: Url, kind: MediaKind) -> Self {
        Self {
            output: OutputRef::Url(url),
            kind,
            meta: BTreeMap::new(),
        }
    }

    pub fn from_local(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            output: OutputRef::LocalPath(path.into()),
            kind,
            meta: BTreeMap::new(),
        }
    }

    /// Build from optional parts, rejecting both-set and neither-set.
    pub fn from_parts(
        url: Option<&str>,
        local_path: Option<PathBuf>,
        kind: MediaKind,
        meta: BTreeMap<String, String>,
    ) -> ModelResult<Self> {
        let output = match (url, local_path) {
            (Some(_), Some(_)) => {
                return Err(ModelError::invalid_output_ref(
                    "both url and local path are set",
                ))
            }
            (None, None) => {
                return Err(ModelError::invalid_output_ref(
                    "neither url nor local path is set",
                ))
            }
            (Some(raw), None) => OutputRef::Url(
                Url::parse(raw)
                    .map_err(|e| ModelError::invalid_output_ref(format!("{raw}: {e}")))?,
            ),
            (None, Some(path)) => OutputRef::LocalPath(path),
        };

        Ok(Self { output, kind, meta })
    }

    /// Add a provenance entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// True when the artifact is a local GIF file.
    pub fn is_local_gif(&self) -> bool {
        self.output.local_path().is_some() && self.output.extension().as_deref() == Some("gif")
    }
}

/// Wire shape with two optional fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawMediaResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    local_path: Option<PathBuf>,
    kind: MediaKind,
    #[serde(default)]
    meta: BTreeMap<String, String>,
}

impl TryFrom<RawMediaResult> for MediaResult {
    type Error = ModelError;

    fn try_from(raw: RawMediaResult) -> Result<Self, Self::Error> {
        MediaResult::from_parts(raw.url.as_deref(), raw.local_path, raw.kind, raw.meta)
    }
}

impl From<MediaResult> for RawMediaResult {
    fn from(result: MediaResult) -> Self {
        let (url, local_path) = match result.output {
            OutputRef::Url(url) => (Some(url.to_string()), None),
            OutputRef::LocalPath(path) => (None, Some(path)),
        };
        Self {
            url,
            local_path,
            kind: result.kind,
            meta: result.meta,
        }
    }
}
