//! GIF size reducer.
//!
//! Shrinks an oversized animation in place by re-encoding it at a smaller
//! scale and frame rate. Each accepted pass must be strictly smaller than
//! the previous one; the first pass that fails to improve ends the loop.
//! Giving up above the target is a normal outcome, not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::fs_utils::file_size;

/// Scale factor below which the compressor gives up.
pub const MIN_SCALE: f64 = 0.3;

const START_SCALE: f64 = 1.0;
const SCALE_STEP: f64 = 0.8;
const START_FPS: f64 = 20.0;
const FPS_STEP: f64 = 0.9;
const MIN_FPS: f64 = 10.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Parameters of one re-encode pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    /// Scale relative to the file being re-encoded
    pub scale: f64,
    /// Target frame rate
    pub fps: f64,
}

/// Re-encodes a GIF. Implementations must write `output` and leave `input`
/// untouched.
#[async_trait]
pub trait GifEncoder: Send + Sync {
    async fn encode(&self, input: &Path, output: &Path, params: EncodeParams) -> MediaResult<()>;
}

#[async_trait]
impl<T: GifEncoder + ?Sized> GifEncoder for Arc<T> {
    async fn encode(&self, input: &Path, output: &Path, params: EncodeParams) -> MediaResult<()> {
        (**self).encode(input, output, params).await
    }
}

/// FFmpeg-backed encoder that keeps transparency.
#[derive(Debug, Clone)]
pub struct FfmpegGifEncoder {
    runner: FfmpegRunner,
}

impl Default for FfmpegGifEncoder {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl FfmpegGifEncoder {
    pub fn new(pass_timeout: Duration) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(pass_timeout),
        }
    }

    /// Filter graph for one pass.
    pub fn filter(params: EncodeParams) -> String {
        format!(
            "fps={:.3},scale=iw*{:.4}:-1:flags=lanczos,split[a][b];\
             [a]palettegen=reserve_transparent=1[p];[b][p]paletteuse=alpha_threshold=128",
            params.fps, params.scale
        )
    }
}

#[async_trait]
impl GifEncoder for FfmpegGifEncoder {
    async fn encode(&self, input: &Path, output: &Path, params: EncodeParams) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output)
            .filter_complex(Self::filter(params))
            .output_args(["-loop", "0"]);

        self.runner.run(&cmd).await
    }
}

/// Outcome of a shrink call.
#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkReport {
    /// The (possibly rewritten) file; always the path passed in
    pub path: PathBuf,
    pub original_size: u64,
    pub final_size: u64,
    /// Encoder invocations
    pub attempts: u32,
    /// Sizes after each accepted pass, strictly decreasing
    pub accepted_sizes: Vec<u64>,
    pub met_target: bool,
}

/// Monotonic-or-give-up GIF shrinker.
pub struct GifCompressor<E = FfmpegGifEncoder> {
    encoder: E,
}

impl Default for GifCompressor<FfmpegGifEncoder> {
    fn default() -> Self {
        Self::new(FfmpegGifEncoder::default())
    }
}

impl<E: GifEncoder> GifCompressor<E> {
    pub fn new(encoder: E) -> Self {
        Self { encoder }
    }

    /// Shrink `path` in place until it fits `max_size_mb` or no pass helps.
    pub async fn shrink(&self, path: &Path, max_size_mb: f64) -> MediaResult<ShrinkReport> {
        let max_bytes = (max_size_mb * BYTES_PER_MB) as u64;
        let original_size = file_size(path).await?;

        let mut report = ShrinkReport {
            path: path.to_path_buf(),
            original_size,
            final_size: original_size,
            attempts: 0,
            accepted_sizes: Vec::new(),
            met_target: original_size <= max_bytes,
        };

        if report.met_target {
            debug!(
                "{} is {} bytes, within {} MB; nothing to do",
                path.display(),
                original_size,
                max_size_mb
            );
            return Ok(report);
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut scale = START_SCALE;
        let mut fps = START_FPS;
        // Scale of the current working file relative to the original.
        let mut applied_scale = START_SCALE;

        while scale >= MIN_SCALE {
            report.attempts += 1;

            let candidate = tempfile::Builder::new()
                .prefix(".shrink-")
                .suffix(".gif")
                .tempfile_in(dir)?
                .into_temp_path();

            let params = EncodeParams {
                scale: scale / applied_scale,
                fps,
            };

            if let Err(e) = self.encoder.encode(path, &candidate, params).await {
                warn!(
                    "GIF re-encode at scale {:.3} / {:.1} fps failed, keeping last result: {}",
                    scale, fps, e
                );
                break;
            }

            let new_size = match file_size(&candidate).await {
                Ok(size) if size > 0 => size,
                _ => {
                    warn!("GIF re-encode produced no output, keeping last result");
                    break;
                }
            };

            if new_size >= report.final_size {
                debug!(
                    "Pass at scale {:.3} gave {} bytes (not below {}), stopping",
                    scale, new_size, report.final_size
                );
                break;
            }

            candidate
                .persist(path)
                .map_err(|e| crate::error::MediaError::Io(e.error))?;

            report.final_size = new_size;
            report.accepted_sizes.push(new_size);
            applied_scale = scale;

            if new_size <= max_bytes {
                report.met_target = true;
                break;
            }

            scale *= SCALE_STEP;
            fps = (fps * FPS_STEP).max(MIN_FPS);
        }

        if report.met_target {
            info!(
                "Shrunk {} from {} to {} bytes in {} passes",
                path.display(),
                report.original_size,
                report.final_size,
                report.attempts
            );
        } else {
            warn!(
                "Gave up shrinking {}: final size {} bytes ({:.2} MB) exceeds {} MB after {} passes",
                path.display(),
                report.final_size,
                report.final_size as f64 / BYTES_PER_MB,
                max_size_mb,
                report.attempts
            );
        }

        Ok(report)
    }
}
