//! FFmpeg CLI wrapper for animation post-processing.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A runner with timeout and stderr capture
//! - The monotonic GIF size reducer used before delivery
//! - Small filesystem helpers shared by intake and the worker

pub mod command;
pub mod compress;
pub mod error;
pub mod fs_utils;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use compress::{
    EncodeParams, FfmpegGifEncoder, GifCompressor, GifEncoder, ShrinkReport, MIN_SCALE,
};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{file_size, remove_if_exists};
