//! Local matting through the `backgroundremover` CLI.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use cutout_models::{MediaKind, MediaResult};

use crate::backend::MattingBackend;
use crate::config::LocalConfig;
use crate::error::{BackendError, BackendResult};

const TOOL: &str = "backgroundremover";

/// Runs the CLI as a child process, one per job.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    config: LocalConfig,
}

impl LocalBackend {
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    /// Output flag and container for an input kind.
    fn output_mode(kind: MediaKind) -> (&'static str, &'static str) {
        match kind {
            MediaKind::Video => ("-tv", ".mov"),
            MediaKind::Animation => ("-tg", ".gif"),
        }
    }
}

#[async_trait]
impl MattingBackend for LocalBackend {
    async fn process(&self, input: &Path, kind: MediaKind) -> BackendResult<MediaResult> {
        let binary = which::which(&self.config.binary)
            .map_err(|_| BackendError::ToolNotFound(TOOL.to_string()))?;

        let (flag, suffix) = Self::output_mode(kind);

        // Removed on drop unless kept on success.
        let output = tempfile::Builder::new()
            .prefix("cutout-")
            .suffix(suffix)
            .tempfile_in(&self.config.output_dir)?
            .into_temp_path();

        let mut cmd = Command::new(&binary);
        cmd.arg("-i")
            .arg(input)
            .arg(flag)
            .arg("-o")
            .arg(&*output)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        for (key, value) in self
            .config
            .device
            .child_env(|key| std::env::var_os(key).is_some())
        {
            debug!("Setting {}={:?} for {}", key, value, TOOL);
            cmd.env(key, value);
        }

        info!(
            "Running: {} -i {} {} -o {}",
            binary.display(),
            input.display(),
            flag,
            output.display()
        );

        let result = cmd.output().await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = {
                let chars: Vec<char> = stderr.chars().collect();
                chars[chars.len().saturating_sub(1000)..].iter().collect()
            };
            error!("{} failed ({}): {}", TOOL, result.status, tail);

            let last_line = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("unknown error")
                .trim()
                .to_string();
            return Err(BackendError::tool_failed(TOOL, last_line));
        }

        let produced = tokio::fs::metadata(&output)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !produced {
            return Err(BackendError::NoOutput(TOOL.to_string()));
        }

        let path = output.keep().map_err(|e| BackendError::Io(e.error))?;

        Ok(MediaResult::from_local(path, kind)
            .with_meta("backend", "local")
            .with_meta("tool", TOOL))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevicePreference;
    use tempfile::TempDir;

    fn backend(binary: &str, output_dir: &Path) -> LocalBackend {
        LocalBackend::new(LocalConfig {
            binary: binary.to_string(),
            device: DevicePreference::Cpu,
            output_dir: output_dir.to_path_buf(),
        })
    }

    fn entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let out = TempDir::new().unwrap();
        let err = backend("cutout-definitely-missing-tool", out.path())
            .process(Path::new("/tmp/in.mp4"), MediaKind::Video)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::ToolNotFound(_)));
        assert_eq!(
            err.to_string(),
            "backgroundremover CLI not found. Ensure the package is installed and on PATH."
        );
        assert_eq!(entries(&out), 0);
    }

    #[cfg(unix)]
    mod with_fake_tool {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable shell script and return its path.
        fn script(dir: &TempDir, body: &str) -> String {
            let path = dir.path().join("fake-bgremover");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        // Writes the flag it was given into the file after `-o`.
        const WRITES_OUTPUT: &str = r#"mode=""
while [ $# -gt 0 ]; do
  case "$1" in
    -tv|-tg) mode="$1" ;;
    -o) shift; out="$1" ;;
  esac
  shift
done
printf "%s" "$mode" > "$out""#;

        #[tokio::test]
        async fn test_video_output_is_mov() {
            let bin = TempDir::new().unwrap();
            let out = TempDir::new().unwrap();
            let tool = script(&bin, WRITES_OUTPUT);

            let result = backend(&tool, out.path())
                .process(Path::new("/tmp/in.mp4"), MediaKind::Video)
                .await
                .unwrap();

            let path = result.output.local_path().unwrap().to_path_buf();
            assert_eq!(result.output.extension().as_deref(), Some("mov"));
            assert_eq!(result.kind, MediaKind::Video);
            assert_eq!(std::fs::read_to_string(&path).unwrap(), "-tv");
            assert_eq!(result.meta.get("backend").map(String::as_str), Some("local"));
        }

        #[tokio::test]
        async fn test_animation_output_is_gif() {
            let bin = TempDir::new().unwrap();
            let out = TempDir::new().unwrap();
            let tool = script(&bin, WRITES_OUTPUT);

            let result = backend(&tool, out.path())
                .process(Path::new("/tmp/in.gif"), MediaKind::Animation)
                .await
                .unwrap();

            assert!(result.is_local_gif());
            assert_eq!(result.kind, MediaKind::Animation);
            let path = result.output.local_path().unwrap();
            assert_eq!(std::fs::read_to_string(path).unwrap(), "-tg");
        }

        #[tokio::test]
        async fn test_non_zero_exit_reports_last_stderr_line() {
            let bin = TempDir::new().unwrap();
            let out = TempDir::new().unwrap();
            let tool = script(
                &bin,
                "echo 'loading model' >&2\necho 'RuntimeError: bad frame' >&2\nexit 3",
            );

            let err = backend(&tool, out.path())
                .process(Path::new("/tmp/in.mp4"), MediaKind::Video)
                .await
                .unwrap_err();

            assert_eq!(
                err.to_string(),
                "backgroundremover failed: RuntimeError: bad frame"
            );
            assert_eq!(entries(&out), 0, "output temp file must be removed");
        }

        #[tokio::test]
        async fn test_empty_output_is_an_error() {
            let bin = TempDir::new().unwrap();
            let out = TempDir::new().unwrap();
            let tool = script(&bin, "exit 0");

            let err = backend(&tool, out.path())
                .process(Path::new("/tmp/in.mp4"), MediaKind::Video)
                .await
                .unwrap_err();

            assert!(matches!(err, BackendError::NoOutput(_)));
            assert_eq!(err.to_string(), "No output produced by backgroundremover.");
            assert_eq!(entries(&out), 0);
        }
    }
}
