use std::path::Path;

use cutout_matting::{BackendKind, MattingConfig};
use cutout_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;

    let ffmpeg = cutout_media::check_ffmpeg()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg at {}", ffmpeg.display());

    ensure_backend(&MattingConfig::from_env()?)?;
    ensure_env_present(&["REDIS_URL", "TELEGRAM_BOT_TOKEN"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

fn ensure_backend(config: &MattingConfig) -> anyhow::Result<()> {
    match config.backend {
        BackendKind::Local => {
            let path = which::which(&config.local.binary).map_err(|_| {
                anyhow::anyhow!("{} not found on PATH", config.local.binary)
            })?;
            println!("worker-selfcheck: local backend at {}", path.display());
        }
        BackendKind::Hosted => {
            if config.hosted.api_token.is_none() {
                anyhow::bail!("missing required env var REPLICATE_API_TOKEN");
            }
            println!("worker-selfcheck: hosted backend {}", config.hosted.model);
        }
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
