use anyhow::{bail, Context, Result};
use lpr_engine::{LprConfig, LprEngine};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_with_service("lpr-recognize")?;

    let images: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if images.is_empty() {
        bail!("usage: lpr-recognize <image>...");
    }

    let config = LprConfig::from_env()?;
    config.validate().context("Invalid LPR configuration")?;
    info!(
        detector = %config.models.detector_model_path.display(),
        recognizer = %config.models.recognizer_model_path.display(),
        provider = %config.models.execution_provider,
        "Starting plate recognition"
    );

    let engine = LprEngine::new(config);
    engine
        .spawn_warm_up()
        .await
        .context("Model warm-up task panicked")??;

    for path in images {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let worker = engine.clone();
        let result = tokio::task::spawn_blocking(move || worker.recognize(&bytes)).await?;

        info!(image = %path.display(), ok = result.ok, plate = %result.text, "Processed image");
        println!("{}", serde_json::to_string(&result)?);
    }

    Ok(())
}
