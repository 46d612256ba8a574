/// ONNX Runtime session creation with execution-provider fallback
use crate::config::ModelConfig;
use anyhow::{bail, Context, Result};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
};
use std::fmt;
use std::path::Path;

/// Execution provider, tried in order TensorRT -> CUDA -> CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    TensorRt,
    Cuda,
    Cpu,
}

impl ExecutionProvider {
    /// Parse a provider name; anything unrecognized runs on CPU
    pub fn parse(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "TENSORRT" | "TRT" => Self::TensorRt,
            "CUDA" | "GPU" => Self::Cuda,
            "CPU" => Self::Cpu,
            other => {
                tracing::warn!(provider = other, "Unknown execution provider, using CPU");
                Self::Cpu
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TensorRt => "TensorRT",
            Self::Cuda => "CUDA",
            Self::Cpu => "CPU",
        }
    }

    fn fallback(self) -> Option<Self> {
        match self {
            Self::TensorRt => Some(Self::Cuda),
            Self::Cuda => Some(Self::Cpu),
            Self::Cpu => None,
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create a session for `model_path`, falling back to slower providers when
/// the preferred one cannot be initialized
pub fn create_session(
    model_path: &Path,
    settings: &ModelConfig,
) -> Result<(Session, ExecutionProvider)> {
    if !model_path.is_file() {
        bail!("Model file not found: {}", model_path.display());
    }

    let mut provider = ExecutionProvider::parse(&settings.execution_provider);
    loop {
        tracing::info!(model = %model_path.display(), %provider, "Creating ONNX session");
        match build_session(model_path, settings, provider) {
            Ok(session) => return Ok((session, provider)),
            Err(e) => match provider.fallback() {
                Some(next) => {
                    tracing::warn!(
                        model = %model_path.display(),
                        failed = %provider,
                        next = %next,
                        "Execution provider failed: {:#}",
                        e
                    );
                    provider = next;
                }
                None => return Err(e),
            },
        }
    }
}

fn build_session(
    model_path: &Path,
    settings: &ModelConfig,
    provider: ExecutionProvider,
) -> Result<Session> {
    let builder = Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(settings.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(settings.inter_threads)
        .context("Failed to set inter threads")?;

    let builder = match provider {
        ExecutionProvider::TensorRt => builder
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(settings.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(settings.device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ])
            .context("Failed to set execution providers")?,
        ExecutionProvider::Cuda => builder
            .with_execution_providers([
                CUDAExecutionProvider::default()
                    .with_device_id(settings.device_id)
                    .build(),
                CPUExecutionProvider::default().build(),
            ])
            .context("Failed to set execution providers")?,
        ExecutionProvider::Cpu => builder,
    };

    builder
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load model from {}", model_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(ExecutionProvider::parse("tensorrt"), ExecutionProvider::TensorRt);
        assert_eq!(ExecutionProvider::parse("CUDA"), ExecutionProvider::Cuda);
        assert_eq!(ExecutionProvider::parse(" cpu "), ExecutionProvider::Cpu);
        assert_eq!(ExecutionProvider::parse("metal"), ExecutionProvider::Cpu);
    }

    #[test]
    fn test_fallback_chain_ends_at_cpu() {
        assert_eq!(ExecutionProvider::TensorRt.fallback(), Some(ExecutionProvider::Cuda));
        assert_eq!(ExecutionProvider::Cuda.fallback(), Some(ExecutionProvider::Cpu));
        assert_eq!(ExecutionProvider::Cpu.fallback(), None);
    }

    #[test]
    fn test_missing_model_file() {
        let settings = ModelConfig::default();
        let err = create_session(Path::new("models/does_not_exist.onnx"), &settings).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
