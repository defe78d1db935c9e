//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{config::PipelineConfig, types::FillColor};
use anyhow::{Context, Result};

/// Convert CLI arguments to the pipeline configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `PipelineConfig` from CLI arguments
    ///
    /// Values from `--config` are loaded first; explicit flags override them.
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let mut config = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path).with_context(|| {
                format!("Failed to load configuration from {}", path.display())
            })?,
            None => PipelineConfig::default(),
        };

        if let Some(max_bytes) = cli.max_bytes {
            config.max_payload_bytes = max_bytes;
        }
        if let Some(max_dimension) = cli.max_dimension {
            config.max_dimension = max_dimension;
        }
        if let Some(quality) = cli.jpeg_quality {
            config.jpeg_quality = quality;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Parse the `--fill` flag
    pub(crate) fn fill_color(cli: &Cli) -> Result<Option<FillColor>> {
        cli.fill
            .as_deref()
            .map(str::parse::<FillColor>)
            .transpose()
            .context("Invalid --fill value")
    }

    /// Model input settings for the Tract backend
    #[cfg(feature = "tract")]
    pub(crate) fn preprocessing_config(
        cli: &Cli,
    ) -> Result<crate::utils::preprocessing::PreprocessingConfig> {
        let config = crate::utils::preprocessing::PreprocessingConfig {
            target_size: cli.model_size,
            ..Default::default()
        };
        config.validate().context("Invalid --model-size")?;
        Ok(config)
    }
}
