use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tabpreview::{DiscoveryConfig, HttpBackendConfig, PipelineConfig, PollConfig};

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::utils::file::expand_path;

// =============================================================================
// File configuration (JSON, every field optional)
// =============================================================================

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ApiFileConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PollFileConfig {
    pub max_attempts: Option<u32>,
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DiscoveryFileConfig {
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub repair_delay_ms: Option<u64>,
    pub inspect_validation: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PipelineFileConfig {
    pub poll: Option<PollFileConfig>,
    pub settle_delay_ms: Option<u64>,
    pub discovery: Option<DiscoveryFileConfig>,
    pub overall_timeout_ms: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    pub page_size: Option<u32>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub api: Option<ApiFileConfig>,
    pub pipeline: Option<PipelineFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Overwrite `$target` with `$value` when the latter is set
macro_rules! merge_field {
    ($target:expr, $value:expr, $name:literal) => {
        if $value.is_some() {
            tracing::trace!(value = ?$value, concat!("Merging ", $name));
            $target = $value;
        }
    };
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Names of top-level fields this version does not know
    fn unknown_fields(&self) -> Vec<String> {
        match &self.extra {
            serde_json::Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        let unknown = self.unknown_fields();
        if !unknown.is_empty() {
            tracing::warn!(
                fields = %unknown.join(", "),
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(api) = other.api {
            let current = self.api.get_or_insert_with(ApiFileConfig::default);
            merge_field!(current.base_url, api.base_url, "api.base_url");
            if api.token.is_some() {
                tracing::trace!("Merging api.token");
                current.token = api.token;
            }
            merge_field!(current.user_id, api.user_id, "api.user_id");
            merge_field!(
                current.request_timeout_secs,
                api.request_timeout_secs,
                "api.request_timeout_secs"
            );
        }

        if let Some(pipeline) = other.pipeline {
            let current = self
                .pipeline
                .get_or_insert_with(PipelineFileConfig::default);

            if let Some(poll) = pipeline.poll {
                let current_poll = current.poll.get_or_insert_with(PollFileConfig::default);
                merge_field!(
                    current_poll.max_attempts,
                    poll.max_attempts,
                    "pipeline.poll.max_attempts"
                );
                merge_field!(
                    current_poll.interval_ms,
                    poll.interval_ms,
                    "pipeline.poll.interval_ms"
                );
            }

            if let Some(discovery) = pipeline.discovery {
                let current_discovery = current
                    .discovery
                    .get_or_insert_with(DiscoveryFileConfig::default);
                merge_field!(
                    current_discovery.max_attempts,
                    discovery.max_attempts,
                    "pipeline.discovery.max_attempts"
                );
                merge_field!(
                    current_discovery.retry_delay_ms,
                    discovery.retry_delay_ms,
                    "pipeline.discovery.retry_delay_ms"
                );
                merge_field!(
                    current_discovery.repair_delay_ms,
                    discovery.repair_delay_ms,
                    "pipeline.discovery.repair_delay_ms"
                );
                merge_field!(
                    current_discovery.inspect_validation,
                    discovery.inspect_validation,
                    "pipeline.discovery.inspect_validation"
                );
            }

            merge_field!(
                current.settle_delay_ms,
                pipeline.settle_delay_ms,
                "pipeline.settle_delay_ms"
            );
            merge_field!(
                current.overall_timeout_ms,
                pipeline.overall_timeout_ms,
                "pipeline.overall_timeout_ms"
            );
            merge_field!(
                current.upload_timeout_secs,
                pipeline.upload_timeout_secs,
                "pipeline.upload_timeout_secs"
            );
            merge_field!(current.page_size, pipeline.page_size, "pipeline.page_size");
        }

        merge_field!(self.debug, other.debug, "debug");
    }
}

// =============================================================================
// Resolved configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub request_timeout: Duration,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub pipeline: PipelineConfig,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.tabpreview/tabpreview.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let config = Self::resolve(cli, file_config);
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, file values and CLI/env overrides
    fn resolve(cli: &CliConfig, file_config: FileConfig) -> Self {
        let file_api = file_config.api.unwrap_or_default();
        let file_pipeline = file_config.pipeline.unwrap_or_default();
        let file_poll = file_pipeline.poll.unwrap_or_default();
        let file_discovery = file_pipeline.discovery.unwrap_or_default();

        let api = ApiConfig {
            base_url: cli
                .api_url
                .clone()
                .or(file_api.base_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: cli.token.clone().or(file_api.token).filter(|t| !t.is_empty()),
            user_id: cli
                .user_id
                .clone()
                .or(file_api.user_id)
                .filter(|u| !u.is_empty()),
            request_timeout: Duration::from_secs(
                file_api
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        };

        let defaults = PipelineConfig::default();
        let ms = Duration::from_millis;
        let pipeline = PipelineConfig {
            poll: PollConfig {
                max_attempts: file_poll.max_attempts.unwrap_or(defaults.poll.max_attempts),
                interval: file_poll.interval_ms.map(ms).unwrap_or(defaults.poll.interval),
            },
            settle_delay: file_pipeline
                .settle_delay_ms
                .map(ms)
                .unwrap_or(defaults.settle_delay),
            discovery: DiscoveryConfig {
                max_attempts: file_discovery
                    .max_attempts
                    .unwrap_or(defaults.discovery.max_attempts),
                retry_delay: file_discovery
                    .retry_delay_ms
                    .map(ms)
                    .unwrap_or(defaults.discovery.retry_delay),
                repair_delay: file_discovery
                    .repair_delay_ms
                    .map(ms)
                    .unwrap_or(defaults.discovery.repair_delay),
                inspect_validation: !cli.skip_validation
                    && file_discovery
                        .inspect_validation
                        .unwrap_or(defaults.discovery.inspect_validation),
            },
            overall_timeout: cli
                .timeout
                .map(Duration::from_secs)
                .or(file_pipeline.overall_timeout_ms.map(ms))
                .unwrap_or(defaults.overall_timeout),
            upload_timeout: file_pipeline
                .upload_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_timeout),
            page: defaults.page,
            page_size: file_pipeline.page_size.unwrap_or(defaults.page_size),
        };

        let debug = cli.debug || file_config.debug.unwrap_or(false);

        Self {
            api,
            pipeline,
            debug,
        }
    }

    fn validate(&self) -> Result<()> {
        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            anyhow::bail!("Configuration error: api.base_url must not be empty");
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!(
                "Configuration error: api.base_url must start with http:// or https:// (got '{}')",
                base_url
            );
        }
        if self.pipeline.poll.max_attempts == 0 {
            anyhow::bail!("Configuration error: pipeline.poll.max_attempts must be greater than 0");
        }
        if self.pipeline.discovery.max_attempts == 0 {
            anyhow::bail!(
                "Configuration error: pipeline.discovery.max_attempts must be greater than 0"
            );
        }
        if self.pipeline.page_size == 0 {
            anyhow::bail!("Configuration error: pipeline.page_size must be greater than 0");
        }
        if self.pipeline.overall_timeout.is_zero() {
            anyhow::bail!(
                "Configuration error: pipeline.overall_timeout_ms must be greater than 0"
            );
        }

        let poll_budget = self.pipeline.poll.interval * self.pipeline.poll.max_attempts;
        if poll_budget > self.pipeline.overall_timeout {
            tracing::warn!(
                poll_budget_ms = poll_budget.as_millis() as u64,
                overall_timeout_ms = self.pipeline.overall_timeout.as_millis() as u64,
                "Polling budget exceeds the overall timeout; slow files will hit the deadline first"
            );
        }

        Ok(())
    }

    /// Settings for the HTTP backend
    pub fn backend_config(&self) -> HttpBackendConfig {
        let mut config = HttpBackendConfig::new(self.api.base_url.trim());
        if let Some(token) = &self.api.token {
            config = config.with_token(token.clone());
        }
        if let Some(user_id) = &self.api.user_id {
            config = config.with_user_id(user_id.clone());
        }
        config.request_timeout = self.api.request_timeout;
        config.upload_timeout = self.pipeline.upload_timeout;
        config
    }
}

fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
