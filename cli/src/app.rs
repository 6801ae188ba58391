//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};
use tabpreview::{
    EndpointStats, FanoutSink, HttpBackend, IngestBackend, InstrumentedBackend, MetricsSink,
    PipelineError, PipelineOrchestrator, PreviewAssembler, PreviewResult, TracingSink,
};

use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG, EXIT_CANCELLED};
use crate::core::render::{self, ProgressReporter};
use crate::core::shutdown::ShutdownService;
use crate::utils::file::read_upload;
use crate::utils::terminal::{terminal_link, warning};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub stats: Arc<EndpointStats>,
    backend: Arc<dyn IngestBackend>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.debug);

        tracing::debug!("Application starting");
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config)?;

        // Install signal handlers FIRST (before any network calls)
        app.shutdown.install_signal_handlers();

        let result = app.execute(command).await;
        if cli_config.stats {
            eprint!("\n{}", render::format_stats(&app.stats.snapshot()));
        }
        print!("{}", result?);
        Ok(())
    }

    /// Load configuration and build the instrumented backend
    pub fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let http = HttpBackend::new(config.backend_config())
            .context("Failed to initialize HTTP client")?;
        let stats = Arc::new(EndpointStats::new());
        let backend: Arc<dyn IngestBackend> =
            Arc::new(InstrumentedBackend::new(Arc::new(http), stats.clone()));

        tracing::debug!(
            base_url = %config.api.base_url,
            authenticated = config.api.token.is_some(),
            "Backend initialized"
        );

        Ok(Self {
            shutdown: ShutdownService::new(),
            config,
            stats,
            backend,
        })
    }

    /// Execute one command, returning what goes to stdout
    pub async fn execute(&self, command: Commands) -> Result<String> {
        let cancel = self.shutdown.cancellation_token();
        match command {
            Commands::Preview {
                file,
                description,
                json,
                limit,
            } => {
                let payload = read_upload(&file)?;
                let preview = self
                    .pipeline()
                    .run(payload, description, cancel)
                    .await
                    .with_context(|| format!("Preview of {} failed", file.display()))?;
                self.report_preview(&preview);
                Self::output_preview(&preview, json, limit)
            }
            Commands::Status { file_id, json } => {
                let report = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled.into()),
                    report = self.backend.file_status(&file_id) => report
                        .with_context(|| format!("Failed to fetch status of file {}", file_id))?,
                };
                if json {
                    let mut value = serde_json::to_value(&report)?;
                    if let serde_json::Value::Object(map) = &mut value {
                        map.insert("fileId".into(), serde_json::Value::String(file_id));
                    }
                    Ok(format!("{}\n", serde_json::to_string_pretty(&value)?))
                } else {
                    Ok(render::format_status(&file_id, &report))
                }
            }
            Commands::Rows {
                dataset_id,
                page,
                size,
                json,
                limit,
            } => {
                let size = size.unwrap_or(self.config.pipeline.page_size);
                let assembler = PreviewAssembler::new(self.backend.clone());
                let preview = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled.into()),
                    preview = assembler.assemble(&dataset_id, page, size) => preview?,
                };
                Self::output_preview(&preview, json, limit)
            }
        }
    }

    fn pipeline(&self) -> PipelineOrchestrator {
        let mut sink = FanoutSink::new().with(Arc::new(ProgressReporter));
        if self.config.debug {
            sink = sink.with(Arc::new(TracingSink));
        }
        let sink: Arc<dyn MetricsSink> = Arc::new(sink);
        PipelineOrchestrator::new(self.backend.clone(), self.config.pipeline, sink)
    }

    /// Status lines printed to stderr once a preview is ready
    fn report_preview(&self, preview: &PreviewResult) {
        if let Some(degraded) = &preview.degraded {
            eprintln!("{}", warning(&render::format_degraded(degraded)));
        }
        eprintln!(
            "Rows: {}",
            terminal_link(&self.rows_url(&preview.dataset_id, preview.current_page))
        );
    }

    fn output_preview(preview: &PreviewResult, json: bool, limit: usize) -> Result<String> {
        if json {
            Ok(format!("{}\n", serde_json::to_string_pretty(preview)?))
        } else {
            Ok(render::format_preview(preview, limit))
        }
    }

    /// Backend URL of one page of a dataset's rows
    pub fn rows_url(&self, dataset_id: &str, page: u32) -> String {
        format!(
            "{}/datasets/{}/rows?page={}&size={}",
            self.config.api.base_url.trim().trim_end_matches('/'),
            dataset_id,
            page,
            self.config.pipeline.page_size
        )
    }

    fn init_logging(debug: bool) {
        let default_filter = if debug {
            format!("debug,{}=debug", APP_NAME_LOWER)
        } else {
            format!("warn,{}=info,{}_cli=info", APP_NAME_LOWER, APP_NAME_LOWER)
        };

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}

/// Process exit status for a failed run
pub fn exit_code(error: &anyhow::Error) -> i32 {
    let cancelled = error.chain().any(|cause| {
        cause
            .downcast_ref::<PipelineError>()
            .is_some_and(PipelineError::is_cancelled)
    });
    if cancelled { EXIT_CANCELLED } else { 1 }
}
