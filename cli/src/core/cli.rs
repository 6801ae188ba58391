use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::constants::{
    DEFAULT_PREVIEW_LIMIT, ENV_API_URL, ENV_CONFIG, ENV_DEBUG, ENV_TOKEN, ENV_USER_ID,
};

#[derive(Parser)]
#[command(name = "tabpreview")]
#[command(
    version,
    about = "Upload a tabular file and preview the dataset derived from it",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend base URL (e.g. http://localhost:8080/api)
    #[arg(long, short = 'u', global = true, env = ENV_API_URL)]
    pub api_url: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, global = true, env = ENV_TOKEN, hide_env_values = true)]
    pub token: Option<String>,

    /// User id sent as the userId query parameter
    #[arg(long, global = true, env = ENV_USER_ID)]
    pub user_id: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Overall deadline of a preview run in seconds
    #[arg(long, global = true, value_parser = parse_positive_secs)]
    pub timeout: Option<u64>,

    /// Skip reading column validation summaries after the dataset is found
    #[arg(long, global = true)]
    pub skip_validation: bool,

    /// Print per-endpoint request statistics when done
    #[arg(long, global = true)]
    pub stats: bool,
}

/// Parse a strictly positive number of seconds
fn parse_positive_secs(s: &str) -> Result<u64, String> {
    match s.trim().parse::<u64>() {
        Ok(0) => Err("Timeout must be greater than 0".to_string()),
        Ok(secs) => Ok(secs),
        Err(_) => Err(format!("Invalid number of seconds '{}'", s)),
    }
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Upload a file, wait for its dataset and print a preview
    Preview {
        /// CSV or spreadsheet to upload
        file: PathBuf,

        /// Description stored with the upload
        #[arg(long, short = 'd')]
        description: Option<String>,

        /// Print the preview as JSON
        #[arg(long)]
        json: bool,

        /// Rows shown in table output
        #[arg(long, short = 'n', default_value_t = DEFAULT_PREVIEW_LIMIT)]
        limit: usize,
    },
    /// Show the processing status of an uploaded file
    Status {
        /// File id returned by the upload
        file_id: String,

        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one page of an existing dataset
    Rows {
        /// Dataset id
        dataset_id: String,

        /// Page number (0-based)
        #[arg(long, default_value_t = 0)]
        page: u32,

        /// Page size (defaults to pipeline.page_size)
        #[arg(long)]
        size: Option<u32>,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,

        /// Rows shown in table output
        #[arg(long, short = 'n', default_value_t = DEFAULT_PREVIEW_LIMIT)]
        limit: usize,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub skip_validation: bool,
    pub stats: bool,
}

impl From<&Cli> for CliConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            api_url: cli.api_url.clone(),
            token: cli.token.clone(),
            user_id: cli.user_id.clone(),
            debug: cli.debug,
            config: cli.config.clone(),
            timeout: cli.timeout,
            skip_validation: cli.skip_validation,
            stats: cli.stats,
        }
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig::from(&cli);
    (config, cli.command)
}
