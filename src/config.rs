//! Runtime configuration: where documents come from and how to log.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use reqwest::Url;

use crate::error::ConfigError;

/// Default request timeout for the hosted document service.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Number of distinct document contents whose TOC is memoized by the server.
pub const TOC_CACHE_CAPACITY: usize = 256;

/// Document source flags shared by every subcommand that reads documents.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Directory of markdown documents (with optional YAML front matter)
    #[arg(long, env = "DOCVIEW_DIR")]
    pub dir: Option<PathBuf>,

    /// Base URL of the hosted document service (PostgREST / Supabase)
    #[arg(long, env = "DOCVIEW_API_URL")]
    pub api_url: Option<String>,

    /// API key sent as `apikey` and bearer token
    #[arg(long, env = "DOCVIEW_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Request timeout in seconds for the hosted document service
    #[arg(long, env = "DOCVIEW_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

/// A validated document source selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Directory {
        root: PathBuf,
    },
    Rest {
        base_url: Url,
        api_key: String,
        timeout: Duration,
    },
}

impl SourceArgs {
    /// Validate the flags into exactly one [`SourceConfig`].
    pub fn resolve(&self) -> Result<SourceConfig, ConfigError> {
        match (&self.dir, &self.api_url) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingSources),
            (None, None) => Err(ConfigError::MissingSource),
            (Some(dir), None) => {
                if !dir.is_dir() {
                    return Err(ConfigError::MissingDirectory(dir.clone()));
                }
                Ok(SourceConfig::Directory { root: dir.clone() })
            }
            (None, Some(url)) => {
                let api_key = self
                    .api_key
                    .as_deref()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or(ConfigError::MissingApiKey)?;
                let base_url = parse_base_url(url)?;
                Ok(SourceConfig::Rest {
                    base_url,
                    api_key: api_key.to_owned(),
                    timeout: Duration::from_secs(self.timeout_secs.max(1)),
                })
            }
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidApiUrl {
        url: raw.to_owned(),
        reason: reason.to_owned(),
    };
    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL"));
    }
    Ok(url)
}

/// Environment variable naming the terminal viewer's log file.
pub const VIEW_LOG_FILE_ENV: &str = "DOCVIEW_LOG_FILE";

fn log_builder(default_filter: &str) -> env_logger::Builder {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp(None).format_target(false);
    builder
}

/// Initialise `env_logger` on stderr, honouring `RUST_LOG` over `default_filter`.
pub fn init_logging(default_filter: &str) {
    let _ = log_builder(default_filter).try_init();
}

/// Where the terminal viewer logs: `$DOCVIEW_LOG_FILE`, else a file in the
/// system temp directory.
pub fn view_log_path() -> PathBuf {
    std::env::var_os(VIEW_LOG_FILE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("docview-view.log"))
}

/// Initialise `env_logger` appending to `path` instead of stderr.
///
/// The terminal viewer draws on the alternate screen, so nothing may be
/// written to the terminal while it runs. When the file cannot be opened no
/// logger is installed.
pub fn init_file_logging(default_filter: &str, path: &Path) {
    if let Ok(file) = open_log_file(path) {
        let _ = log_builder(default_filter)
            .target(env_logger::Target::Pipe(Box::new(file)))
            .try_init();
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
