//! CLI command implementations.

pub mod check;
pub mod init;
pub mod inspect;
pub mod run;

use budgetsync_engine::{AnalyticalConnector, HttpConnector, ReqwestClient};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the CLI before the engine takes over.
#[derive(Error, Debug)]
pub enum CliError {
    /// A required argument was not given on the command line or in the
    /// environment.
    #[error("missing required argument {0}")]
    MissingArgument(&'static str),

    /// The HTTP client could not be built.
    #[error("cannot create HTTP client: {0}")]
    HttpClient(String),
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// The secondary store selected by `--target`.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// An HTTP gateway exposing `/rpc/{procedure}` endpoints.
    Http {
        /// Gateway base URL.
        url: String,
        /// API key sent with every request.
        api_key: Option<String>,
        /// Per-request timeout.
        timeout: Duration,
    },
    /// A local SQLite analytical database.
    Sqlite(PathBuf),
}

impl Target {
    /// `http://` and `https://` values select the gateway; anything else is
    /// a file path.
    pub fn parse(spec: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let trimmed = spec.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Target::Http {
                url: trimmed.to_string(),
                api_key,
                timeout,
            }
        } else {
            Target::Sqlite(PathBuf::from(trimmed))
        }
    }

    /// Short description for logs and reports. Never includes the API key.
    pub fn describe(&self) -> String {
        match self {
            Target::Http { url, .. } => url.clone(),
            Target::Sqlite(path) => path.display().to_string(),
        }
    }

    pub(crate) fn http_connector(
        url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<HttpConnector<ReqwestClient>, CliError> {
        let client = ReqwestClient::new(timeout, api_key).map_err(CliError::HttpClient)?;
        Ok(HttpConnector::new(url, client))
    }

    pub(crate) fn sqlite_connector(path: &Path) -> AnalyticalConnector {
        AnalyticalConnector::new(path)
    }
}
