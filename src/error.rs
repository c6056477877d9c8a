//! Custom diagnostic error types for rich error reporting via miette.

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while supervising a single service.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("service '{name}' is not defined")]
    #[diagnostic(code(shepherd::service::not_found))]
    NotFound {
        name: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("service '{name}' exited during startup with code {code}")]
    #[diagnostic(
        code(shepherd::service::startup_failed),
        help("check the service log for the failure; nothing was retried")
    )]
    StartupFailed { name: String, code: i32 },

    #[error("service '{name}' did not write pidfile {} within {timeout_secs}s", path.display())]
    #[diagnostic(
        code(shepherd::service::pidfile_timeout),
        help("raise pidfile_timeout in shepherd.toml or fix the service's pidfile path")
    )]
    PidfileTimeout {
        name: String,
        path: PathBuf,
        timeout_secs: u64,
    },

    #[error("failed to spawn service '{name}'")]
    #[diagnostic(code(shepherd::service::spawn_failed))]
    SpawnFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("service '{name}' is already running with pid {pid}")]
    #[diagnostic(
        code(shepherd::service::already_running),
        help("pass --force to restart it")
    )]
    AlreadyRunning { name: String, pid: u32 },

    #[error("service '{name}' is not running")]
    #[diagnostic(code(shepherd::service::not_running))]
    NotRunning { name: String },

    #[error("service '{name}' is disabled")]
    #[diagnostic(
        code(shepherd::service::disabled),
        help("enable it first, or pass --force / --enable to start")
    )]
    Disabled { name: String },

    #[error("failed to stop service '{name}': {error}")]
    #[diagnostic(
        code(shepherd::service::stop_failed),
        help("the process may be stuck or require manual intervention. Try: kill -9 <pid>")
    )]
    StopFailed { name: String, error: String },
}

/// Collected failures from a best-effort batch operation. Every service in
/// the batch was attempted before this is returned.
#[derive(Debug, Error, Diagnostic)]
#[error("{} of {attempted} services failed: {}", errors.len(), summaries.join("; "))]
#[diagnostic(code(shepherd::service::batch_failed))]
pub struct BatchError {
    pub attempted: usize,
    pub summaries: Vec<String>,
    #[related]
    pub errors: Vec<Box<dyn Diagnostic + Send + Sync + 'static>>,
}

impl BatchError {
    pub fn new(attempted: usize, errors: Vec<miette::Report>) -> Self {
        Self {
            attempted,
            summaries: errors.iter().map(|e| e.to_string()).collect(),
            errors: errors
                .into_iter()
                .map(|e| Box::from(e) as Box<dyn Diagnostic + Send + Sync>)
                .collect(),
        }
    }
}

/// Error for TOML configuration parse failures with source code highlighting.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to parse configuration")]
#[diagnostic(code(shepherd::config::parse_error))]
pub struct ConfigParseError {
    #[source_code]
    pub src: NamedSource<String>,

    #[label("{message}")]
    pub span: SourceSpan,

    pub message: String,

    #[help]
    pub help: Option<String>,
}

impl ConfigParseError {
    pub fn from_toml_error(path: &std::path::Path, contents: String, err: toml::de::Error) -> Self {
        let message = err.message().to_string();
        let span = err
            .span()
            .map(|r| SourceSpan::from(r.start..r.end))
            .unwrap_or_else(|| SourceSpan::from(0..0));

        Self {
            src: NamedSource::new(path.display().to_string(), contents),
            span,
            message,
            help: Some("check TOML syntax at https://toml.io".to_string()),
        }
    }
}

/// Errors related to file operations (config and state files).
#[derive(Debug, Error, Diagnostic)]
pub enum FileError {
    #[error("failed to read file: {}", path.display())]
    #[diagnostic(code(shepherd::file::read_error))]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file: {}", path.display())]
    #[diagnostic(code(shepherd::file::write_error))]
    WriteError {
        path: PathBuf,
        #[help]
        details: Option<String>,
    },
}

/// Find the most similar service name for suggestions.
pub fn find_similar_service<'a>(
    name: &str,
    available: impl Iterator<Item = &'a str>,
) -> Option<String> {
    use fuzzy_matcher::FuzzyMatcher;
    use fuzzy_matcher::skim::SkimMatcherV2;

    let matcher = SkimMatcherV2::default();
    available
        .filter_map(|candidate| {
            matcher
                .fuzzy_match(candidate, name)
                .map(|score| (candidate, score))
        })
        .max_by_key(|(_, score)| *score)
        .filter(|(_, score)| *score > 0)
        .map(|(candidate, _)| format!("did you mean '{candidate}'?"))
}
