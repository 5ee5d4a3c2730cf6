//! Logging bootstrap and message hygiene.
//!
//! # Responsibility
//! - Initialize file-based rolling logs once per process.
//! - Keep log lines single-line and bounded.
//!
//! # Invariants
//! - Initialization is idempotent for identical settings.
//! - Re-initialization with different settings is rejected.
//! - Initialization never panics.
//!
//! The crate logs through the `log` facade whether or not this is called;
//! applications with their own logger never need it.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "repokit";
const MAX_MESSAGE_CHARS: usize = 200;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    settings: LogSettings,
    _logger: LoggerHandle,
}

/// File logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    /// Absolute directory for log files.
    pub dir: PathBuf,
    pub max_file_bytes: u64,
    pub kept_files: usize,
}

impl LogSettings {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: dir.into(),
            max_file_bytes: 10 * 1024 * 1024,
            kept_files: 5,
        }
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    fn normalized(&self) -> Result<Self, LoggingError> {
        if self.dir.as_os_str().is_empty() {
            return Err(LoggingError::InvalidDir("log dir cannot be empty".to_string()));
        }
        if !self.dir.is_absolute() {
            return Err(LoggingError::InvalidDir(format!(
                "log dir must be an absolute path, got `{}`",
                self.dir.display()
            )));
        }
        Ok(Self {
            level: normalize_level(&self.level)?.to_string(),
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDir(String),
    Conflict { active: String, requested: String },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDir(message) => f.write_str(message),
            Self::Conflict { active, requested } => write!(
                f,
                "logging already initialized with {active}; refusing to switch to {requested}"
            ),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
        }
    }
}

impl Error for LoggingError {}

/// Starts rolling file logs under `settings.dir`.
///
/// # Errors
/// - Unsupported level, relative or empty directory.
/// - Settings differing from an earlier successful call.
/// - Directory creation or logger backend failure.
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let requested = settings.normalized()?;

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, LoggingError> {
        std::fs::create_dir_all(&requested.dir).map_err(|err| {
            LoggingError::InvalidDir(format!(
                "failed to create log directory `{}`: {err}",
                requested.dir.display()
            ))
        })?;

        let logger = Logger::try_with_str(&requested.level)
            .map_err(|err| LoggingError::Backend(err.to_string()))?
            .log_to_file(
                FileSpec::default()
                    .directory(requested.dir.as_path())
                    .basename(LOG_FILE_BASENAME),
            )
            .rotate(
                Criterion::Size(requested.max_file_bytes),
                Naming::Numbers,
                Cleanup::KeepLogFiles(requested.kept_files),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            .format_for_files(flexi_logger::detailed_format)
            .start()
            .map_err(|err| LoggingError::Backend(err.to_string()))?;

        info!(
            "event=logging_init module=logging status=ok level={} log_dir={} version={}",
            requested.level,
            requested.dir.display(),
            env!("CARGO_PKG_VERSION")
        );
        Ok(LoggingState {
            settings: requested.clone(),
            _logger: logger,
        })
    })?;

    if state.settings != requested {
        return Err(LoggingError::Conflict {
            active: describe(&state.settings),
            requested: describe(&requested),
        });
    }
    Ok(())
}

/// Active settings, or `None` before a successful `init_logging`.
pub fn logging_status() -> Option<LogSettings> {
    LOGGING_STATE.get().map(|state| state.settings.clone())
}

/// `debug` for debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Single-line, length-capped rendering of a message that may carry
/// database or user text.
pub fn sanitize_message(value: &str) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(MAX_MESSAGE_CHARS).collect::<String>();
    if normalized.chars().count() > MAX_MESSAGE_CHARS {
        truncated.push_str("...");
    }
    truncated
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn describe(settings: &LogSettings) -> String {
    format!("level `{}` at `{}`", settings.level, settings.dir.display())
}
