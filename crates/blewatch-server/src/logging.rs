//! Tracing setup for the server binary.
//!
//! [`LogMode::Production`] writes JSON to a daily file under [`log_directory`]
//! and compact lines to stdout for journald. [`LogMode::Development`] prints
//! pretty lines with span open and close events.
//!
//! The filter comes from `RUST_LOG` when set. Otherwise `BLEWATCH_LOG_LEVEL`
//! sets the level of the blewatch crates, and HTTP middleware stays at `warn`.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Level for the blewatch crates when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "BLEWATCH_LOG_LEVEL";

/// Selects [`LogMode::Production`] when set to `production`.
pub const ENVIRONMENT_ENV: &str = "BLEWATCH_ENV";

/// Filter used when neither `RUST_LOG` nor `BLEWATCH_LOG_LEVEL` is set.
pub const DEFAULT_DIRECTIVES: &str = "blewatch_core=info,blewatch_server=info,tower_http=warn";

const OWN_TARGETS: [&str; 2] = ["blewatch_core", "blewatch_server"];
const MIDDLEWARE_DIRECTIVE: &str = "tower_http=warn";

// Non-blocking writers flush on drop, so the guards live for the whole process.
static GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// Where and how log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Pretty stdout.
    Development,
    /// JSON files plus compact stdout.
    Production,
}

impl LogMode {
    /// Reads `BLEWATCH_ENV`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(ENVIRONMENT_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(env) if env.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Builds the filter directive string.
///
/// A non-empty `rust_log` is used verbatim. A non-empty `level` applies to
/// the blewatch crates only.
#[must_use]
pub fn filter_directives(rust_log: Option<&str>, level: Option<&str>) -> String {
    fn non_empty(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }

    if let Some(rust_log) = non_empty(rust_log) {
        return rust_log.to_string();
    }
    match non_empty(level) {
        Some(level) => OWN_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .chain(std::iter::once(MIDDLEWARE_DIRECTIVE.to_string()))
            .collect::<Vec<_>>()
            .join(","),
        None => DEFAULT_DIRECTIVES.to_string(),
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if the filter does not parse or, in production, the log
/// directory cannot be created.
pub fn init(mode: LogMode) -> anyhow::Result<()> {
    let directives = filter_directives(
        std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
    );
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{directives}'"))?;

    match mode {
        LogMode::Production => init_production(filter),
        LogMode::Development => {
            init_development(filter);
            Ok(())
        }
    }
}

fn init_production(filter: EnvFilter) -> anyhow::Result<()> {
    let log_dir = log_directory();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(RollingFileAppender::new(
        Rotation::DAILY,
        &log_dir,
        "blewatch.log",
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true);

    // journald adds its own timestamps.
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .without_time()
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = GUARDS.set(vec![file_guard, stdout_guard]);
    Ok(())
}

fn init_development(filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .init();
}

/// Directory for production log files.
#[must_use]
pub fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/blewatch")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "blewatch")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
