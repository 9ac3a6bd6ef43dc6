//! Logging setup for the batch job.
//!
//! Logs go to stderr so a job writing its dataset to stdout stays clean.

use std::env;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_VAR: &str = "DECAY_JOIN_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "DECAY_JOIN_LOG_FORMAT";
pub const LOG_TARGET_VAR: &str = "DECAY_JOIN_LOG_TARGET";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_target: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_vars(|name| env::var(name).ok())
}

pub fn logging_config_from_vars<F>(lookup: F) -> LoggingConfig
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = LoggingConfig::default();

    let level = lookup(LOG_LEVEL_VAR)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or(defaults.level);
    let format = lookup(LOG_FORMAT_VAR)
        .and_then(|raw| parse_log_format(&raw))
        .unwrap_or(defaults.format);
    let include_target = lookup(LOG_TARGET_VAR)
        .and_then(|raw| parse_bool(&raw))
        .unwrap_or(defaults.include_target);

    LoggingConfig {
        level,
        format,
        include_target,
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(builder.json().with_ansi(false).finish())?
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "decay_join",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format
    );
}

pub fn log_job_config(input: &Path, output: &Path, stages: usize, counters: usize) {
    info!(
        component = "decay_join",
        event = "app.config",
        input = %input.display(),
        output = %output.display(),
        stages,
        counters
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
