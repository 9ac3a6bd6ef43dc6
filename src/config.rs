//! Job and pipeline configuration from the environment.
//!
//! A JSON file named by `DECAY_JOIN_CONFIG` (a serialized `PipelineConfig`)
//! provides the base; individual variables override parts of it.

use std::env;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate};

use crate::counter::CatalogSpec;
use crate::error::PipelineError;
use crate::interval::Interval;
use crate::pipeline::{cross_stages, PipelineConfig};
use crate::reducer::UnknownEventPolicy;

pub const CONFIG_PATH_VAR: &str = "DECAY_JOIN_CONFIG";
pub const KEY_SETS_VAR: &str = "DECAY_JOIN_KEY_SETS";
pub const DELAYS_VAR: &str = "DECAY_JOIN_DELAYS";
pub const DECAY_WINDOWS_VAR: &str = "DECAY_JOIN_DECAY_WINDOWS";
pub const UNKNOWN_EVENTS_VAR: &str = "DECAY_JOIN_UNKNOWN_EVENTS";
pub const TARGET_START_VAR: &str = "DECAY_JOIN_TARGET_START";
pub const REQUIRED_FIELD_VAR: &str = "DECAY_JOIN_REQUIRED_FIELD";
pub const INPUT_VAR: &str = "DECAY_JOIN_INPUT";
pub const OUTPUT_VAR: &str = "DECAY_JOIN_OUTPUT";
pub const OUTPUT_COLUMNS_VAR: &str = "DECAY_JOIN_OUTPUT_COLUMNS";

const DEFAULT_OUTPUT_COLUMNS: [&str; 3] = ["hostId", "memberId", "livestreamId"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub output_columns: Vec<String>,
}

pub fn pipeline_config_from_env() -> Result<PipelineConfig, PipelineError> {
    pipeline_config_from_vars(|name| env::var(name).ok())
}

pub fn job_config_from_env() -> Result<JobConfig, PipelineError> {
    job_config_from_vars(|name| env::var(name).ok())
}

pub fn pipeline_config_from_vars<F>(lookup: F) -> Result<PipelineConfig, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

    let mut config = match var(CONFIG_PATH_VAR) {
        Some(path) => {
            let raw = fs::read_to_string(path.trim()).map_err(|err| {
                PipelineError::InvalidConfig(format!("cannot read {}: {err}", path.trim()))
            })?;
            serde_json::from_str(&raw).map_err(|err| {
                PipelineError::InvalidConfig(format!("cannot parse {}: {err}", path.trim()))
            })?
        }
        None => PipelineConfig::default(),
    };

    let key_sets_override = var(KEY_SETS_VAR).map(|raw| parse_key_sets(&raw)).transpose()?;
    let delays_override = var(DELAYS_VAR)
        .map(|raw| parse_intervals(DELAYS_VAR, &raw))
        .transpose()?;
    if key_sets_override.is_some() || delays_override.is_some() {
        let key_sets = key_sets_override.unwrap_or_else(|| configured_key_sets(&config));
        let delays = delays_override.unwrap_or_else(|| configured_delays(&config));
        config.stages = cross_stages(&key_sets, &delays);
    }

    if let Some(raw) = var(DECAY_WINDOWS_VAR) {
        config.catalog = CatalogSpec::with_windows(&parse_intervals(DECAY_WINDOWS_VAR, &raw)?);
    }

    if let Some(raw) = var(UNKNOWN_EVENTS_VAR) {
        config.unknown_events = parse_unknown_events(&raw)?;
    }

    if let Some(raw) = var(TARGET_START_VAR) {
        config.target_start_ms = Some(parse_target_start(&raw)?);
    }

    if let Some(raw) = lookup(REQUIRED_FIELD_VAR) {
        let trimmed = raw.trim();
        config.required_ingest_field = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    Ok(config)
}

pub fn job_config_from_vars<F>(lookup: F) -> Result<JobConfig, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| {
        lookup(name)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };

    let input = var(INPUT_VAR)
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::InvalidConfig(format!("{INPUT_VAR} must be set")))?;
    let output = var(OUTPUT_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("features.jsonl"));
    let output_columns = match var(OUTPUT_COLUMNS_VAR) {
        Some(raw) => split_list(&raw, ','),
        None => DEFAULT_OUTPUT_COLUMNS
            .iter()
            .map(|column| column.to_string())
            .collect(),
    };

    Ok(JobConfig {
        input,
        output,
        output_columns,
    })
}

fn parse_key_sets(raw: &str) -> Result<Vec<Vec<String>>, PipelineError> {
    let key_sets: Vec<Vec<String>> = raw
        .split(';')
        .map(|group| split_list(group, ','))
        .filter(|keys| !keys.is_empty())
        .collect();
    if key_sets.is_empty() {
        return Err(PipelineError::InvalidConfig(format!(
            "{KEY_SETS_VAR} has no key sets"
        )));
    }
    Ok(key_sets)
}

fn parse_intervals(var: &str, raw: &str) -> Result<Vec<Interval>, PipelineError> {
    split_list(raw, ',')
        .iter()
        .map(|part| {
            part.parse::<Interval>()
                .map_err(|err| PipelineError::InvalidConfig(format!("{var}: {err}")))
        })
        .collect()
}

fn parse_unknown_events(raw: &str) -> Result<UnknownEventPolicy, PipelineError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(UnknownEventPolicy::Strict),
        "pass_through" | "passthrough" => Ok(UnknownEventPolicy::PassThrough),
        other => Err(PipelineError::InvalidConfig(format!(
            "{UNKNOWN_EVENTS_VAR}: unknown policy {other}"
        ))),
    }
}

fn parse_target_start(raw: &str) -> Result<i64, PipelineError> {
    let trimmed = raw.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.timestamp_millis());
    }
    Err(PipelineError::InvalidConfig(format!(
        "{TARGET_START_VAR}: cannot parse {trimmed}"
    )))
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn configured_key_sets(config: &PipelineConfig) -> Vec<Vec<String>> {
    let mut key_sets: Vec<Vec<String>> = Vec::new();
    for stage in &config.stages {
        if !key_sets.contains(&stage.keys) {
            key_sets.push(stage.keys.clone());
        }
    }
    key_sets
}

fn configured_delays(config: &PipelineConfig) -> Vec<Interval> {
    let mut delays = Vec::new();
    for stage in &config.stages {
        if !delays.contains(&stage.delay) {
            delays.push(stage.delay);
        }
    }
    delays
}
