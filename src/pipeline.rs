//! Multi-stage composition of pass reducers.
//!
//! Stages run strictly in order. Each stage regroups the previous stage's
//! entire output by its own key set, so source records keep flowing (with
//! every delay applied so far) and targets collect one feature block per
//! stage. After the last stage only targets are kept.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::counter::CatalogSpec;
use crate::error::PipelineError;
use crate::event::Event;
use crate::grouping::{GroupingKeyError, GroupingKeyExtractor};
use crate::interval::Interval;
use crate::reducer::{EventSink, PassReducer, PassReport, StageConfig, UnknownEventPolicy};

pub const REFERENCE_KEY_SETS: [&[&str]; 4] = [
    &["hostId"],
    &["memberId"],
    &["livestreamId"],
    &["hostId", "memberId"],
];

pub const REFERENCE_INGEST_FIELD: &str = "livestreamId";

pub const REFERENCE_DELAYS: [Interval; 3] = [
    Interval::from_minutes(1),
    Interval::from_hours(1),
    Interval::from_hours(24),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stages: Vec<StageConfig>,
    pub catalog: CatalogSpec,
    pub unknown_events: UnknownEventPolicy,
    pub target_start_ms: Option<i64>,
    pub required_ingest_field: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let key_sets: Vec<Vec<String>> = REFERENCE_KEY_SETS
            .iter()
            .map(|keys| keys.iter().map(|key| key.to_string()).collect())
            .collect();
        Self {
            stages: cross_stages(&key_sets, &REFERENCE_DELAYS),
            catalog: CatalogSpec::default(),
            unknown_events: UnknownEventPolicy::Strict,
            target_start_ms: None,
            required_ingest_field: Some(REFERENCE_INGEST_FIELD.to_string()),
        }
    }
}

pub fn cross_stages(key_sets: &[Vec<String>], delays: &[Interval]) -> Vec<StageConfig> {
    key_sets
        .iter()
        .flat_map(|keys| {
            delays
                .iter()
                .map(move |delay| StageConfig::new(keys.iter().cloned(), *delay))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage_index: usize,
    pub feature_prefix: String,
    pub groups: u64,
    pub input_records: u64,
    pub output_records: u64,
    pub pass: PassReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub ingested: u64,
    pub ingest_filtered: u64,
    pub stages: Vec<StageReport>,
    pub output_targets: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: Event) {}
}

#[derive(Debug, Clone)]
pub struct PipelineComposer {
    config: PipelineConfig,
}

impl PipelineComposer {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        validate_config(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.config
            .stages
            .iter()
            .flat_map(|stage| stage.feature_names(&self.config.catalog))
            .collect()
    }

    pub fn reducer<'a>(&'a self, stage: &'a StageConfig) -> PassReducer<'a> {
        PassReducer::new(stage, &self.config.catalog)
            .with_unknown_events(self.config.unknown_events)
            .with_target_start(self.config.target_start_ms)
    }

    pub fn ingest(&self, events: Vec<Event>) -> (Vec<Event>, u64) {
        let Some(field) = self.config.required_ingest_field.as_deref() else {
            return (events, 0);
        };
        let before = events.len();
        let kept: Vec<Event> = events
            .into_iter()
            .filter(|event| event.get_str(field).is_some())
            .collect();
        let filtered = (before - kept.len()) as u64;
        (kept, filtered)
    }

    pub fn run_stage(
        &self,
        stage_index: usize,
        input: Vec<Event>,
    ) -> Result<(Vec<Event>, StageReport), PipelineError> {
        let stage = self.config.stages.get(stage_index).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("stage index {stage_index} out of range"))
        })?;
        let reducer = self.reducer(stage);
        let input_records = input.len() as u64;

        info!(
            component = "pipeline",
            event = "pipeline.stage.start",
            stage_index,
            keys = ?stage.keys,
            delay = %stage.delay,
            input_records
        );

        let groups = group_by_key(input, &stage.extractor())?;
        let group_count = groups.len() as u64;

        // Groups are independent; this in-memory runner reduces them in key order.
        // Enriched targets also travel in `output`, so their own sink is unused.
        let mut output = Vec::with_capacity(input_records as usize);
        let mut pass = PassReport::default();
        for (group_key, records) in groups {
            let report = reducer.reduce(&group_key, records, &mut output, Discard)?;
            pass.merge(&report);
        }

        let report = StageReport {
            stage_index,
            feature_prefix: stage.feature_prefix(),
            groups: group_count,
            input_records,
            output_records: output.len() as u64,
            pass,
        };

        info!(
            component = "pipeline",
            event = "pipeline.stage.finish",
            stage_index,
            groups = report.groups,
            output_records = report.output_records,
            targets_enriched = pass.targets_enriched,
            targets_dropped = pass.targets_dropped,
            sources_forwarded = pass.sources_forwarded
        );

        Ok((output, report))
    }

    pub fn run(&self, input: Vec<Event>) -> Result<(Vec<Event>, PipelineReport), PipelineError> {
        let mut report = PipelineReport {
            ingested: input.len() as u64,
            ..PipelineReport::default()
        };

        let (mut records, ingest_filtered) = self.ingest(input);
        report.ingest_filtered = ingest_filtered;

        for stage_index in 0..self.config.stages.len() {
            let (output, stage_report) = self.run_stage(stage_index, records)?;
            report.stages.push(stage_report);
            records = output;
        }

        let targets = final_filter(records);
        report.output_targets = targets.len() as u64;

        info!(
            component = "pipeline",
            event = "pipeline.run.finish",
            ingested = report.ingested,
            ingest_filtered = report.ingest_filtered,
            stages = report.stages.len(),
            output_targets = report.output_targets
        );

        Ok((targets, report))
    }
}

pub fn group_by_key(
    events: Vec<Event>,
    extractor: &GroupingKeyExtractor,
) -> Result<BTreeMap<String, Vec<Event>>, GroupingKeyError> {
    let mut groups: BTreeMap<String, Vec<Event>> = BTreeMap::new();
    for event in events {
        let key = extractor.extract(&event)?;
        groups.entry(key).or_default().push(event);
    }
    Ok(groups)
}

pub fn final_filter(events: Vec<Event>) -> Vec<Event> {
    events.into_iter().filter(Event::is_target).collect()
}

fn validate_config(config: &PipelineConfig) -> Result<(), PipelineError> {
    if config.stages.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "at least one stage is required".to_string(),
        ));
    }

    for (index, stage) in config.stages.iter().enumerate() {
        if stage.keys.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "stage {index} has no grouping keys"
            )));
        }
        let mut seen = HashSet::new();
        for key in &stage.keys {
            if key.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "stage {index} has an empty grouping key"
                )));
            }
            if !seen.insert(key.as_str()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "stage {index} repeats grouping key {key}"
                )));
            }
        }
        if stage.delay.is_negative() {
            return Err(PipelineError::InvalidConfig(format!(
                "stage {index} has negative delay {}",
                stage.delay
            )));
        }
    }

    if config.catalog.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "counter catalog is empty".to_string(),
        ));
    }
    for spec in &config.catalog.counters {
        if spec.decay_interval.as_millis() <= 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "counter {} must have a positive decay interval",
                spec.feature_name()
            )));
        }
    }

    let mut names = HashSet::new();
    for stage in &config.stages {
        for name in stage.feature_names(&config.catalog) {
            if !names.insert(name.clone()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "feature {name} would be produced twice"
                )));
            }
        }
    }

    Ok(())
}
