//! One stage applied to one group: shift, sort, scan, emit.
//!
//! Source records are shifted forward by the stage delay before sorting, so
//! a target only sees events that the serving side would already have
//! processed at the target's own time. Each target picks up a snapshot of
//! every counter; sources are forwarded so later stages can regroup them.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::counter::CatalogSpec;
use crate::error::PipelineError;
use crate::event::{Event, FEATURE_PREFIX};
use crate::grouping::GroupingKeyExtractor;
use crate::interval::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownEventPolicy {
    #[default]
    Strict,
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub keys: Vec<String>,
    pub delay: Interval,
}

impl StageConfig {
    pub fn new<I, S>(keys: I, delay: Interval) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            delay,
        }
    }

    pub fn extractor(&self) -> GroupingKeyExtractor {
        GroupingKeyExtractor::new(self.keys.iter().cloned())
    }

    pub fn feature_prefix(&self) -> String {
        let mut prefix = String::from(FEATURE_PREFIX);
        for key in &self.keys {
            prefix.push_str(key);
            prefix.push('_');
        }
        prefix.push_str(&self.delay.to_string());
        prefix.push('_');
        prefix
    }

    pub fn feature_names(&self, catalog: &CatalogSpec) -> Vec<String> {
        let prefix = self.feature_prefix();
        catalog
            .feature_names()
            .into_iter()
            .map(|name| format!("{prefix}{name}"))
            .collect()
    }
}

pub trait EventSink {
    fn emit(&mut self, event: Event);
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: Event) {
        (**self).emit(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PassReport {
    pub records_in: u64,
    pub sources_forwarded: u64,
    pub targets_enriched: u64,
    pub targets_dropped: u64,
    pub unknown_forwarded: u64,
}

impl PassReport {
    pub fn merge(&mut self, other: &PassReport) {
        self.records_in += other.records_in;
        self.sources_forwarded += other.sources_forwarded;
        self.targets_enriched += other.targets_enriched;
        self.targets_dropped += other.targets_dropped;
        self.unknown_forwarded += other.unknown_forwarded;
    }
}

#[derive(Debug, Clone)]
pub struct PassReducer<'a> {
    stage: &'a StageConfig,
    catalog: &'a CatalogSpec,
    unknown_events: UnknownEventPolicy,
    target_start_ms: Option<i64>,
    feature_names: Vec<String>,
}

impl<'a> PassReducer<'a> {
    pub fn new(stage: &'a StageConfig, catalog: &'a CatalogSpec) -> Self {
        Self {
            feature_names: stage.feature_names(catalog),
            stage,
            catalog,
            unknown_events: UnknownEventPolicy::Strict,
            target_start_ms: None,
        }
    }

    pub fn with_unknown_events(mut self, policy: UnknownEventPolicy) -> Self {
        self.unknown_events = policy;
        self
    }

    pub fn with_target_start(mut self, start_ms: Option<i64>) -> Self {
        self.target_start_ms = start_ms;
        self
    }

    pub fn stage(&self) -> &StageConfig {
        self.stage
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    // Reduces one group. `next_stage` receives every surviving record
    // (shifted sources and enriched targets); `enriched` receives the
    // enriched targets only. Nothing is emitted when the group fails.
    // Final rows come from `next_stage` of the last stage after the final
    // filter; `enriched` carries the same targets for callers that want
    // them without filtering.
    pub fn reduce<I, N, E>(
        &self,
        group_key: &str,
        records: I,
        mut next_stage: N,
        mut enriched: E,
    ) -> Result<PassReport, PipelineError>
    where
        I: IntoIterator<Item = Event>,
        N: EventSink,
        E: EventSink,
    {
        match self.reduce_group(group_key, records) {
            Ok((forwarded, targets, report)) => {
                for event in targets {
                    enriched.emit(event);
                }
                for event in forwarded {
                    next_stage.emit(event);
                }
                Ok(report)
            }
            Err(err) => {
                warn!(
                    component = "reducer",
                    event = "reducer.group.error",
                    group_key,
                    feature_prefix = %self.stage.feature_prefix(),
                    error = %err
                );
                Err(err)
            }
        }
    }

    fn reduce_group<I>(
        &self,
        group_key: &str,
        records: I,
    ) -> Result<(Vec<Event>, Vec<Event>, PassReport), PipelineError>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut report = PassReport::default();
        let delay_ms = self.stage.delay.as_millis();

        // The whole group is buffered: sorting needs every record.
        let mut events = Vec::new();
        for mut event in records {
            report.records_in += 1;
            if event.is_target() {
                if self
                    .target_start_ms
                    .is_some_and(|start_ms| event.event_time_ms < start_ms)
                {
                    report.targets_dropped += 1;
                    continue;
                }
            } else {
                event.event_time_ms = event.event_time_ms.checked_add(delay_ms).ok_or(
                    PipelineError::TimeOverflow {
                        event_time_ms: event.event_time_ms,
                        delay: self.stage.delay,
                    },
                )?;
            }
            events.push(event);
        }

        events.sort_by_key(|event| event.event_time_ms);

        let mut catalog = self.catalog.instantiate();
        let mut forwarded = Vec::with_capacity(events.len());
        let mut targets = Vec::new();

        for mut event in events {
            if event.is_target() {
                for (name, (_, value)) in self.feature_names.iter().zip(catalog.snapshot()) {
                    event.set(name.clone(), value);
                }
                report.targets_enriched += 1;
                targets.push(event.clone());
                forwarded.push(event);
            } else if event.kind.is_known() {
                catalog
                    .consume(&event)
                    .map_err(|source| PipelineError::Counter {
                        group_key: group_key.to_string(),
                        source,
                    })?;
                report.sources_forwarded += 1;
                forwarded.push(event);
            } else {
                match self.unknown_events {
                    UnknownEventPolicy::Strict => {
                        return Err(PipelineError::UnknownEvent {
                            event_name: event.kind.as_str().to_string(),
                            group_key: group_key.to_string(),
                        })
                    }
                    UnknownEventPolicy::PassThrough => {
                        report.unknown_forwarded += 1;
                        forwarded.push(event);
                    }
                }
            }
        }

        if report.targets_dropped > 0 {
            debug!(
                component = "reducer",
                event = "reducer.target.dropped",
                group_key,
                targets_dropped = report.targets_dropped
            );
        }

        Ok((forwarded, targets, report))
    }
}
