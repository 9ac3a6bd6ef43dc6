//! Exponentially decaying counters and the catalog instantiated per group.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{Event, EventKind, FieldValue};
use crate::interval::Interval;

pub const DEFAULT_DECAY_WINDOW: Interval = Interval::from_days(30);
pub const LONG_SESSION_THRESHOLD_MS: i64 = 90_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    WatchTime,
    LongSession,
    Likes,
    GiftCount,
    GiftValue,
    Shares,
    Comments,
}

pub const ALL_COUNTER_KINDS: [CounterKind; 7] = [
    CounterKind::WatchTime,
    CounterKind::LongSession,
    CounterKind::Likes,
    CounterKind::GiftCount,
    CounterKind::GiftValue,
    CounterKind::Shares,
    CounterKind::Comments,
];

#[derive(Debug, Error, PartialEq)]
pub enum CounterError {
    #[error(
        "counter {counter} observed event at {event_time_ms} before its last update at {last_update_ms}"
    )]
    TemporalOrdering {
        counter: String,
        last_update_ms: i64,
        event_time_ms: i64,
    },
    #[error("counter {counter} requires integer field {field}, which is missing")]
    MissingValue { counter: String, field: &'static str },
    #[error("counter {counter} requires integer field {field}, found {found}")]
    InvalidValue {
        counter: String,
        field: &'static str,
        found: &'static str,
    },
}

impl CounterKind {
    pub fn source_event(self) -> EventKind {
        match self {
            Self::WatchTime | Self::LongSession => EventKind::ViewEnd,
            Self::Likes => EventKind::Like,
            Self::GiftCount | Self::GiftValue => EventKind::Gift,
            Self::Shares => EventKind::Share,
            Self::Comments => EventKind::Comment,
        }
    }

    pub fn base_name(self) -> &'static str {
        match self {
            Self::WatchTime => "timespent_decay",
            Self::LongSession => "lives_count",
            Self::Likes => "like_count",
            Self::GiftCount => "gift_count",
            Self::GiftValue => "gift_value",
            Self::Shares => "shares",
            Self::Comments => "comments",
        }
    }

    pub fn extract(self, event: &Event) -> Result<f64, CounterError> {
        match self {
            Self::WatchTime => Ok(self.int_field(event, "duration_ms")? as f64),
            Self::LongSession => {
                let duration_ms = self.int_field(event, "duration_ms")?;
                Ok(if duration_ms > LONG_SESSION_THRESHOLD_MS {
                    1.0
                } else {
                    0.0
                })
            }
            Self::Likes => Ok(self.int_field(event, "like_counter")? as f64),
            Self::GiftCount => Ok(self.int_field(event, "gift_quantity")? as f64),
            Self::GiftValue => {
                let cheers = self.int_field(event, "gift_cheers_value")? as f64;
                let quantity = self.int_field(event, "gift_quantity")? as f64;
                Ok(cheers * quantity)
            }
            Self::Shares | Self::Comments => Ok(1.0),
        }
    }

    fn int_field(self, event: &Event, field: &'static str) -> Result<i64, CounterError> {
        match event.get(field) {
            Some(FieldValue::Int(value)) => Ok(*value),
            Some(other) => Err(CounterError::InvalidValue {
                counter: self.base_name().to_string(),
                field,
                found: other.kind_name(),
            }),
            None => Err(CounterError::MissingValue {
                counter: self.base_name().to_string(),
                field,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterSpec {
    pub kind: CounterKind,
    pub decay_interval: Interval,
}

impl CounterSpec {
    pub fn new(kind: CounterKind, decay_interval: Interval) -> Self {
        Self {
            kind,
            decay_interval,
        }
    }

    pub fn feature_name(&self) -> String {
        format!("{}_{}", self.kind.base_name(), self.decay_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSpec {
    pub counters: Vec<CounterSpec>,
}

impl Default for CatalogSpec {
    fn default() -> Self {
        Self::with_windows(&[DEFAULT_DECAY_WINDOW])
    }
}

impl CatalogSpec {
    pub fn with_windows(windows: &[Interval]) -> Self {
        let counters = windows
            .iter()
            .flat_map(|window| {
                ALL_COUNTER_KINDS
                    .iter()
                    .map(move |kind| CounterSpec::new(*kind, *window))
            })
            .collect();
        Self { counters }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.counters.iter().map(CounterSpec::feature_name).collect()
    }

    pub fn instantiate(&self) -> CounterCatalog {
        CounterCatalog {
            counters: self.counters.iter().copied().map(DecayCounter::new).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecayCounter {
    spec: CounterSpec,
    feature_name: String,
    value: f64,
    last_update_ms: i64,
}

impl DecayCounter {
    pub fn new(spec: CounterSpec) -> Self {
        Self {
            feature_name: spec.feature_name(),
            spec,
            value: 0.0,
            last_update_ms: 0,
        }
    }

    pub fn kind(&self) -> CounterKind {
        self.spec.kind
    }

    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn last_update_ms(&self) -> i64 {
        self.last_update_ms
    }

    pub fn decay(&mut self, event_time_ms: i64) -> Result<(), CounterError> {
        if event_time_ms < self.last_update_ms {
            return Err(CounterError::TemporalOrdering {
                counter: self.feature_name.clone(),
                last_update_ms: self.last_update_ms,
                event_time_ms,
            });
        }

        let elapsed_ms = (event_time_ms - self.last_update_ms) as f64;
        let interval_ms = self.spec.decay_interval.as_millis() as f64;
        self.value *= (-elapsed_ms / interval_ms).exp();
        self.last_update_ms = event_time_ms;
        Ok(())
    }

    pub fn consume(&mut self, event: &Event) -> Result<(), CounterError> {
        if event.kind != self.spec.kind.source_event() {
            return Ok(());
        }

        self.decay(event.event_time_ms)?;
        self.value += self.spec.kind.extract(event)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CounterCatalog {
    counters: Vec<DecayCounter>,
}

impl CounterCatalog {
    pub fn consume(&mut self, event: &Event) -> Result<(), CounterError> {
        for counter in &mut self.counters {
            counter.consume(event)?;
        }
        Ok(())
    }

    pub fn counters(&self) -> &[DecayCounter] {
        &self.counters
    }

    pub fn snapshot(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.counters
            .iter()
            .map(|counter| (counter.feature_name(), counter.value()))
    }
}
