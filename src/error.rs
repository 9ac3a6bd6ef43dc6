use thiserror::Error;

use crate::counter::CounterError;
use crate::grouping::GroupingKeyError;
use crate::interval::Interval;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
    #[error("grouping key error: {0}")]
    GroupingKey(#[from] GroupingKeyError),
    #[error("counter error in group {group_key:?}: {source}")]
    Counter {
        group_key: String,
        #[source]
        source: CounterError,
    },
    #[error("no rule for event_name {event_name:?} in group {group_key:?}")]
    UnknownEvent {
        event_name: String,
        group_key: String,
    },
    #[error("event_time {event_time_ms} shifted by {delay} overflows i64 milliseconds")]
    TimeOverflow { event_time_ms: i64, delay: Interval },
    #[error("enriched record is missing feature column {column}")]
    MissingFeature { column: String },
}
