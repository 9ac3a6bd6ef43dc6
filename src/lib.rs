//! Time-decayed counter aggregation and feature join.
//!
//! For a batch of timestamped events, computes exponentially decaying
//! per-entity statistics and attaches their values onto target records as
//! they would have been seen at serving time, with a configurable delay per
//! stage. Stages group by different identifier sets and run in sequence.

mod config;
mod counter;
mod dataset;
mod error;
mod event;
mod grouping;
mod interval;
mod observability;
mod pipeline;
mod reducer;
mod schema;

pub use config::{
    job_config_from_env, job_config_from_vars, pipeline_config_from_env,
    pipeline_config_from_vars, JobConfig,
};
pub use counter::{
    CatalogSpec, CounterCatalog, CounterError, CounterKind, CounterSpec, DecayCounter,
    ALL_COUNTER_KINDS, DEFAULT_DECAY_WINDOW, LONG_SESSION_THRESHOLD_MS,
};
pub use dataset::{
    read_events, read_events_file, write_dataset_csv, write_events_jsonl, write_output_file,
    DatasetError,
};
pub use error::PipelineError;
pub use event::{
    decode_event, decode_event_value, encode_event, encode_event_line, DecodeError, Event,
    EventKind, FieldValue, EVENT_NAME_FIELD, EVENT_TIME_FIELD, FEATURE_PREFIX,
    NUMERIC_WIRE_FIELDS, TARGET_EVENT_NAME,
};
pub use grouping::{GroupingKeyError, GroupingKeyExtractor, KEY_SENTINEL};
pub use interval::{Interval, IntervalError};
pub use observability::{
    init_logging, log_app_start, log_job_config, logging_config_from_env,
    logging_config_from_vars, LogFormat, LoggingConfig, LoggingInitError,
};
pub use pipeline::{
    cross_stages, final_filter, group_by_key, Discard, PipelineComposer, PipelineConfig,
    PipelineReport, StageReport, REFERENCE_DELAYS, REFERENCE_INGEST_FIELD,
    REFERENCE_KEY_SETS,
};
pub use reducer::{EventSink, PassReducer, PassReport, StageConfig, UnknownEventPolicy};
pub use schema::{
    assert_schema_compatible, build_feature_schema, FeatureColumn, FeatureDType, FeatureSchema,
    SchemaError, FEATURE_SCHEMA_VERSION,
};
