//! Output feature schema with a stable fingerprint.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::error::PipelineError;
use crate::event::{Event, FieldValue};
use crate::pipeline::PipelineConfig;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
}

impl FeatureSchema {
    pub fn feature_values(&self, event: &Event) -> Result<Vec<f64>, PipelineError> {
        self.columns
            .iter()
            .map(|column| match event.get(&column.name) {
                Some(FieldValue::Float(value)) => Ok(*value),
                _ => Err(PipelineError::MissingFeature {
                    column: column.name.clone(),
                }),
            })
            .collect()
    }
}

pub fn build_feature_schema(config: &PipelineConfig) -> FeatureSchema {
    let columns: Vec<FeatureColumn> = config
        .stages
        .iter()
        .flat_map(|stage| stage.feature_names(&config.catalog))
        .map(|name| FeatureColumn {
            name,
            dtype: FeatureDType::F64,
        })
        .collect();

    let fingerprint = schema_fingerprint(config, &columns);

    info!(
        component = "schema",
        event = "schema.built",
        version = FEATURE_SCHEMA_VERSION,
        stages = config.stages.len(),
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), SchemaError> {
    if expected_version != actual.version {
        return Err(SchemaError::VersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(SchemaError::FingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn schema_fingerprint(config: &PipelineConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{FEATURE_SCHEMA_VERSION};"));
    hasher.update("stages:");
    for stage in &config.stages {
        hasher.update(format!("{}@{},", stage.keys.join("+"), stage.delay.as_millis()));
    }
    hasher.update(";counters:");
    for spec in &config.catalog.counters {
        hasher.update(format!(
            "{}@{},",
            spec.kind.base_name(),
            spec.decay_interval.as_millis()
        ));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
