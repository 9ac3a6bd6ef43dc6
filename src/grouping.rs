//! Composite grouping keys built from identifier fields.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Event;

// Terminates every key component, so `["ab", "c"]` and `["a", "bc"]`
// never produce the same key.
pub const KEY_SENTINEL: char = '\u{1f}';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupingKeyError {
    #[error("grouping field {field} is missing or not a string")]
    MissingField { field: String },
    #[error("grouping field {field} contains the key sentinel")]
    SentinelInValue { field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingKeyExtractor {
    fields: Vec<String>,
}

impl GroupingKeyExtractor {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn extract(&self, event: &Event) -> Result<String, GroupingKeyError> {
        let mut key = String::new();
        for field in &self.fields {
            let value = event
                .get_str(field)
                .ok_or_else(|| GroupingKeyError::MissingField {
                    field: field.clone(),
                })?;
            if value.contains(KEY_SENTINEL) {
                return Err(GroupingKeyError::SentinelInValue {
                    field: field.clone(),
                });
            }
            key.push_str(value);
            key.push(KEY_SENTINEL);
        }
        Ok(key)
    }

    pub fn label(&self) -> String {
        self.fields.join("_")
    }
}
