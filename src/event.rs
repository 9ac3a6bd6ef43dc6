//! Typed event records and their JSON-lines wire encoding.
//!
//! Every record carries a fixed header (`event_name`, `event_time`) and an
//! open-ended map of attribute fields. Stages only ever add fields (the
//! generated `feature_*` columns); nothing is removed along the way.
//!
//! Integer attributes arrive as decimal strings on the wire and are decoded
//! once, here. On output they are written back as decimal strings so a
//! dataset can be fed through the job again without conversion.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

pub const EVENT_NAME_FIELD: &str = "event_name";
pub const EVENT_TIME_FIELD: &str = "event_time";
pub const TARGET_EVENT_NAME: &str = "timespent_target";
pub const FEATURE_PREFIX: &str = "feature_";

pub const NUMERIC_WIRE_FIELDS: [&str; 4] = [
    "duration_ms",
    "like_counter",
    "gift_cheers_value",
    "gift_quantity",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    ViewEnd,
    Like,
    Gift,
    Share,
    Comment,
    TimespentTarget,
    Other(String),
}

impl EventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "view_end" => Self::ViewEnd,
            "like" => Self::Like,
            "gift" => Self::Gift,
            "share" => Self::Share,
            "comment" => Self::Comment,
            TARGET_EVENT_NAME => Self::TimespentTarget,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ViewEnd => "view_end",
            Self::Like => "like",
            Self::Gift => "gift",
            Self::Share => "share",
            Self::Comment => "comment",
            Self::TimespentTarget => TARGET_EVENT_NAME,
            Self::Other(name) => name,
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(self, Self::TimespentTarget)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub event_time_ms: i64,
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing required field {0}")]
    MissingField(&'static str),
    #[error("field {field} has invalid integer encoding '{raw}'")]
    InvalidInteger { field: String, raw: String },
    #[error("field {field} has unsupported value kind {kind}")]
    UnsupportedValue { field: String, kind: &'static str },
}

impl Event {
    pub fn new(kind: EventKind, event_time_ms: i64) -> Self {
        Self {
            kind,
            event_time_ms,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(FieldValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.fields.get(name) {
            Some(FieldValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn is_target(&self) -> bool {
        self.kind.is_target()
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .keys()
            .map(String::as_str)
            .filter(|name| name.starts_with(FEATURE_PREFIX))
    }
}

pub fn decode_event(line: &str) -> Result<Event, DecodeError> {
    let value: Value = serde_json::from_str(line)?;
    decode_event_value(value)
}

pub fn decode_event_value(value: Value) -> Result<Event, DecodeError> {
    let Value::Object(object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let mut kind = None;
    let mut event_time_ms = None;
    let mut fields = BTreeMap::new();

    for (name, value) in object {
        if name == EVENT_NAME_FIELD {
            match value {
                Value::String(raw) => kind = Some(EventKind::parse(&raw)),
                other => {
                    return Err(DecodeError::UnsupportedValue {
                        field: name,
                        kind: json_kind(&other),
                    })
                }
            }
        } else if name == EVENT_TIME_FIELD {
            event_time_ms = Some(decode_integer(&name, &value)?);
        } else if NUMERIC_WIRE_FIELDS.contains(&name.as_str()) {
            let decoded = decode_integer(&name, &value)?;
            fields.insert(name, FieldValue::Int(decoded));
        } else {
            let decoded = decode_attribute(&name, value)?;
            fields.insert(name, decoded);
        }
    }

    Ok(Event {
        kind: kind.ok_or(DecodeError::MissingField(EVENT_NAME_FIELD))?,
        event_time_ms: event_time_ms.ok_or(DecodeError::MissingField(EVENT_TIME_FIELD))?,
        fields,
    })
}

pub fn encode_event(event: &Event) -> Value {
    let mut object = Map::with_capacity(event.fields.len() + 2);
    object.insert(
        EVENT_NAME_FIELD.to_string(),
        Value::String(event.kind.as_str().to_string()),
    );
    object.insert(
        EVENT_TIME_FIELD.to_string(),
        Value::String(event.event_time_ms.to_string()),
    );

    for (name, value) in &event.fields {
        let encoded = match value {
            FieldValue::Int(v) if NUMERIC_WIRE_FIELDS.contains(&name.as_str()) => {
                Value::String(v.to_string())
            }
            FieldValue::Int(v) => Value::from(*v),
            FieldValue::Float(v) => Value::from(*v),
            FieldValue::Str(v) => Value::String(v.clone()),
        };
        object.insert(name.clone(), encoded);
    }

    Value::Object(object)
}

pub fn encode_event_line(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(&encode_event(event))
}

fn decode_integer(field: &str, value: &Value) -> Result<i64, DecodeError> {
    match value {
        Value::String(raw) => raw.parse().map_err(|_| DecodeError::InvalidInteger {
            field: field.to_string(),
            raw: raw.clone(),
        }),
        Value::Number(number) => number.as_i64().ok_or_else(|| DecodeError::InvalidInteger {
            field: field.to_string(),
            raw: number.to_string(),
        }),
        other => Err(DecodeError::UnsupportedValue {
            field: field.to_string(),
            kind: json_kind(other),
        }),
    }
}

fn decode_attribute(field: &str, value: Value) -> Result<FieldValue, DecodeError> {
    match value {
        Value::String(v) => Ok(FieldValue::Str(v)),
        Value::Number(number) => match number.as_i64() {
            Some(v) => Ok(FieldValue::Int(v)),
            None => number
                .as_f64()
                .map(FieldValue::Float)
                .ok_or_else(|| DecodeError::UnsupportedValue {
                    field: field.to_string(),
                    kind: "number",
                }),
        },
        other => Err(DecodeError::UnsupportedValue {
            field: field.to_string(),
            kind: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_decimal_string_integers() {
        let event = decode_event(
            r#"{"event_name":"view_end","event_time":"1679961600000","duration_ms":"120000","hostId":"h1"}"#,
        )
        .unwrap();

        assert_eq!(event.kind, EventKind::ViewEnd);
        assert_eq!(event.event_time_ms, 1_679_961_600_000);
        assert_eq!(event.get_int("duration_ms"), Some(120_000));
        assert_eq!(event.get_str("hostId"), Some("h1"));
        assert!(event.get("event_time").is_none());
    }

    #[test]
    fn accepts_json_integers_for_numeric_fields() {
        let event =
            decode_event(r#"{"event_name":"like","event_time":1000,"like_counter":3}"#).unwrap();
        assert_eq!(event.event_time_ms, 1000);
        assert_eq!(event.get_int("like_counter"), Some(3));
    }

    #[test]
    fn unknown_event_names_are_preserved() {
        let event = decode_event(r#"{"event_name":"follow","event_time":"5"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Other("follow".to_string()));
        assert!(!event.kind.is_known());
        assert_eq!(event.kind.as_str(), "follow");
    }

    #[test]
    fn malformed_integer_is_rejected() {
        let err = decode_event(r#"{"event_name":"like","event_time":"12a"}"#).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidInteger { ref field, ref raw } if field == "event_time" && raw == "12a"
        ));

        let err =
            decode_event(r#"{"event_name":"like","event_time":"1","like_counter":1.5}"#)
                .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInteger { .. }));
    }

    #[test]
    fn missing_header_fields_are_rejected() {
        let err = decode_event(r#"{"event_time":"1"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField(EVENT_NAME_FIELD)));

        let err = decode_event(r#"{"event_name":"like"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField(EVENT_TIME_FIELD)));
    }

    #[test]
    fn unsupported_values_are_rejected() {
        let err = decode_event(r#"{"event_name":"like","event_time":"1","tags":[1]}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnsupportedValue { kind: "array", .. }
        ));

        let err = decode_event("[1,2]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));

        let err = decode_event("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn encoding_restores_wire_strings_and_keeps_features_numeric() {
        let event = Event::new(EventKind::Gift, 42)
            .with_field("gift_quantity", 2_i64)
            .with_field("hostId", "h1")
            .with_field("feature_hostId_1m0s_gift_count_720h0m0s", 1.25);

        let encoded = encode_event(&event);
        assert_eq!(encoded["event_name"], "gift");
        assert_eq!(encoded["event_time"], "42");
        assert_eq!(encoded["gift_quantity"], "2");
        assert_eq!(encoded["hostId"], "h1");
        assert_eq!(encoded["feature_hostId_1m0s_gift_count_720h0m0s"], 1.25);

        let line = encode_event_line(&event).unwrap();
        assert_eq!(decode_event(&line).unwrap(), event);
    }
}
