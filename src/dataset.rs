//! JSON-lines input/output and the CSV training dataset writer.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::error::PipelineError;
use crate::event::{decode_event, encode_event_line, DecodeError, Event, FieldValue};
use crate::event::{EVENT_NAME_FIELD, EVENT_TIME_FIELD};
use crate::schema::FeatureSchema;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub fn read_events<R: BufRead>(reader: R) -> Result<Vec<Event>, DatasetError> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = decode_event(&line).map_err(|source| DatasetError::Decode {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

pub fn read_events_file(path: &Path) -> Result<Vec<Event>, DatasetError> {
    let events = read_events(BufReader::new(File::open(path)?))?;
    info!(
        component = "dataset",
        event = "dataset.read.finish",
        path = %path.display(),
        records = events.len()
    );
    Ok(events)
}

pub fn write_events_jsonl<W: Write>(mut writer: W, events: &[Event]) -> Result<(), DatasetError> {
    for event in events {
        writer.write_all(encode_event_line(event)?.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

// Header: `event_name`, `event_time`, passthrough columns, schema columns.
// Absent passthrough values become empty cells; absent features are errors.
pub fn write_dataset_csv<W: Write>(
    writer: W,
    schema: &FeatureSchema,
    passthrough_columns: &[String],
    events: &[Event],
) -> Result<(), DatasetError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = vec![EVENT_NAME_FIELD, EVENT_TIME_FIELD];
    header.extend(passthrough_columns.iter().map(String::as_str));
    header.extend(schema.columns.iter().map(|column| column.name.as_str()));
    csv_writer.write_record(&header)?;

    for event in events {
        let features = schema.feature_values(event)?;
        let mut record = Vec::with_capacity(header.len());
        record.push(event.kind.as_str().to_string());
        record.push(event.event_time_ms.to_string());
        for column in passthrough_columns {
            record.push(match event.get(column) {
                Some(FieldValue::Str(value)) => value.clone(),
                Some(FieldValue::Int(value)) => value.to_string(),
                Some(FieldValue::Float(value)) => value.to_string(),
                None => String::new(),
            });
        }
        record.extend(features.iter().map(f64::to_string));
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn write_output_file(
    path: &Path,
    schema: &FeatureSchema,
    passthrough_columns: &[String],
    events: &[Event],
) -> Result<(), DatasetError> {
    let writer = BufWriter::new(File::create(path)?);
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        write_dataset_csv(writer, schema, passthrough_columns, events)?;
    } else {
        write_events_jsonl(writer, events)?;
    }

    info!(
        component = "dataset",
        event = "dataset.write.finish",
        path = %path.display(),
        format = if is_csv { "csv" } else { "jsonl" },
        records = events.len()
    );
    Ok(())
}
