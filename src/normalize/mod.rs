use serde_json::Value;
use tracing::debug;

use crate::{
    error::SchemaError,
    record::{
        AIRLINE, DESTINATION, DURATION, FlightRecord, PRICE, RawRecord, SOURCE, STORE_ID_FIELD,
        TOTAL_STOPS,
    },
    table::WorkingTable,
};

const SCHEMA_FIELDS: [&str; 6] = [AIRLINE, SOURCE, DESTINATION, TOTAL_STOPS, DURATION, PRICE];

/// Outcome of normalizing one fetch.
#[derive(Clone, Debug, PartialEq)]
pub enum Dataset {
    /// The collection held no records; there is no data to show.
    Empty,
    Loaded(WorkingTable),
}

/// Decodes every raw record into the fixed flight schema.
///
/// The whole load is aborted on the first malformed record, so a table is
/// never built from a partial fetch.
pub fn normalize(raw_records: &[RawRecord]) -> Result<Dataset, SchemaError> {
    if raw_records.is_empty() {
        return Ok(Dataset::Empty);
    }

    let records = raw_records
        .iter()
        .enumerate()
        .map(|(row, raw)| decode_record(row, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let ignored = raw_records
        .iter()
        .flat_map(|raw| raw.fields.keys())
        .filter(|key| key.as_str() != STORE_ID_FIELD && !SCHEMA_FIELDS.contains(&key.as_str()))
        .count();
    if ignored > 0 {
        debug!(ignored, "dropped fields outside the flight schema");
    }

    Ok(Dataset::Loaded(WorkingTable::from_records(records)))
}

/// Validates one record field by field.
pub fn decode_record(
    row: usize,
    raw: &RawRecord,
) -> Result<FlightRecord, SchemaError> {
    Ok(FlightRecord {
        airline: text_field(row, raw, AIRLINE)?,
        source: text_field(row, raw, SOURCE)?,
        destination: text_field(row, raw, DESTINATION)?,
        total_stops: text_field(row, raw, TOTAL_STOPS)?,
        duration: text_field(row, raw, DURATION)?,
        price: numeric_field(row, raw, PRICE)?,
    })
}

fn required<'a>(
    row: usize,
    raw: &'a RawRecord,
    field: &'static str,
) -> Result<&'a Value, SchemaError> {
    raw.get(field)
        .ok_or(SchemaError::MissingField { row, field })
}

fn text_field(
    row: usize,
    raw: &RawRecord,
    field: &'static str,
) -> Result<String, SchemaError> {
    match required(row, raw, field)? {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(SchemaError::NotText {
            row,
            field,
            value: other.to_string(),
        }),
    }
}

fn numeric_field(
    row: usize,
    raw: &RawRecord,
    field: &'static str,
) -> Result<f64, SchemaError> {
    let value = required(row, raw, field)?;
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|number| number.is_finite())
        .ok_or_else(|| SchemaError::NotNumeric {
            row,
            field,
            value: value.to_string(),
        })
}
