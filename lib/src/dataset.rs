use std::collections::{BTreeMap, BTreeSet};
use std::io;

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::Result;
use crate::timeseries::parse_timestamp;

/// The nine water-quality parameters reported by the river sensors.
pub const SENSOR_KEYS: &[&str] = &[
    "Tr_Sensor",
    "BOD_Sensor",
    "DO_Sensor",
    "COD_Sensor",
    "NH_Sensor",
    "TDS_Sensor",
    "CT_Sensor",
    "ORP_Sensor",
    "pH_Sensor",
];

const TIME_KEY_CANDIDATES: &[&str] = &["time", "timestamp", "datetime", "date"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    String,
    Datetime,
}

pub type Schema = BTreeMap<String, ColumnType>;

/// A single sensor reading, keyed by column name.
pub type Row = BTreeMap<String, Value>;

pub type Report = BTreeMap<String, u64>;

/// Cleaned dataset as returned by the ML service's `/process` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanPayload {
    #[serde(default)]
    pub dataset_id: String,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub clean_rows: Vec<Row>,
    #[serde(default)]
    pub missing_report: Report,
    #[serde(default)]
    pub out_of_range_report: Report,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    pub schema: Schema,
    pub rows: Vec<Row>,
    pub missing: Report,
    pub out_of_range: Report,
}

impl From<CleanPayload> for Dataset {
    fn from(payload: CleanPayload) -> Self {
        Dataset {
            schema: payload.schema,
            rows: payload.clean_rows,
            missing: payload.missing_report,
            out_of_range: payload.out_of_range_report,
        }
    }
}

impl Dataset {
    /// Build a dataset from raw rows, inferring the schema and counting
    /// missing cells per column. Range checks are the ML service's job, so
    /// the out-of-range report stays empty.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let schema = infer_schema(&rows);
        let missing = missing_report(&rows, &schema);
        Dataset {
            schema,
            rows,
            missing,
            out_of_range: Report::new(),
        }
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        numeric_columns(&self.schema)
    }

    pub fn time_key(&self) -> Option<String> {
        guess_time_key(&self.schema)
    }
}

fn columns_of(schema: &Schema, ty: ColumnType) -> Vec<String> {
    schema
        .iter()
        .filter(|(_, t)| **t == ty)
        .map(|(k, _)| k.clone())
        .collect()
}

pub fn numeric_columns(schema: &Schema) -> Vec<String> {
    columns_of(schema, ColumnType::Number)
}

pub fn datetime_columns(schema: &Schema) -> Vec<String> {
    columns_of(schema, ColumnType::Datetime)
}

/// Numeric columns restricted to the monitored sensor parameters, in
/// [`SENSOR_KEYS`] order.
pub fn sensor_columns(schema: &Schema) -> Vec<String> {
    SENSOR_KEYS
        .iter()
        .filter(|k| schema.get(**k) == Some(&ColumnType::Number))
        .map(|k| k.to_string())
        .collect()
}

/// First column whose name looks like a time column.
pub fn guess_time_key(schema: &Schema) -> Option<String> {
    schema
        .keys()
        .find(|k| TIME_KEY_CANDIDATES.contains(&k.to_lowercase().as_str()))
        .cloned()
}

/// Numeric view of a cell: numbers as-is, numeric strings parsed.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String view of a scalar cell. Null, arrays and objects have none.
pub fn value_as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Infer the type of every column seen in `rows`.
///
/// A column is a number if every non-empty cell is a finite number, a
/// datetime if every non-empty cell parses as a sensor timestamp, and a
/// string otherwise (including when it has no non-empty cells at all).
pub fn infer_schema(rows: &[Row]) -> Schema {
    let columns: BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
    let mut schema = Schema::new();
    for column in columns {
        let cells: Vec<&Value> = rows
            .iter()
            .filter_map(|r| r.get(column))
            .filter(|v| !is_empty(v))
            .collect();

        let ty = if cells.is_empty() {
            ColumnType::String
        } else if cells
            .iter()
            .all(|v| value_as_f64(v).is_some_and(f64::is_finite))
        {
            ColumnType::Number
        } else if cells.iter().all(|v| match v {
            Value::String(s) => parse_timestamp(s).is_some(),
            _ => false,
        }) {
            ColumnType::Datetime
        } else {
            ColumnType::String
        };
        schema.insert(column.clone(), ty);
    }
    schema
}

/// Number of rows with an absent or empty cell, per schema column.
pub fn missing_report(rows: &[Row], schema: &Schema) -> Report {
    schema
        .keys()
        .map(|column| {
            let missing = rows
                .iter()
                .filter(|r| r.get(column).map_or(true, is_empty))
                .count() as u64;
            (column.clone(), missing)
        })
        .collect()
}

/// Copy a lowercase `timestamp` field to `Timestamp` when the latter is
/// absent, so rows from every source share one time key.
pub fn normalize_timestamp(row: &mut Row) {
    if row.contains_key("Timestamp") {
        return;
    }
    if let Some(ts) = row.get("timestamp").filter(|v| !is_empty(v)).cloned() {
        row.insert("Timestamp".to_string(), ts);
    }
}

fn cell_value(cell: &str) -> Value {
    match cell.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(cell.to_string()),
    }
}

/// Read a headered CSV file into rows.
///
/// Fields are trimmed; records may be shorter or longer than the header.
/// Empty cells and cells beyond the header are left out of the row.
pub fn read_csv<R: io::Read>(reader: R) -> Result<Vec<Row>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(name, cell)| (name.to_string(), cell_value(cell)))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Write rows as CSV with the given column order.
pub fn write_csv<W: io::Write>(writer: W, columns: &[String], rows: &[Row]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(columns)?;
    for row in rows {
        wtr.write_record(
            columns
                .iter()
                .map(|c| row.get(c).and_then(value_as_str).unwrap_or_default()),
        )?;
    }
    wtr.flush()?;
    Ok(())
}
