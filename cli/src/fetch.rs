use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use eyre::Result;
use riverwatch::dataset::{self, Row};
use riverwatch::series::sensor_filter;
use riverwatch::timeseries::sort_by_time;
use riverwatch::{http, Config, SensorApi};

use crate::io::{Format, Output};

#[derive(Args, Debug)]
pub struct Opts {
    /// Sensor backend base URL
    #[clap(long, env = "SENSOR_API_URL")]
    api_url: Option<String>,

    /// Monitoring location, e.g. semantan
    #[clap(long, default_value = "")]
    location: String,

    /// Keep rows where every sensor reads zero
    #[clap(long)]
    keep_zero: bool,

    /// Output format
    #[clap(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Output file [default: stdout]
    #[clap(long, default_value = "stdout")]
    output: String,

    #[command(subcommand)]
    what: What,
}

#[derive(Subcommand, Debug)]
enum What {
    /// Most recent reading
    Latest,
    /// Readings between two dates, inclusive
    Range {
        /// First day (YYYY-MM-DD)
        #[clap(long)]
        start: NaiveDate,
        /// Last day (YYYY-MM-DD)
        #[clap(long)]
        end: NaiveDate,
    },
    /// Locations the backend has data for
    Locations,
}

pub async fn fetch(opts: &Opts, config: &Config) -> Result<()> {
    let base = opts.api_url.as_deref().unwrap_or(&config.sensor_api_url);
    let api = SensorApi::new(Arc::new(http::client()), base, config.retry)?;

    let body = match &opts.what {
        What::Locations => serde_json::to_string_pretty(&api.supported_locations().await?)? + "\n",
        What::Latest => {
            let rows: Vec<Row> = api.latest(&opts.location).await?.into_iter().collect();
            if rows.is_empty() {
                log::warn!("no readings for {}", opts.location);
            }
            encode(&rows, opts.format)?
        }
        What::Range { start, end } => {
            if end < start {
                eyre::bail!("--end {} is before --start {}", end, start);
            }
            let mut rows = api.by_date_range(&opts.location, *start, *end).await?;
            if !opts.keep_zero {
                rows = sensor_filter(rows);
            }
            sort_by_time(&mut rows, "Timestamp");
            encode(&rows, opts.format)?
        }
    };

    let mut output = Output::from_filename(&opts.output).await?;
    output.emit(body.as_bytes()).await
}

fn encode(rows: &[Row], format: Format) -> Result<String> {
    match format {
        Format::Json => Ok(serde_json::to_string_pretty(rows)? + "\n"),
        Format::Csv => {
            let mut columns: Vec<String> = Vec::new();
            for row in rows {
                for key in row.keys() {
                    if !columns.contains(key) {
                        columns.push(key.clone());
                    }
                }
            }
            let mut buf: Vec<u8> = Vec::new();
            dataset::write_csv(&mut buf, &columns, rows)?;
            Ok(String::from_utf8(buf)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn csv_unions_columns() {
        let rows: Vec<Row> = vec![
            serde_json::from_value(json!({"Timestamp": "05/03/2024 10:00:00", "pH_Sensor": 7.1}))
                .unwrap(),
            serde_json::from_value(json!({"DO_Sensor": 6.0, "Timestamp": "05/03/2024 11:00:00"}))
                .unwrap(),
        ];
        let csv = encode(&rows, Format::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("Timestamp,pH_Sensor,DO_Sensor"));
        assert_eq!(lines.count(), 2);
    }
}
