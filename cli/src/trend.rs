use chrono::NaiveDate;
use clap::Args;
use eyre::{eyre, Result};
use riverwatch::dataset::{guess_time_key, Dataset};
use riverwatch::series::{self, TrendPoint};
use riverwatch::timeseries::{filter_range, month_choices};
use riverwatch::Aggregation;

use crate::io::{Format, Input, Output};

#[derive(Args, Debug)]
pub struct Opts {
    /// Parameter column to plot over time
    #[clap(long, required_unless_present = "months")]
    param: Option<String>,

    /// Aggregation: all, daily, weekly, monthly
    #[clap(long, default_value = "all")]
    agg: Aggregation,

    /// Only readings on or after this day (YYYY-MM-DD)
    #[clap(long, requires = "end")]
    start: Option<NaiveDate>,

    /// Only readings on or before this day (YYYY-MM-DD)
    #[clap(long, requires = "start")]
    end: Option<NaiveDate>,

    /// List the months present in the data and exit
    #[clap(long)]
    months: bool,

    /// Timestamp column [default: detected]
    #[clap(long)]
    time_key: Option<String>,

    /// Output format
    #[clap(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Output file [default: stdout]
    #[clap(long, default_value = "stdout")]
    output: String,

    /// Input CSV file [default: stdin]
    #[clap(default_value = "stdin")]
    input: String,
}

pub async fn trend(opts: &Opts) -> Result<()> {
    let rows = Input::from_filename(&opts.input).await?.read_rows().await?;
    let dataset = Dataset::from_rows(rows);
    let time_key = opts
        .time_key
        .clone()
        .or_else(|| guess_time_key(&dataset.schema))
        .ok_or_else(|| eyre!("no timestamp column found; pass --time-key"))?;

    let mut output = Output::from_filename(&opts.output).await?;
    if opts.months {
        let months = month_choices(&dataset.rows, &time_key).join("\n") + "\n";
        return output.emit(months.as_bytes()).await;
    }

    let rows = match (opts.start, opts.end) {
        (Some(start), Some(end)) => filter_range(&dataset.rows, &time_key, start, end),
        _ => dataset.rows,
    };
    let param = opts.param.as_deref().unwrap_or_default();
    let points = series::trend(&rows, &time_key, param, opts.agg);
    log::info!("{} {} points for {}", points.len(), opts.agg, param);

    let body = match opts.format {
        Format::Json => serde_json::to_string_pretty(&points)? + "\n",
        Format::Csv => to_csv(&points)?,
    };
    output.emit(body.as_bytes()).await
}

fn to_csv(points: &[TrendPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for p in points {
        wtr.serialize(p)?;
    }
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escapes_labels() {
        let points = vec![
            TrendPoint {
                bucket: "2024-03".to_string(),
                label: "March 2024".to_string(),
                value: 7.25,
                count: 4,
            },
            TrendPoint {
                bucket: "2024-03-01 10:00:00".to_string(),
                label: "01/03/2024, \"noon\"".to_string(),
                value: 7.5,
                count: 1,
            },
        ];
        let out = to_csv(&points).unwrap();
        assert_eq!(
            out,
            "bucket,label,value,count\n\
             2024-03,March 2024,7.25,4\n\
             2024-03-01 10:00:00,\"01/03/2024, \"\"noon\"\"\",7.5,1\n"
        );

        let mut rdr = csv::Reader::from_reader(out.as_bytes());
        let labels: Vec<String> = rdr
            .records()
            .map(|r| r.unwrap()[1].to_string())
            .collect();
        assert_eq!(labels, ["March 2024", "01/03/2024, \"noon\""]);
    }
}
