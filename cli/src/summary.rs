use clap::Args;
use eyre::Result;
use riverwatch::dataset::Dataset;
use riverwatch::summary::{report_json, report_text, summarize};

use crate::io::{Input, Output};

#[derive(Args, Debug)]
pub struct Opts {
    /// Report type (text, json)
    #[clap(long = "type", default_value = "text")]
    pub report_type: String,

    /// Output file [default: stdout]
    #[clap(long, default_value = "stdout")]
    pub output: String,

    /// Input CSV file [default: stdin]
    #[clap(default_value = "stdin")]
    pub input: String,
}

pub async fn summary(opts: &Opts) -> Result<()> {
    let rows = Input::from_filename(&opts.input).await?.read_rows().await?;
    let dataset = Dataset::from_rows(rows);
    let summary = summarize(&dataset.rows, &dataset.schema);

    let mut buf: Vec<u8> = Vec::new();
    match opts.report_type.as_str() {
        "text" => report_text(&summary, &mut buf)?,
        "json" => report_json(&summary, &mut buf)?,
        other => eyre::bail!("unknown report type: {}", other),
    }

    let missing: Vec<_> = dataset.missing.iter().filter(|(_, n)| **n > 0).collect();
    if !missing.is_empty() && opts.report_type == "text" {
        buf.extend_from_slice(b"\nMissing values\n");
        for (column, n) in missing {
            buf.extend_from_slice(format!("  {column}: {n}\n").as_bytes());
        }
    }

    let mut output = Output::from_filename(&opts.output).await?;
    output.emit(&buf).await
}
