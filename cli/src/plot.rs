use clap::Args;
use eyre::Result;
use riverwatch::dataset::{sensor_columns, Dataset};
use riverwatch::series::{self, DRAW_LIMIT};
use riverwatch::Point;
use serde_json::json;

use crate::io::{Input, Output};

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlotFormat {
    #[default]
    Html,
    Json,
    Csv,
}

#[derive(Args, Debug)]
pub struct Opts {
    /// Plot title
    #[clap(long, default_value = "Sensor Scatter")]
    title: String,

    /// Column on the x axis [default: first sensor column]
    #[clap(long)]
    x: Option<String>,

    /// Column on the y axis [default: second sensor column]
    #[clap(long)]
    y: Option<String>,

    /// Maximum number of points drawn (LTTB downsampling threshold)
    #[clap(long, default_value_t = DRAW_LIMIT)]
    threshold: usize,

    /// Output format
    #[clap(long, value_enum, default_value_t = PlotFormat::Html)]
    format: PlotFormat,

    /// Output file [default: stdout]
    #[clap(long, default_value = "stdout")]
    output: String,

    /// Input CSV file [default: stdin]
    #[clap(default_value = "stdin")]
    input: String,
}

pub async fn plot(opts: &Opts) -> Result<()> {
    let rows = Input::from_filename(&opts.input).await?.read_rows().await?;
    let dataset = Dataset::from_rows(rows);

    let sensors = sensor_columns(&dataset.schema);
    let x = match opts.x.clone().or_else(|| sensors.first().cloned()) {
        Some(x) => x,
        None => eyre::bail!("no numeric sensor column to plot; pass --x and --y"),
    };
    let y = opts
        .y
        .clone()
        .or_else(|| sensors.get(1).cloned())
        .unwrap_or_else(|| x.clone());

    let points = series::scatter(&dataset.rows, &x, &y, opts.threshold);
    if points.is_empty() {
        eyre::bail!("no numeric values in columns {} and {}", x, y);
    }
    log::info!("plotting {} points of {} vs {}", points.len(), y, x);

    let body = match opts.format {
        PlotFormat::Html => generate_plot_html(&opts.title, &x, &y, &points)?,
        PlotFormat::Json => serde_json::to_string(&points)? + "\n",
        PlotFormat::Csv => points_csv(&x, &y, &points)?,
    };

    let mut output = Output::from_filename(&opts.output).await?;
    output.emit(body.as_bytes()).await
}

fn points_csv(x: &str, y: &str, points: &[Point]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([x, y])?;
    for p in points {
        wtr.write_record([p.x.to_string(), p.y.to_string()])?;
    }
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn generate_plot_html(title: &str, x: &str, y: &str, points: &[Point]) -> Result<String> {
    let data: Vec<[f64; 2]> = points.iter().map(|p| [p.x, p.y]).collect();
    let opts = json!({ "title": title, "x": x, "y": y });
    let series_data = serde_json::to_string(&data)?;
    let title = title.replace('<', "&lt;").replace('>', "&gt;");

    Ok(format!(
        r##"<!doctype html>
<html>
<head>
  <title>{title}</title>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <style>
    * {{ box-sizing: border-box; }}
    body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 20px; background: #f8fafc; color: #1f2937; }}
    .container {{ max-width: 1200px; margin: 0 auto; }}
    h1 {{ font-size: 24px; font-weight: 600; margin: 0 0 20px 0; }}
    .chart {{ background: #fff; border: 1px solid #e5e7eb; border-radius: 8px; padding: 20px; }}
    canvas {{ width: 100%; }}
    .meta {{ margin-top: 12px; font-size: 13px; color: #6b7280; }}
  </style>
</head>
<body>
  <div class="container">
    <h1>{title}</h1>
    <div class="chart">
      <canvas id="chart" height="500"></canvas>
      <div class="meta" id="meta"></div>
    </div>
  </div>
  <script>
    const opts = {opts};
    const points = {series_data};

    function draw() {{
      const canvas = document.getElementById('chart');
      const ctx = canvas.getContext('2d');
      const dpr = window.devicePixelRatio || 1;
      const rect = canvas.getBoundingClientRect();
      canvas.width = rect.width * dpr;
      canvas.height = 500 * dpr;
      ctx.scale(dpr, dpr);
      const W = rect.width;
      const H = 500;
      const pad = {{top: 20, right: 20, bottom: 50, left: 80}};
      const pw = W - pad.left - pad.right;
      const ph = H - pad.top - pad.bottom;

      ctx.clearRect(0, 0, W, H);
      if (points.length === 0) return;

      let xMin = Infinity, xMax = -Infinity, yMin = Infinity, yMax = -Infinity;
      for (const [x, y] of points) {{
        xMin = Math.min(xMin, x); xMax = Math.max(xMax, x);
        yMin = Math.min(yMin, y); yMax = Math.max(yMax, y);
      }}

      function xToP(x) {{ return pad.left + (x - xMin) / (xMax - xMin || 1) * pw; }}
      function yToP(y) {{ return pad.top + ph - (y - yMin) / (yMax - yMin || 1) * ph; }}

      ctx.strokeStyle = '#e5e7eb';
      ctx.lineWidth = 1;
      for (let i = 0; i <= 5; i++) {{
        const y = pad.top + (ph / 5) * i;
        ctx.beginPath(); ctx.moveTo(pad.left, y); ctx.lineTo(W - pad.right, y); ctx.stroke();
      }}

      ctx.fillStyle = '#6b7280';
      ctx.font = '11px monospace';
      ctx.textAlign = 'right';
      for (let i = 0; i <= 5; i++) {{
        const val = yMin + (1 - i / 5) * (yMax - yMin);
        ctx.fillText(val.toFixed(2), pad.left - 8, pad.top + (ph / 5) * i + 4);
      }}
      ctx.textAlign = 'center';
      for (let i = 0; i <= 5; i++) {{
        const val = xMin + (i / 5) * (xMax - xMin);
        ctx.fillText(val.toFixed(2), pad.left + (pw / 5) * i, H - pad.bottom + 20);
      }}

      ctx.font = '12px sans-serif';
      ctx.fillText(opts.x, pad.left + pw / 2, H - 8);
      ctx.save();
      ctx.translate(16, pad.top + ph / 2);
      ctx.rotate(-Math.PI / 2);
      ctx.fillText(opts.y, 0, 0);
      ctx.restore();

      ctx.fillStyle = '#2563eb';
      for (const [x, y] of points) {{
        ctx.beginPath();
        ctx.arc(xToP(x), yToP(y), 2, 0, 2 * Math.PI);
        ctx.fill();
      }}

      document.getElementById('meta').textContent =
        `${{points.length}} points, ${{opts.y}} vs ${{opts.x}}`;
    }}

    draw();
    window.addEventListener('resize', draw);
  </script>
</body>
</html>"##
    ))
}
