mod fetch;
mod insight;
mod io;
mod plot;
mod serve;
mod summary;
mod trend;

use clap::{Parser, Subcommand};
use riverwatch::Config;

#[derive(Parser)]
#[command(
    name = "riverwatch",
    about = "River water quality sensor toolkit: fetch, summarize, plot and ask about sensor data"
)]
struct Cli {
    /// Log debug output [default level: info, or RUST_LOG]
    #[clap(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Downsample two columns of a sensor CSV into a scatter plot
    Plot(plot::Opts),
    /// Time series of one parameter, optionally aggregated
    Trend(trend::Opts),
    /// Per-column statistics of a sensor CSV
    Summary(summary::Opts),
    /// Fetch readings from the sensor backend
    Fetch(fetch::Opts),
    /// Ask an LLM about a sensor CSV
    Insight(insight::Opts),
    /// Run the dashboard API server
    Serve(serve::Opts),
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = Config::from_env();
    match cli.command {
        Command::Plot(opts) => plot::plot(&opts).await,
        Command::Trend(opts) => trend::trend(&opts).await,
        Command::Summary(opts) => summary::summary(&opts).await,
        Command::Fetch(opts) => fetch::fetch(&opts, &config).await,
        Command::Insight(opts) => insight::insight(&opts, &config).await,
        Command::Serve(opts) => serve::serve(&opts, &config).await,
    }
}
