use std::net::SocketAddr;
use std::sync::Arc;

use clap::Args;
use eyre::{eyre, Result};
use riverwatch::http::{self, Transport};
use riverwatch::server::{self, AppState};
use riverwatch::{Config, DatasetStore, InsightClient, MlClient};

#[derive(Args, Debug)]
pub struct Opts {
    /// Address to listen on
    #[clap(long, default_value = "127.0.0.1:8080", env = "RIVERWATCH_ADDR")]
    addr: String,

    /// ML cleaning service base URL
    #[clap(long, env = "ML_SERVICE_URL")]
    ml_url: Option<String>,
}

pub async fn serve(opts: &Opts, config: &Config) -> Result<()> {
    let addr: SocketAddr = opts
        .addr
        .parse()
        .map_err(|e| eyre!("invalid listen address {}: {}", opts.addr, e))?;

    let transport: Arc<dyn Transport> = Arc::new(http::client());
    let ml_url = opts.ml_url.as_deref().unwrap_or(&config.ml_service_url);
    let state = AppState {
        store: DatasetStore::new(),
        ml: Arc::new(MlClient::new(transport.clone(), ml_url, config.retry)?),
        insight: Arc::new(InsightClient::new(transport, config.llm.clone(), config.retry)),
    };

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("shutting down");
        }
    };
    let (local, server) = server::bind(&addr, state, shutdown)?;
    eprintln!("Listening on http://{}", local);
    server.await?;
    Ok(())
}
