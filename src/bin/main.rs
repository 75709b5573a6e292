// Atelier node: wires the store, the signing gateway, the crank and the
// HTTP surface together, then runs until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;
use serde::Deserialize;

use atelier_engine::{AuctionHouse, Crank, HouseRules};
use atelier_ledger::{AssetService, GatewayClient, LedgerClient};
use atelier_store::Store;

#[derive(Parser)]
#[command(name = "atelier", about = "Atelier auction house node")]
struct Args {
    /// Config file stem (TOML/YAML/JSON); env vars ATELIER_* override it.
    #[arg(short, long, default_value = "atelier")]
    config: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_db_path() -> String {
    "atelier-db".to_string()
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8899".to_string()
}

#[derive(Debug, Deserialize)]
struct NodeConfig {
    #[serde(default = "default_listen")]
    listen: String,
    #[serde(default = "default_db_path")]
    db_path: String,
    #[serde(default = "default_gateway_url")]
    gateway_url: String,
    #[serde(default)]
    rules: HouseRules,
}

fn load_config(stem: &str) -> anyhow::Result<NodeConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(stem).required(false))
        .add_source(config::Environment::with_prefix("ATELIER").separator("__"))
        .build()
        .context("assembling configuration")?;
    cfg.try_deserialize().context("deserializing configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let cfg = load_config(&args.config)?;

    let store = Arc::new(Store::open(&cfg.db_path).context("opening store")?);
    let gateway = Arc::new(GatewayClient::new(cfg.gateway_url.clone()));
    let ledger: Arc<dyn LedgerClient> = gateway.clone();
    let assets: Arc<dyn AssetService> = gateway;

    let house = Arc::new(AuctionHouse::new(
        store.clone(),
        ledger,
        assets,
        cfg.rules.clone(),
    )?);

    let crank = Crank::new(
        house.clone(),
        Duration::from_secs(cfg.rules.crank_interval_secs),
    );
    let crank_handle = crank.clone().spawn();

    let addr: SocketAddr = cfg.listen.parse().context("parsing listen address")?;
    info!("atelier node listening on {addr}, gateway {}", cfg.gateway_url);

    let (_, server) =
        warp::serve(atelier_rpc::routes(house)).bind_with_graceful_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
        });
    server.await;

    info!("shutting down");
    crank.shutdown();
    let _ = crank_handle.await;
    store.flush()?;
    Ok(())
}
