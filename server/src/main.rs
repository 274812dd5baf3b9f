use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use searchcore::EngineConfig;
use server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: PathBuf,
    /// Engine configuration JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Link graph (`nodeID;out1,out2,...`) used by HITS ranking
    #[arg(long)]
    links: Option<PathBuf>,
    /// Node titles (`nodeID;title`)
    #[arg(long)]
    titles: Option<PathBuf>,
    /// Precomputed importance scores (`docName;score`)
    #[arg(long)]
    importance: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(p) => EngineConfig::load(p).with_context(|| format!("loading config {}", p.display()))?,
        None => EngineConfig::default(),
    };
    cfg.index_dir = args.index;
    cfg.links_file = args.links.or(cfg.links_file);
    cfg.titles_file = args.titles.or(cfg.titles_file);
    cfg.importance_file = args.importance.or(cfg.importance_file);

    let app: Router = build_app(cfg)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
