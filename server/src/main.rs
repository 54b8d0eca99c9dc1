use anyhow::Result;
use clap::Parser;
use orbweaver_core::Engine;
use orbweaver_server::build_app;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index database directory
    #[arg(long, default_value = "./orbweaver-db")]
    db: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Maximum results returned per query
    #[arg(long, default_value_t = 50)]
    max_results: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let engine = Arc::new(Mutex::new(Engine::open(&args.db)?));
    let app = build_app(engine.clone(), args.max_results);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;

    engine.lock().commit()?;
    Ok(())
}
