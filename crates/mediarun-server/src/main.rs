//! Mediarun HTTP Server
//!
//! Thin transport layer over the streaming execution engine: routes
//! media commands to the engine, streams their event frames to the
//! client as SSE, and stores finished task metadata.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod http;
mod state;

use state::AppState;

/// Mediarun server.
#[derive(Parser, Debug)]
#[command(name = "mediarun-server", about = "Streams media command executions over SSE")]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1:9090")]
    bind: String,

    /// Directory served under /static.
    #[arg(long, default_value = "static")]
    static_dir: PathBuf,

    /// Index page served at /.
    #[arg(long, default_value = "pages/index.html")]
    index: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let addr: SocketAddr = args.bind.parse()?;

    let state = AppState::new();
    let router = http::create_router(state, &args.static_dir, &args.index);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Mediarun server listening");

    axum::serve(listener, router).await?;
    Ok(())
}
