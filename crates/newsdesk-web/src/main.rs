use anyhow::{Context, Result};
use clap::Parser;
use newsdesk::Config;
use tracing::info;

mod page;
mod routes;
mod state;

use state::AppState;

#[derive(Parser)]
#[command(name = "newsdesk-web")]
#[command(about = "Web UI for the two-stage news curation workflow")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Never call a model, even when API keys are configured
    #[arg(long)]
    no_llm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    newsdesk::init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;

    let state = AppState::new(config, !args.no_llm);
    let app = routes::router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("listening on http://{}", addr);
    println!("🌐 Newsdesk running at http://{addr}");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
