use clap::Parser;
use gateway_lib::{
    access::InMemoryTicketDirectory,
    auth::StaticTokenVerifier,
    blob::FlatFileBlobStore,
    config::Settings,
    store::FlatFileMessageStore,
    ws_router, AppState,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Real-time ticket chat gateway
#[derive(Parser, Debug)]
#[command(name = "ticketchat-gateway", version)]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "ticketchat.toml")]
    config: PathBuf,

    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// JSON file mapping credentials to actors for the static verifier
    #[arg(long)]
    tokens: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load_from(&args.config)
        .or_else(|_| Settings::load_from("config/ticketchat.toml"))?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let store = Arc::new(FlatFileMessageStore::new(&settings.data_dir)?);
    let blobs = Arc::new(FlatFileBlobStore::new(&settings.data_dir)?);

    let verifier = match &args.tokens {
        Some(path) => Arc::new(StaticTokenVerifier::from_file(path)?),
        None => {
            tracing::warn!("no --tokens file given; every authenticate will fail");
            Arc::new(StaticTokenVerifier::new())
        },
    };
    tracing::info!(tokens = verifier.len(), "static token verifier loaded");

    // Clients claim unowned tickets on first join when the main
    // application has not seeded ownership
    let access = Arc::new(InMemoryTicketDirectory::new(true));

    let bind_addr = settings.bind_addr;
    let state = AppState::new(settings, store, blobs, verifier, access);
    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "ticketchat gateway listening");

    axum::serve(listener, app).await?;

    Ok(())
}
