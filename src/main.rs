use anyhow::{Context, Result};
use clap::Parser;
use docgate::connection::auth::Permission;
use docgate::server::{DEFAULT_CONFIG_FILE, GatewayConfig, GatewayServer, init_tracing};
use docgate::{ConnectionConfig, Deployment};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "docgate")]
#[command(about = "HTTP gateway for docstore deployments")]
struct Cli {
    /// Configuration file; created with defaults when missing
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Overrides `web_port` from the configuration
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = GatewayConfig::load_or_create(&cli.config).inspect_err(|err| {
        error!("{}", err);
    })?;
    if let Some(port) = cli.port {
        config.web_port = port;
    }

    let hosts_docstore = config
        .connection
        .starts_with(&format!("{}://", docgate::connection::config::SCHEME));
    let _embedded = match (config.embedded_store, hosts_docstore) {
        (true, true) => Some(start_embedded_store(&config)?),
        (true, false) => {
            warn!(store = %config.connection, "embedded store only serves docstore:// connections, not starting it");
            None
        }
        (false, _) => None,
    };

    let server = GatewayServer::new(config).inspect_err(|err| {
        error!("{}", err);
    })?;
    server.serve().await.context("HTTP server failed")?;
    Ok(())
}

/// Hosts a deployment at the configured store address. Credentials in the
/// connection string become its only (admin) account.
fn start_embedded_store(config: &GatewayConfig) -> Result<Arc<Deployment>> {
    let store = ConnectionConfig::from_url(&config.connection)
        .with_context(|| format!("invalid store connection '{}'", config.connection))?;

    let mut builder = Deployment::builder(&store.address());
    if let Some(username) = store.username.as_deref() {
        builder = builder
            .user(username, store.password.as_deref().unwrap_or(""), vec![Permission::Admin])
            .require_auth(true);
    }

    let deployment = builder.start().context("failed to start embedded store")?;
    info!(address = deployment.address(), "embedded store started");
    Ok(deployment)
}
