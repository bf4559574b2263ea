use anyhow::{Context, Result};
use request_directory_gateway::config::GatewayConfig;
use request_directory_gateway::server::GatewayServer;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env().context("Failed to load configuration")?;

    init_tracing(&config.log_level);

    info!("request-directory-gateway starting");
    info!(
        "Configuration loaded: catalog={}, data_dir={}",
        config.catalog_path.display(),
        config.data_dir.display()
    );
    info!(
        "JWT identity: {}, trusted identity header: {}, payload encryption: {}",
        config.identity_jwt_secret.is_some(),
        config.trust_identity_header,
        config.encryption_key.is_some()
    );

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e);
    }

    let server = GatewayServer::new(config).context("Failed to create gateway server")?;

    if let Err(e) = server.run(shutdown_signal()).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("request-directory-gateway stopped");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
