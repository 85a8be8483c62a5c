//! Binary entry point: loads configuration, wires up a `Context`, and
//! serves the HTTP API on every configured port until asked to shut down.

use std::sync::Arc;

use confrepo_core::config::Config;
use confrepo_core::context::Context;
use confrepo_core::server;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "confrepo.json".to_string());
    let config_text = tokio::fs::read_to_string(&config_path).await?;
    let config: Config = Config::from_json_str(&config_text)?;

    let ports = config.ports.clone();
    let context = Arc::new(Context::new(config).await?);
    context.executor.catch_up().await?;

    let app = server::router(context.clone());

    let mut listeners = Vec::new();
    for port in &ports {
        let addr = format!("{}:{}", port.local_address.host, port.local_address.port);
        tracing::info!(%addr, protocol = %port.protocol, "binding listener");
        listeners.push(tokio::net::TcpListener::bind(&addr).await?);
    }
    if listeners.is_empty() {
        tracing::info!("binding default listener on 127.0.0.1:8080");
        listeners.push(tokio::net::TcpListener::bind("127.0.0.1:8080").await?);
    }

    let mut servers = Vec::new();
    for listener in listeners {
        let app = app.clone();
        servers.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "listener exited with an error");
            }
        }));
    }

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight requests");
    context.begin_shutdown();

    for server in servers {
        server.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
