use anyhow::Context;

use tenantgate_api::app::{self, UserDirectory};
use tenantgate_api::config::ApiConfig;
use tenantgate_infra::SessionSweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tenantgate_observability::init();

    let config = ApiConfig::from_env().context("invalid configuration")?;

    let directory = UserDirectory::new();
    if let Some(path) = &config.dev_users_file {
        directory
            .load_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
    }

    let state = app::services::build_state(&config, &directory)
        .await
        .context("wiring services")?;
    let sweeper = SessionSweeper::spawn(
        state.sessions.clone(),
        state.clock.clone(),
        config.session_sweep_interval,
    );
    let router = app::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
