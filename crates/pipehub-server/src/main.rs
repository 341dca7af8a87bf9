use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use pipehub_server::{build_router, driver_task, HubSettings, HubState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pipehub_core=info,pipehub_server=info")),
        )
        .init();

    let settings = HubSettings::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let addr = settings.bind_addr.clone();

    let state = HubState::new(settings).context("initialize hub state")?;
    driver_task::spawn(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    let app = build_router(state);

    tracing::info!("pipehub API listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
