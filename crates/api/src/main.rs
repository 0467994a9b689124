use anyhow::Context;

use spadesk_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    spadesk_observability::init();

    let config = AppConfig::load().context("invalid configuration")?;
    let app = spadesk_api::app::build_app(&config)
        .await
        .context("failed to start services")?;

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
