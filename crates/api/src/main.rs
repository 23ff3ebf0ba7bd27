use anyhow::Context;

use campus_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    campus_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let app = campus_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
