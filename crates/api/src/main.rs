use anyhow::Context;

use boardcp_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    boardcp_observability::init();

    let config = ApiConfig::from_env()?;
    let app = boardcp_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
