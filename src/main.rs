use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use calbot::config::AppConfig;
use calbot::handlers;
use calbot::services::ai::openai::OpenAiProvider;
use calbot::services::provider::calcom::CalComProvider;
use calbot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    config.validate()?;

    tracing::info!(
        "using {} LLM provider (model: {}, url: {})",
        config.llm_provider,
        config.llm_model,
        config.llm_base_url
    );
    let llm = OpenAiProvider::new(
        config.llm_api_key.clone(),
        config.llm_base_url.clone(),
        config.llm_model.clone(),
        config.llm_timeout,
    )?;

    tracing::info!(username = %config.cal_username, time_zone = %config.time_zone, "using Cal.com scheduling provider");
    let scheduler = CalComProvider::new(
        config.cal_api_key.clone(),
        config.cal_username.clone(),
        config.cal_api_url.clone(),
        config.time_zone,
        config.provider_timeout,
    )?;

    let addr = config.bind_addr();
    let state = Arc::new(AppState {
        config,
        llm: Box::new(llm),
        scheduler: Box::new(scheduler),
    });

    let app = handlers::router(state);

    tracing::info!("starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
