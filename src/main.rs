use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sankhya_crm::config::AppConfig;
use sankhya_crm::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO; override with RUST_LOG for debugging.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "sankhya_crm=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let addr = config.server_address();

    let state = AppState::from_config(config)?;
    let app = create_app(state);

    tracing::info!("Starting Sankhya CRM server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
