pub mod config;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use config::AppConfig;
use services::{CatalogService, GeminiChatService, PartnerService, SankhyaClient};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<CatalogService>,
    pub partners: Arc<PartnerService>,
    pub chat: Arc<GeminiChatService>,
}

impl AppState {
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let client = Arc::new(SankhyaClient::new(config.sankhya.clone())?);
        let catalog = Arc::new(CatalogService::new(client.clone()));
        let partners = Arc::new(PartnerService::new(client));
        let chat = Arc::new(GeminiChatService::new(
            config.gemini.clone(),
            catalog.clone(),
            partners.clone(),
        ));

        Ok(Self {
            config,
            catalog,
            partners,
            chat,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    use handlers::{
        chat::chat,
        parceiros::{listar_parceiros, salvar_parceiro},
        pedidos::listar_pedidos,
        produtos::{consultar_estoque, listar_produtos},
    };

    let cors_origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(header_val) => Some(header_val),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest(
            "/api/sankhya",
            Router::new()
                .route("/produtos", get(listar_produtos))
                .route("/produtos/estoque", get(consultar_estoque))
                .route("/parceiros", get(listar_parceiros))
                .route("/parceiros/salvar", post(salvar_parceiro))
                .route("/pedidos/listar", get(listar_pedidos)),
        )
        .route("/api/chat", post(chat))
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "ok"})) }),
        )
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
        .layer(axum::middleware::from_fn(
            |req: Request<Body>, next: Next| async move {
                tracing::info!("{} {}", req.method(), req.uri());
                let response = next.run(req).await;
                tracing::info!("Response status: {}", response.status());
                response
            },
        ))
}
