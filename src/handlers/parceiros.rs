use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::middleware::error_handling::Result;
use crate::services::sankhya::ParceiroPage;
use crate::AppState;

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct ParceiroQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(rename = "pageSize", default = "default_page_size")]
    pub page_size: i64,
}

/// GET /api/sankhya/parceiros
pub async fn listar_parceiros(
    State(state): State<AppState>,
    Query(query): Query<ParceiroQuery>,
) -> Result<Json<ParceiroPage>> {
    let page = state
        .partners
        .consultar_parceiros(query.page, query.page_size)
        .await?;
    Ok(Json(page))
}

/// POST /api/sankhya/parceiros/salvar
///
/// Forwards the partner payload to the save service and returns its result,
/// or a 500 carrying the upstream error message.
pub async fn salvar_parceiro(
    State(state): State<AppState>,
    Json(payload): Json<Map<String, Value>>,
) -> impl IntoResponse {
    tracing::info!("saving partner record");

    match state.partners.salvar_parceiro(payload).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(err) => {
            tracing::error!("failed to save partner: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
        }
    }
}
