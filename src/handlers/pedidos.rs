use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::middleware::error_handling::Result;
use crate::services::sankhya::MappedRecord;
use crate::AppState;

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct PedidoQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(rename = "pageSize", default = "default_page_size")]
    pub page_size: i64,
}

/// GET /api/sankhya/pedidos/listar
pub async fn listar_pedidos(
    State(state): State<AppState>,
    Query(query): Query<PedidoQuery>,
) -> Result<Json<Vec<MappedRecord>>> {
    let pedidos = state
        .partners
        .listar_pedidos(query.page, query.page_size)
        .await?;
    Ok(Json(pedidos))
}
