use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::middleware::error_handling::{AppError, Result};
use crate::services::sankhya::{EstoqueResult, ProdutoPage};
use crate::AppState;

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct ProdutoQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(rename = "pageSize", default = "default_page_size")]
    pub page_size: i64,
    #[serde(rename = "searchName", default)]
    pub search_name: String,
    #[serde(rename = "searchCode", default)]
    pub search_code: String,
}

/// GET /api/sankhya/produtos
pub async fn listar_produtos(
    State(state): State<AppState>,
    Query(query): Query<ProdutoQuery>,
) -> Result<Json<ProdutoPage>> {
    let page = state
        .catalog
        .consultar_produtos(
            query.page,
            query.page_size,
            &query.search_name,
            &query.search_code,
        )
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct EstoqueQuery {
    #[serde(rename = "codProd")]
    pub cod_prod: Option<String>,
    #[serde(rename = "searchLocal", default)]
    pub search_local: String,
}

/// GET /api/sankhya/produtos/estoque
pub async fn consultar_estoque(
    State(state): State<AppState>,
    Query(query): Query<EstoqueQuery>,
) -> Result<Json<EstoqueResult>> {
    let cod_prod = query
        .cod_prod
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("codProd é obrigatório".to_string()))?;

    let result = state
        .catalog
        .consultar_estoque(cod_prod.trim(), &query.search_local)
        .await?;
    Ok(Json(result))
}
