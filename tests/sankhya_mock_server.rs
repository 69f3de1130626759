// Mock Sankhya Gateway for Testing
// Simulates the login, CRUD query/save and price table endpoints.
// Run with: cargo test --test sankhya_mock_server

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use sankhya_crm::config::SankhyaConfig;
use sankhya_crm::services::sankhya::{
    CatalogService, PartnerService, SankhyaClient, SankhyaError,
};

// ============================================================================
// Mock Data Structures
// ============================================================================

#[derive(Debug, Clone)]
pub struct MockProduto {
    pub codigo: String,
    pub descricao: String,
    pub preco_tabela: String,
}

#[derive(Debug, Default)]
pub struct MockSankhyaState {
    pub login_failures: u32,
    pub login_unauthorized: bool,
    pub login_attempts: u32,
    pub issued_tokens: u32,
    pub valid_tokens: HashSet<String>,
    pub reject_queries: bool,
    pub fail_stock_for: Option<String>,
    pub produtos: Vec<MockProduto>,
    /// product code -> (location, quantity) rows
    pub estoques: HashMap<String, Vec<(String, String)>>,
    pub parceiros: Vec<(String, String, String, String)>, // cod, nome, cgc, cidade
    pub precos: HashMap<String, f64>,
}

type SharedState = Arc<RwLock<MockSankhyaState>>;

// ============================================================================
// Mock Endpoints
// ============================================================================

async fn login(State(state): State<SharedState>) -> Response {
    let mut state = state.write().await;
    state.login_attempts += 1;

    if state.login_failures > 0 {
        state.login_failures -= 1;
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if state.login_unauthorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    state.issued_tokens += 1;
    let token = format!("tok-{}", state.issued_tokens);
    state.valid_tokens.insert(token.clone());

    Json(json!({"bearerToken": token})).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn crud_service(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let state = state.read().await;

    let authorized = bearer_token(&headers)
        .map(|token| state.valid_tokens.contains(&token))
        .unwrap_or(false);
    if !authorized || state.reject_queries {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if body.get("serviceName").and_then(Value::as_str) == Some("DatasetSP.save") {
        return Json(json!({
            "status": "1",
            "responseBody": {"result": [["1"]]}
        }))
        .into_response();
    }

    let data_set = &body["requestBody"]["dataSet"];
    let root_entity = data_set["rootEntity"].as_str().unwrap_or_default();

    match root_entity {
        // The mock deliberately ignores the requested limit so tests can
        // exercise client-side truncation.
        "Produto" => {
            let rows: Vec<Value> = state
                .produtos
                .iter()
                .map(|p| {
                    json!({
                        "f0": {"$": p.codigo},
                        "f1": {"$": p.descricao},
                        "f2": {"$": p.preco_tabela}
                    })
                })
                .collect();

            Json(entities_response(
                &["CODPROD", "DESCRPROD", "VLRCOMERC"],
                rows,
                Some(state.produtos.len()),
            ))
            .into_response()
        }
        "Estoque" => {
            let expression = data_set["criteria"]["expression"]["$"]
                .as_str()
                .unwrap_or_default();
            let cod_prod = criteria_codprod(expression);

            if state.fail_stock_for.as_deref() == Some(cod_prod.as_str()) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"statusMessage": "Consulta de estoque rejeitada"})),
                )
                    .into_response();
            }

            let rows: Vec<Value> = state
                .estoques
                .get(&cod_prod)
                .map(|rows| {
                    rows.iter()
                        .map(|(local, quantidade)| {
                            json!({
                                "f0": {"$": quantidade},
                                "f1": {"$": cod_prod},
                                "f2": {"$": local}
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            Json(entities_response(
                &["ESTOQUE", "CODPROD", "CODLOCAL"],
                rows,
                None,
            ))
            .into_response()
        }
        "Parceiro" => {
            let rows: Vec<Value> = state
                .parceiros
                .iter()
                .map(|(cod, nome, cgc, cidade)| {
                    json!({
                        "f0": {"$": cod},
                        "f1": {"$": nome},
                        "f2": {"$": cgc},
                        "f3": {"$": cidade}
                    })
                })
                .collect();

            Json(entities_response(
                &["CODPARC", "NOMEPARC", "CGC_CPF", "NOMECID"],
                rows,
                Some(state.parceiros.len()),
            ))
            .into_response()
        }
        "CabecalhoNota" => Json(entities_response(&["NUNOTA"], Vec::new(), None)).into_response(),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn preco(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((cod_prod, _tabela)): Path<(String, String)>,
) -> Response {
    let state = state.read().await;

    let authorized = bearer_token(&headers)
        .map(|token| state.valid_tokens.contains(&token))
        .unwrap_or(false);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.precos.get(&cod_prod) {
        Some(valor) => {
            Json(json!({"produtos": [{"valor": format!("{:.2}", valor)}]})).into_response()
        }
        None => Json(json!({"produtos": []})).into_response(),
    }
}

/// Wire-shaped entities block. A single row is emitted as a bare object (the
/// gateway quirk the mapper has to normalize); no rows means no `entity` key.
fn entities_response(fields: &[&str], mut rows: Vec<Value>, total: Option<usize>) -> Value {
    let field_list: Vec<Value> = fields.iter().map(|name| json!({"name": name})).collect();

    let mut entities = json!({
        "metadata": {"fields": {"field": field_list}}
    });

    match rows.len() {
        0 => {}
        1 => entities["entity"] = rows.remove(0),
        _ => entities["entity"] = Value::Array(rows),
    }
    if let Some(total) = total {
        entities["total"] = Value::String(total.to_string());
    }

    json!({"responseBody": {"entities": entities}})
}

fn criteria_codprod(expression: &str) -> String {
    expression
        .strip_prefix("CODPROD = ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn create_mock_gateway(state: SharedState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/gateway/v1/mge/service.sbr", post(crud_service))
        .route("/v1/precos/produto/:cod/tabela/:tabela", get(preco))
        .with_state(state)
}

pub async fn start_mock_gateway(state: SharedState) -> String {
    let app = create_mock_gateway(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server time to start
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    format!("http://{}", addr)
}

fn seeded_state() -> SharedState {
    let mut estoques = HashMap::new();
    estoques.insert(
        "10".to_string(),
        vec![
            ("A1".to_string(), "1.50".to_string()),
            ("B2".to_string(), "2.00".to_string()),
            ("C3".to_string(), "".to_string()),
        ],
    );
    estoques.insert("30".to_string(), vec![("A1".to_string(), "4.00".to_string())]);

    let mut precos = HashMap::new();
    precos.insert("10".to_string(), 12.34);

    Arc::new(RwLock::new(MockSankhyaState {
        produtos: vec![
            MockProduto {
                codigo: "10".to_string(),
                descricao: "Cabo HDMI".to_string(),
                preco_tabela: "50.00".to_string(),
            },
            MockProduto {
                codigo: "20".to_string(),
                descricao: "Mouse Sem Fio".to_string(),
                preco_tabela: "99.90".to_string(),
            },
            MockProduto {
                codigo: "30".to_string(),
                descricao: "Teclado Mecânico".to_string(),
                preco_tabela: "30.00".to_string(),
            },
        ],
        parceiros: vec![(
            "1".to_string(),
            "ACME Ltda".to_string(),
            "12345678000199".to_string(),
            "São Paulo".to_string(),
        )],
        estoques,
        precos,
        ..Default::default()
    }))
}

fn make_client(base_url: &str) -> SankhyaClient {
    SankhyaClient::new(SankhyaConfig {
        base_url: base_url.to_string(),
        token: "test-token".to_string(),
        app_key: "test-appkey".to_string(),
        username: "tester".to_string(),
        password: "secret".to_string(),
    })
    .unwrap()
}

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_obtained_after_two_server_errors() {
        let state = seeded_state();
        state.write().await.login_failures = 2;
        let url = start_mock_gateway(state.clone()).await;

        let client = make_client(&url);
        let token = client.get_token().await.unwrap();

        assert_eq!(token, "tok-1");
        assert_eq!(state.read().await.login_attempts, 3);
    }

    #[tokio::test]
    async fn test_login_unauthorized_fails_without_retry() {
        let state = seeded_state();
        state.write().await.login_unauthorized = true;
        let url = start_mock_gateway(state.clone()).await;

        let client = make_client(&url);
        let result = client.get_token().await;

        assert!(matches!(result, Err(SankhyaError::Auth(_))));
        assert_eq!(state.read().await.login_attempts, 1);
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let state = seeded_state();
        let url = start_mock_gateway(state.clone()).await;

        let client = make_client(&url);
        let first = client.get_token().await.unwrap();
        let second = client.get_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(state.read().await.issued_tokens, 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed_once() {
        let state = seeded_state();
        let url = start_mock_gateway(state.clone()).await;

        let client = Arc::new(make_client(&url));
        client.get_token().await.unwrap();

        // Simulate upstream session expiry: the held token stops working.
        state.write().await.valid_tokens.clear();

        let catalog = CatalogService::new(client);
        let result = catalog.consultar_estoque("10", "").await.unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(state.read().await.issued_tokens, 2);
    }

    #[tokio::test]
    async fn test_second_unauthorized_fails_with_session_expired() {
        let state = seeded_state();
        state.write().await.reject_queries = true;
        let url = start_mock_gateway(state.clone()).await;

        let catalog = CatalogService::new(Arc::new(make_client(&url)));
        let result = catalog.consultar_estoque("10", "").await;

        assert!(matches!(result, Err(SankhyaError::SessionExpired)));
        // One refresh attempt and no more
        assert_eq!(state.read().await.issued_tokens, 2);
    }

    #[tokio::test]
    async fn test_stock_total_sums_and_tolerates_blank_quantity() {
        let state = seeded_state();
        let url = start_mock_gateway(state).await;

        let catalog = CatalogService::new(Arc::new(make_client(&url)));
        let result = catalog.consultar_estoque("10", "").await.unwrap();

        assert_eq!(result.estoques.len(), 3);
        assert_eq!(result.total, 3);
        assert_eq!(result.estoque_total, 3.5);
    }

    #[tokio::test]
    async fn test_stock_empty_result_is_zero_not_error() {
        let state = seeded_state();
        let url = start_mock_gateway(state).await;

        let catalog = CatalogService::new(Arc::new(make_client(&url)));
        let result = catalog.consultar_estoque("99", "").await.unwrap();

        assert!(result.estoques.is_empty());
        assert_eq!(result.estoque_total, 0.0);
    }

    #[tokio::test]
    async fn test_single_stock_row_arrives_as_bare_object() {
        let state = seeded_state();
        let url = start_mock_gateway(state).await;

        let catalog = CatalogService::new(Arc::new(make_client(&url)));
        let result = catalog.consultar_estoque("30", "").await.unwrap();

        assert_eq!(result.total, 1);
        assert_eq!(result.estoque_total, 4.0);
    }

    #[tokio::test]
    async fn test_catalog_page_is_truncated_to_page_size() {
        let state = seeded_state();
        let url = start_mock_gateway(state).await;

        let catalog = CatalogService::new(Arc::new(make_client(&url)));
        let page = catalog.consultar_produtos(1, 2, "", "").await.unwrap();

        // The mock returns 3 rows regardless of limit
        assert_eq!(page.produtos.len(), 2);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 2);
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades_single_product() {
        let state = seeded_state();
        state.write().await.fail_stock_for = Some("20".to_string());
        let url = start_mock_gateway(state).await;

        let catalog = CatalogService::new(Arc::new(make_client(&url)));
        let page = catalog.consultar_produtos(1, 10, "", "").await.unwrap();

        assert_eq!(page.produtos.len(), 3);

        // Item 1: stock summed, live price applied
        assert_eq!(page.produtos[0]["ESTOQUE"], "3.5");
        assert_eq!(page.produtos[0]["VLRCOMERC"], "12.34");

        // Item 2: stock lookup failed, zeroed stock and static catalog price
        assert_eq!(page.produtos[1]["ESTOQUE"], "0");
        assert_eq!(page.produtos[1]["VLRCOMERC"], "99.90");

        // Item 3: enriched; no live price, so the catalog price stands
        assert_eq!(page.produtos[2]["ESTOQUE"], "4");
        assert_eq!(page.produtos[2]["VLRCOMERC"], "30.00");
    }

    #[tokio::test]
    async fn test_partner_page_and_save() {
        let state = seeded_state();
        let url = start_mock_gateway(state).await;

        let partners = PartnerService::new(Arc::new(make_client(&url)));

        let page = partners.consultar_parceiros(1, 10).await.unwrap();
        assert_eq!(page.parceiros.len(), 1);
        assert_eq!(page.parceiros[0]["NOMEPARC"], "ACME Ltda");
        assert_eq!(page.parceiros[0]["_id"], "1");

        let mut payload = serde_json::Map::new();
        payload.insert("NOMEPARC".to_string(), Value::String("Nova".to_string()));
        let result = partners.salvar_parceiro(payload).await.unwrap();
        assert_eq!(result["status"], "1");
    }

    #[tokio::test]
    async fn test_order_listing_empty() {
        let state = seeded_state();
        let url = start_mock_gateway(state).await;

        let partners = PartnerService::new(Arc::new(make_client(&url)));
        let pedidos = partners.listar_pedidos(1, 10).await.unwrap();
        assert!(pedidos.is_empty());
    }
}
