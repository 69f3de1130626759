// Product catalog and stock queries against the CRUD gateway.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};

use super::client::{Result, SankhyaClient};
use super::mapper::{map_entities, record_field, MappedRecord, ServiceResponse};

const LOAD_RECORDS_SERVICE: &str = "CRUDServiceProvider.loadRecords";

const PRODUTO_FIELDSET: &str =
    "CODPROD, DESCRPROD, ATIVO, LOCAL, MARCA, CARACTERISTICAS, UNIDADE, VLRCOMERC";
const ESTOQUE_FIELDSET: &str = "ESTOQUE, CODPROD, ATIVO, CONTROLE, CODLOCAL";

// Delays between enrichment calls. The gateway rejects concurrent requests in
// the same session and throttles back-to-back ones; these values are the
// empirical minimum, not a tuning knob.
const DELAY_BETWEEN_LOOKUPS: Duration = Duration::from_millis(50);
const DELAY_BETWEEN_PRODUCTS: Duration = Duration::from_millis(30);

// ============================================================================
// Result Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProdutoPage {
    pub produtos: Vec<MappedRecord>,
    pub total: i64,
    pub page: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

impl ProdutoPage {
    fn empty(page: i64, page_size: i64) -> Self {
        Self {
            produtos: Vec::new(),
            total: 0,
            page,
            page_size,
            total_pages: 0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EstoqueResult {
    pub estoques: Vec<MappedRecord>,
    pub total: usize,
    #[serde(rename = "estoqueTotal")]
    pub estoque_total: f64,
}

// ============================================================================
// Catalog Service
// ============================================================================

pub struct CatalogService {
    client: Arc<SankhyaClient>,
}

impl CatalogService {
    pub fn new(client: Arc<SankhyaClient>) -> Self {
        Self { client }
    }

    /// Paged product listing, each row enriched with its stock total and live
    /// price.
    pub async fn consultar_produtos(
        &self,
        page: i64,
        page_size: i64,
        search_name: &str,
        search_code: &str,
    ) -> Result<ProdutoPage> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let offset = (page - 1) * page_size;

        let mut data_set = json!({
            "rootEntity": "Produto",
            "includePresentationFields": "N",
            "offsetPage": offset.to_string(),
            "limit": page_size.to_string(),
            "entity": {
                "fieldset": {
                    "list": PRODUTO_FIELDSET
                }
            }
        });

        if let Some(expression) = produto_criteria(search_name, search_code) {
            data_set["criteria"] = json!({"expression": {"$": expression}});
        }

        let payload = json!({"requestBody": {"dataSet": data_set}});

        let raw = self
            .client
            .execute(
                &self.client.service_url(LOAD_RECORDS_SERVICE),
                Method::POST,
                Some(&payload),
            )
            .await?;

        let entities = match ServiceResponse::from_value(raw).into_entities() {
            Some(entities) if entities.entity.is_some() => entities,
            _ => {
                tracing::warn!("product query returned no usable entity structure");
                return Ok(ProdutoPage::empty(page, page_size));
            }
        };

        let mut produtos = map_entities(&entities, "CODPROD");

        // The gateway sometimes ignores the limit; never hand back more rows
        // than asked for.
        produtos.truncate(page_size as usize);

        // CONTRACT: the stock and price services reject concurrent requests
        // within one authenticated session, so each product is enriched
        // strictly in sequence. Do not parallelize this loop; doing so is a
        // correctness bug against the upstream API, not a performance choice.
        let mut enriched = Vec::with_capacity(produtos.len());
        for mut produto in produtos {
            let cod_prod = record_field(&produto, "CODPROD");

            match self.consultar_estoque(&cod_prod, "").await {
                Ok(estoque) => {
                    produto.insert(
                        "ESTOQUE".to_string(),
                        Value::String(estoque.estoque_total.to_string()),
                    );

                    tokio::time::sleep(DELAY_BETWEEN_LOOKUPS).await;

                    let preco = self.client.buscar_preco(&cod_prod).await;
                    if preco > 0.0 {
                        produto.insert(
                            "VLRCOMERC".to_string(),
                            Value::String(format!("{:.2}", preco)),
                        );
                    } else if !produto.contains_key("VLRCOMERC") {
                        produto.insert("VLRCOMERC".to_string(), Value::String("0".to_string()));
                    }
                }
                Err(err) => {
                    // One bad product never fails the page.
                    tracing::warn!("stock lookup failed for product {}: {}", cod_prod, err);
                    produto.insert("ESTOQUE".to_string(), Value::String("0".to_string()));
                    if !produto.contains_key("VLRCOMERC") {
                        produto.insert("VLRCOMERC".to_string(), Value::String("0".to_string()));
                    }
                }
            }

            enriched.push(produto);
            tokio::time::sleep(DELAY_BETWEEN_PRODUCTS).await;
        }

        // Pagination metadata is best-effort: authoritative only when the
        // gateway reports a total.
        let (total, total_pages) = match entities.reported_total() {
            Some(total) => (total, (total + page_size - 1) / page_size),
            None => (enriched.len() as i64, 1),
        };

        Ok(ProdutoPage {
            produtos: enriched,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    /// Stock rows for one product, optionally filtered by location, with the
    /// arithmetic total across locations.
    pub async fn consultar_estoque(
        &self,
        cod_prod: &str,
        search_local: &str,
    ) -> Result<EstoqueResult> {
        let payload = json!({
            "requestBody": {
                "dataSet": {
                    "rootEntity": "Estoque",
                    "includePresentationFields": "N",
                    "offsetPage": "0",
                    "entity": {
                        "fieldset": {
                            "list": ESTOQUE_FIELDSET
                        }
                    },
                    "criteria": {
                        "expression": {
                            "$": estoque_criteria(cod_prod, search_local)
                        }
                    }
                }
            }
        });

        let raw = self
            .client
            .execute(
                &self.client.service_url(LOAD_RECORDS_SERVICE),
                Method::POST,
                Some(&payload),
            )
            .await?;

        let entities = match ServiceResponse::from_value(raw).into_entities() {
            Some(entities) if entities.entity.is_some() => entities,
            _ => {
                // No stock rows is a normal answer, not an error.
                return Ok(EstoqueResult {
                    estoques: Vec::new(),
                    total: 0,
                    estoque_total: 0.0,
                });
            }
        };

        let estoques = map_entities(&entities, "CODPROD");
        let estoque_total = somar_estoque(&estoques);

        Ok(EstoqueResult {
            total: estoques.len(),
            estoque_total,
            estoques,
        })
    }
}

// ============================================================================
// Criteria Builders & Aggregation
// ============================================================================

/// Conjunction of the exact code clause and the case-insensitive description
/// clause, each applied only when its argument is non-empty.
fn produto_criteria(search_name: &str, search_code: &str) -> Option<String> {
    let mut filters = Vec::new();

    let code = search_code.trim();
    if !code.is_empty() {
        filters.push(format!("CODPROD = {}", code));
    }

    let name = search_name.trim();
    if !name.is_empty() {
        filters.push(format!("DESCRPROD LIKE '%{}%'", name.to_uppercase()));
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(" AND "))
    }
}

fn estoque_criteria(cod_prod: &str, search_local: &str) -> String {
    let mut expression = format!("CODPROD = {}", cod_prod);

    let local = search_local.trim();
    if !local.is_empty() {
        expression.push_str(&format!(" AND CODLOCAL LIKE '%{}%'", local));
    }

    expression
}

/// Sum of stock quantities; non-numeric or missing quantities count as zero.
fn somar_estoque(estoques: &[MappedRecord]) -> f64 {
    estoques
        .iter()
        .map(|record| {
            record_field(record, "ESTOQUE")
                .trim()
                .parse::<f64>()
                .unwrap_or(0.0)
        })
        .sum()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn estoque_record(quantidade: &str) -> MappedRecord {
        let mut record = MappedRecord::new();
        record.insert(
            "ESTOQUE".to_string(),
            Value::String(quantidade.to_string()),
        );
        record
    }

    #[test]
    fn test_produto_criteria_both_filters() {
        assert_eq!(
            produto_criteria("widget", " 10 ").as_deref(),
            Some("CODPROD = 10 AND DESCRPROD LIKE '%WIDGET%'")
        );
    }

    #[test]
    fn test_produto_criteria_single_filter() {
        assert_eq!(
            produto_criteria("", "10").as_deref(),
            Some("CODPROD = 10")
        );
        assert_eq!(
            produto_criteria("cabo", "").as_deref(),
            Some("DESCRPROD LIKE '%CABO%'")
        );
    }

    #[test]
    fn test_produto_criteria_no_filters() {
        assert_eq!(produto_criteria("", "  "), None);
    }

    #[test]
    fn test_estoque_criteria() {
        assert_eq!(estoque_criteria("7", ""), "CODPROD = 7");
        assert_eq!(
            estoque_criteria("7", "A1"),
            "CODPROD = 7 AND CODLOCAL LIKE '%A1%'"
        );
    }

    #[test]
    fn test_somar_estoque_ignores_non_numeric() {
        let records = vec![
            estoque_record("1.50"),
            estoque_record("2.00"),
            estoque_record(""),
        ];
        assert_eq!(somar_estoque(&records), 3.5);
    }

    #[test]
    fn test_somar_estoque_empty() {
        assert_eq!(somar_estoque(&[]), 0.0);
    }
}
