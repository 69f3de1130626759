// Partner and order queries, plus the partner save pass-through.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::client::{Result, SankhyaClient, SankhyaError};
use super::mapper::{map_entities, MappedRecord, ServiceResponse};

const LOAD_RECORDS_SERVICE: &str = "CRUDServiceProvider.loadRecords";
const SAVE_SERVICE: &str = "DatasetSP.save";

const PARCEIRO_FIELDSET: &str = "CODPARC, NOMEPARC, CGC_CPF, NOMECID, ATIVO";
const PEDIDO_FIELDSET: &str = "NUNOTA, NOMEPARC, VLRNOTA, DTNEG";

// ============================================================================
// Result Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ParceiroPage {
    pub parceiros: Vec<MappedRecord>,
    pub total: i64,
    pub page: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

// ============================================================================
// Partner Service
// ============================================================================

pub struct PartnerService {
    client: Arc<SankhyaClient>,
}

impl PartnerService {
    pub fn new(client: Arc<SankhyaClient>) -> Self {
        Self { client }
    }

    /// Paged partner listing. Same pagination conventions as the product
    /// catalog, without the enrichment pass.
    pub async fn consultar_parceiros(&self, page: i64, page_size: i64) -> Result<ParceiroPage> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let offset = (page - 1) * page_size;

        let entities = self
            .load_records("Parceiro", PARCEIRO_FIELDSET, offset, page_size)
            .await?;

        let entities = match entities {
            Some(entities) if entities.entity.is_some() => entities,
            _ => {
                return Ok(ParceiroPage {
                    parceiros: Vec::new(),
                    total: 0,
                    page,
                    page_size,
                    total_pages: 0,
                })
            }
        };

        let mut parceiros = map_entities(&entities, "CODPARC");
        parceiros.truncate(page_size as usize);

        let (total, total_pages) = match entities.reported_total() {
            Some(total) => (total, (total + page_size - 1) / page_size),
            None => (parceiros.len() as i64, 1),
        };

        Ok(ParceiroPage {
            parceiros,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    /// Most recent orders (nota headers), newest first by document number.
    pub async fn listar_pedidos(&self, page: i64, page_size: i64) -> Result<Vec<MappedRecord>> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let offset = (page - 1) * page_size;

        let entities = self
            .load_records("CabecalhoNota", PEDIDO_FIELDSET, offset, page_size)
            .await?;

        let entities = match entities {
            Some(entities) if entities.entity.is_some() => entities,
            _ => return Ok(Vec::new()),
        };

        let mut pedidos = map_entities(&entities, "NUNOTA");
        pedidos.truncate(page_size as usize);
        Ok(pedidos)
    }

    /// Forward a partner payload to the dataset save service.
    ///
    /// Fields are transmitted positionally (`localFields` order drives the
    /// `values` indexes); a non-empty `CODPARC` in the payload turns the save
    /// into an update keyed by it.
    pub async fn salvar_parceiro(&self, payload: Map<String, Value>) -> Result<Value> {
        let cod_parc = payload
            .get("CODPARC")
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let fields: Vec<String> = payload
            .keys()
            .filter(|name| *name != "CODPARC" && *name != "_id")
            .cloned()
            .collect();

        if fields.is_empty() {
            return Err(SankhyaError::Upstream(
                "nenhum campo informado para salvar o parceiro".to_string(),
            ));
        }

        let mut values = Map::new();
        for (index, name) in fields.iter().enumerate() {
            values.insert(index.to_string(), payload[name].clone());
        }

        let mut record = json!({"values": values});
        if let Some(cod_parc) = &cod_parc {
            record["pk"] = json!({"CODPARC": cod_parc});
        }

        let body = json!({
            "serviceName": SAVE_SERVICE,
            "requestBody": {
                "entityName": "Parceiro",
                "standAlone": false,
                "fields": fields,
                "records": [record]
            }
        });

        let response = self
            .client
            .execute(
                &self.client.service_url(SAVE_SERVICE),
                Method::POST,
                Some(&body),
            )
            .await?;

        // The gateway answers 200 even on rejected saves; the real outcome is
        // in the status field.
        if let Some(status) = response.get("status").and_then(Value::as_str) {
            if status != "1" {
                let message = response
                    .get("statusMessage")
                    .and_then(Value::as_str)
                    .unwrap_or("falha ao salvar parceiro")
                    .to_string();
                return Err(SankhyaError::Upstream(message));
            }
        }

        Ok(response)
    }

    async fn load_records(
        &self,
        root_entity: &str,
        fieldset: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Option<super::mapper::Entities>> {
        let payload = json!({
            "requestBody": {
                "dataSet": {
                    "rootEntity": root_entity,
                    "includePresentationFields": "N",
                    "offsetPage": offset.to_string(),
                    "limit": limit.to_string(),
                    "entity": {
                        "fieldset": {
                            "list": fieldset
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

        Ok(ServiceResponse::from_value(raw).into_entities())
    }
}

// ============================================================================
// Tests
// ============================================================================
