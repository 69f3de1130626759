/// Sales-assistant chat service backed by the Gemini streaming API.
/// Injects a one-time snapshot of ERP data (partners, products, orders) into
/// the first user turn of a conversation and re-emits the model's stream as
/// SSE-style chunks terminated by a `[DONE]` sentinel.

use std::sync::Arc;

use futures::channel::mpsc::{unbounded, UnboundedReceiver};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::GeminiConfig;
use crate::middleware::error_handling::{AppError, Result};
use crate::services::sankhya::{record_field, CatalogService, MappedRecord, PartnerService};

const GENERATION_MAX_TOKENS: u32 = 2000;

// Only the first N of each collection go into the snapshot; the point is
// grounding, not a data dump.
const SNAPSHOT_LIMIT: i64 = 20;

const SYSTEM_PROMPT: &str = "Você é um Assistente de Vendas Inteligente integrado em uma ferramenta de CRM/Força de Vendas chamada Sankhya CRM.

SEU PAPEL:
- Ajudar vendedores a identificar oportunidades de vendas
- Sugerir ações estratégicas para fechar negócios
- Sugerir produtos que podem interessar aos clientes

REGRA IMPORTANTE SOBRE PRODUTOS:
Você receberá uma lista de produtos com suas quantidades em estoque.
NUNCA mencione produtos que não estejam explicitamente listados nos dados fornecidos.
Se não houver produtos na lista, informe que não há produtos cadastrados no momento.

COMO AGIR:
1. Sempre analise os dados fornecidos antes de responder
2. Use métricas e números concretos em suas análises
3. Seja direto e focado em resultados de vendas

Sempre que o usuário fizer uma pergunta, considere os dados do sistema disponíveis para dar respostas contextualizadas e acionáveis.";

const SYSTEM_ACK: &str = "Entendido! Sou seu Assistente de Vendas no Sankhya CRM. Estou pronto para analisar seus dados e ajudar você a vender mais. Como posso ajudar?";

// ============================================================================
// Request Models
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String, // "user" or "assistant"
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

// ============================================================================
// Gemini Chat Service
// ============================================================================

pub struct GeminiChatService {
    config: GeminiConfig,
    http_client: reqwest::Client,
    catalog: Arc<CatalogService>,
    partners: Arc<PartnerService>,
}

impl GeminiChatService {
    pub fn new(
        config: GeminiConfig,
        catalog: Arc<CatalogService>,
        partners: Arc<PartnerService>,
    ) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            catalog,
            partners,
        }
    }

    /// Send a chat turn and stream back response chunks.
    ///
    /// Each stream item is the payload of one SSE `data:` line — a
    /// `{"text": ...}` JSON object per chunk, then the literal `[DONE]`.
    pub async fn stream_chat(&self, request: ChatRequest) -> Result<UnboundedReceiver<String>> {
        // The data snapshot rides only on the first user turn; later turns
        // reuse what is already in the history.
        let message = if request.history.is_empty() {
            tracing::info!("first chat turn, loading ERP data snapshot");
            match self.montar_contexto().await {
                Some(contexto) => format!(
                    "DADOS DO SISTEMA (para contexto da sua análise):\n\n{}\n\nPERGUNTA DO USUÁRIO:\n{}",
                    contexto, request.message
                ),
                None => request.message.clone(),
            }
        } else {
            request.message.clone()
        };

        let mut contents = vec![
            json!({"role": "user", "parts": [{"text": SYSTEM_PROMPT}]}),
            json!({"role": "model", "parts": [{"text": SYSTEM_ACK}]}),
        ];
        for msg in &request.history {
            let role = if msg.role == "assistant" { "model" } else { "user" };
            contents.push(json!({"role": role, "parts": [{"text": msg.content}]}));
        }
        contents.push(json!({"role": "user", "parts": [{"text": message}]}));

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.config.base_url, self.config.model, self.config.api_key
        );

        let body = json!({
            "contents": contents,
            "generationConfig": {"maxOutputTokens": GENERATION_MAX_TOKENS}
        });

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Gemini API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Gemini API error ({}): {}", status, error_body);
            return Err(AppError::Internal(anyhow::anyhow!(
                "Gemini API returned error {}",
                status
            )));
        }

        let (tx, rx) = unbounded::<String>();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(newline) = buffer.find('\n') {
                            let line = buffer[..newline].trim().to_string();
                            buffer.drain(..=newline);

                            let Some(payload) = line.strip_prefix("data:") else {
                                continue;
                            };
                            let payload = payload.trim();
                            if payload.is_empty() || payload == "[DONE]" {
                                continue;
                            }
                            if let Some(text) = extract_chunk_text(payload) {
                                let event = json!({"text": text}).to_string();
                                if tx.unbounded_send(event).is_err() {
                                    return; // client went away
                                }
                            }
                        }
                    }
                    Err(err) => {
                        tracing::error!("Gemini stream interrupted: {}", err);
                        break;
                    }
                }
            }

            let _ = tx.unbounded_send("[DONE]".to_string());
        });

        Ok(rx)
    }

    /// Snapshot of ERP data for grounding. Each section degrades to empty on
    /// failure; the chat must still answer without it.
    async fn montar_contexto(&self) -> Option<String> {
        let produtos = self
            .catalog
            .consultar_produtos(1, SNAPSHOT_LIMIT, "", "")
            .await;
        let parceiros = self.partners.consultar_parceiros(1, SNAPSHOT_LIMIT).await;
        let pedidos = self.partners.listar_pedidos(1, SNAPSHOT_LIMIT).await;

        if produtos.is_err() && parceiros.is_err() && pedidos.is_err() {
            tracing::warn!("snapshot unavailable, answering without ERP context");
            return None;
        }

        let (produtos, total_produtos) = match produtos {
            Ok(page) => (page.produtos, page.total),
            Err(err) => {
                tracing::warn!("snapshot product fetch failed: {}", err);
                (Vec::new(), 0)
            }
        };
        let (parceiros, total_parceiros) = match parceiros {
            Ok(page) => (page.parceiros, page.total),
            Err(err) => {
                tracing::warn!("snapshot partner fetch failed: {}", err);
                (Vec::new(), 0)
            }
        };
        let pedidos = pedidos.unwrap_or_else(|err| {
            tracing::warn!("snapshot order fetch failed: {}", err);
            Vec::new()
        });

        Some(format_contexto(
            &produtos,
            total_produtos,
            &parceiros,
            total_parceiros,
            &pedidos,
        ))
    }
}

// ============================================================================
// Snapshot Formatting
// ============================================================================

fn format_contexto(
    produtos: &[MappedRecord],
    total_produtos: i64,
    parceiros: &[MappedRecord],
    total_parceiros: i64,
    pedidos: &[MappedRecord],
) -> String {
    let mut contexto = String::new();

    contexto.push_str(&format!(
        "RESUMO GERAL (em {}):\n- Total de Parceiros/Clientes: {}\n- Total de Produtos: {}\n- Total de Pedidos: {}\n",
        chrono::Local::now().format("%d/%m/%Y"),
        total_parceiros,
        total_produtos,
        pedidos.len()
    ));

    contexto.push_str(&format!(
        "\nPARCEIROS/CLIENTES ({} primeiros):\n",
        parceiros.len()
    ));
    for parceiro in parceiros {
        contexto.push_str(&format!(
            "- {} | CPF/CNPJ: {} | Cidade: {}\n",
            non_empty(record_field(parceiro, "NOMEPARC")),
            non_empty(record_field(parceiro, "CGC_CPF")),
            non_empty(record_field(parceiro, "NOMECID")),
        ));
    }

    contexto.push_str(&format!(
        "\nPRODUTOS DISPONÍVEIS ({} produtos cadastrados):\n",
        produtos.len()
    ));
    for produto in produtos {
        let estoque: f64 = record_field(produto, "ESTOQUE").parse().unwrap_or(0.0);
        contexto.push_str(&format!(
            "- {} | Estoque: {:.2} unidades | Preço: R$ {}\n",
            non_empty(record_field(produto, "DESCRPROD")),
            estoque,
            non_empty(record_field(produto, "VLRCOMERC")),
        ));
    }
    contexto.push_str(
        "\nIMPORTANTE: Use APENAS os produtos listados acima. Não invente ou mencione produtos que não estão nesta lista.\n",
    );

    contexto.push_str(&format!("\nPEDIDOS ({} mais recentes):\n", pedidos.len()));
    for pedido in pedidos {
        contexto.push_str(&format!(
            "- Pedido #{} | Cliente: {} | Valor: R$ {} | Data: {}\n",
            non_empty(record_field(pedido, "NUNOTA")),
            non_empty(record_field(pedido, "NOMEPARC")),
            non_empty(record_field(pedido, "VLRNOTA")),
            non_empty(record_field(pedido, "DTNEG")),
        ));
    }

    contexto
}

fn non_empty(value: String) -> String {
    if value.is_empty() {
        "N/A".to_string()
    } else {
        value
    }
}

/// Text of one Gemini stream chunk, if it carries any.
fn extract_chunk_text(payload: &str) -> Option<String> {
    let chunk: Value = serde_json::from_str(payload).ok()?;
    let parts = chunk
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_chunk_text() {
        let payload = r#"{"candidates":[{"content":{"parts":[{"text":"Olá, "},{"text":"vendedor!"}]}}]}"#;
        assert_eq!(extract_chunk_text(payload).as_deref(), Some("Olá, vendedor!"));
    }

    #[test]
    fn test_extract_chunk_text_without_text() {
        assert_eq!(extract_chunk_text(r#"{"candidates":[]}"#), None);
        assert_eq!(extract_chunk_text("not json"), None);
    }

    #[test]
    fn test_format_contexto_lists_products_with_stock() {
        let mut produto = MappedRecord::new();
        produto.insert("DESCRPROD".to_string(), "Widget".into());
        produto.insert("ESTOQUE".to_string(), "3.5".into());
        produto.insert("VLRCOMERC".to_string(), "12.00".into());

        let contexto = format_contexto(&[produto], 1, &[], 0, &[]);
        assert!(contexto.contains("- Widget | Estoque: 3.50 unidades | Preço: R$ 12.00"));
        assert!(contexto.contains("Total de Produtos: 1"));
    }
}
