// Sankhya gateway client
// Bearer token lifecycle (login + reactive invalidation) and the single
// authenticated chokepoint through which every ERP call passes.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::SankhyaConfig;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PRICE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_LOGIN_RETRIES: u32 = 3;
const MAX_REQUEST_RETRIES: u32 = 2;
const LOGIN_RETRY_DELAY: Duration = Duration::from_secs(1);
const REQUEST_RETRY_DELAY: Duration = Duration::from_secs(1);
const REFRESH_DELAY: Duration = Duration::from_millis(500);

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum SankhyaError {
    #[error("Falha na autenticação Sankhya: {0}")]
    Auth(String),

    #[error("Sessão expirada. Tente novamente.")]
    SessionExpired,

    #[error("Tempo de resposta excedido. Tente novamente.")]
    Timeout,

    #[error("Serviço temporariamente indisponível. Tente novamente.")]
    Unavailable,

    #[error("{0}")]
    Upstream(String),

    #[error("Erro na comunicação com o servidor: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SankhyaError>;

// ============================================================================
// Login Response
// ============================================================================

// The login service has been observed returning the token under either
// field name; both are accepted.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "bearerToken")]
    bearer_token: Option<String>,
    token: Option<String>,
}

impl LoginResponse {
    fn into_token(self) -> Option<String> {
        self.bearer_token
            .or(self.token)
            .filter(|t| !t.is_empty())
    }
}

// ============================================================================
// Sankhya Client
// ============================================================================

pub struct SankhyaClient {
    config: SankhyaConfig,
    http_client: Client,
    token_cache: Arc<RwLock<Option<String>>>,
}

impl SankhyaClient {
    pub fn new(config: SankhyaConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SankhyaError::Auth(e.to_string()))?;

        let http_client = Client::builder()
            .build()
            .map_err(SankhyaError::Network)?;

        Ok(Self {
            config,
            http_client,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// URL of the CRUD query/save gateway for a given service name.
    pub fn service_url(&self, service_name: &str) -> String {
        format!(
            "{}/gateway/v1/mge/service.sbr?serviceName={}&outputType=json",
            self.config.base_url, service_name
        )
    }

    // ========================================================================
    // Token Management
    // ========================================================================

    /// Get a bearer token, logging in on cache miss.
    ///
    /// Only HTTP 5xx login failures are retried (linearly increasing delay);
    /// 4xx and network failures fail immediately.
    pub async fn get_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let login_url = format!("{}/login", self.config.base_url);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = self
                .http_client
                .post(&login_url)
                .header("token", &self.config.token)
                .header("appkey", &self.config.app_key)
                .header("username", &self.config.username)
                .header("password", &self.config.password)
                .timeout(LOGIN_TIMEOUT)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_server_error() => {
                    if attempt <= MAX_LOGIN_RETRIES {
                        tracing::warn!(
                            "Sankhya login returned {}, retrying ({}/{})",
                            response.status(),
                            attempt,
                            MAX_LOGIN_RETRIES
                        );
                        tokio::time::sleep(LOGIN_RETRY_DELAY * attempt).await;
                        continue;
                    }
                    self.invalidate_token();
                    return Err(SankhyaError::Auth(
                        "Serviço Sankhya temporariamente indisponível. Tente novamente em instantes."
                            .to_string(),
                    ));
                }
                Ok(response) if !response.status().is_success() => {
                    self.invalidate_token();
                    let detail = upstream_message(response).await;
                    return Err(SankhyaError::Auth(detail));
                }
                Ok(response) => {
                    let login: LoginResponse = response.json().await.map_err(|e| {
                        self.invalidate_token();
                        SankhyaError::Auth(e.to_string())
                    })?;

                    match login.into_token() {
                        Some(token) => {
                            self.cache_token(&token);
                            return Ok(token);
                        }
                        None => {
                            self.invalidate_token();
                            return Err(SankhyaError::Auth(
                                "resposta de login não continha o token esperado".to_string(),
                            ));
                        }
                    }
                }
                Err(err) => {
                    self.invalidate_token();
                    return Err(SankhyaError::Auth(err.to_string()));
                }
            }
        }
    }

    /// Drop the cached token so the next call logs in again.
    pub fn invalidate_token(&self) {
        let mut cache = self.token_cache.write().unwrap();
        *cache = None;
    }

    fn cached_token(&self) -> Option<String> {
        self.token_cache.read().unwrap().clone()
    }

    fn cache_token(&self, token: &str) {
        let mut cache = self.token_cache.write().unwrap();
        *cache = Some(token.to_string());
    }

    // ========================================================================
    // Authenticated Request Executor
    // ========================================================================

    /// Issue an authenticated call against the gateway.
    ///
    /// 401/403 clears the cached token and retries the whole call once with a
    /// fresh token; timeouts, unreachable hosts and 5xx are retried twice with
    /// linear backoff. Everything else propagates the upstream message as-is.
    pub async fn execute(&self, url: &str, method: Method, body: Option<&Value>) -> Result<Value> {
        let mut auth_retried = false;
        let mut transient_attempts: u32 = 0;

        loop {
            let token = self.get_token().await?;

            let mut request = self
                .http_client
                .request(method.clone(), url)
                .bearer_auth(&token)
                .header("Content-Type", "application/json")
                .timeout(REQUEST_TIMEOUT);

            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        self.invalidate_token();
                        if !auth_retried {
                            auth_retried = true;
                            tracing::info!("Sankhya token expired, refreshing session");
                            tokio::time::sleep(REFRESH_DELAY).await;
                            continue;
                        }
                        return Err(SankhyaError::SessionExpired);
                    }

                    if status.is_server_error() {
                        if transient_attempts < MAX_REQUEST_RETRIES {
                            transient_attempts += 1;
                            tracing::warn!(
                                "Sankhya request returned {}, retrying ({}/{})",
                                status,
                                transient_attempts,
                                MAX_REQUEST_RETRIES
                            );
                            tokio::time::sleep(REQUEST_RETRY_DELAY * transient_attempts).await;
                            continue;
                        }
                        return Err(SankhyaError::Unavailable);
                    }

                    if !status.is_success() {
                        let detail = upstream_message(response).await;
                        tracing::error!("Sankhya request to {} failed: {}", url, detail);
                        return Err(SankhyaError::Upstream(detail));
                    }

                    return response.json().await.map_err(SankhyaError::Network);
                }
                Err(err) => {
                    let transient = err.is_timeout() || err.is_connect();
                    if transient && transient_attempts < MAX_REQUEST_RETRIES {
                        transient_attempts += 1;
                        tracing::warn!(
                            "Sankhya request error ({}), retrying ({}/{})",
                            err,
                            transient_attempts,
                            MAX_REQUEST_RETRIES
                        );
                        tokio::time::sleep(REQUEST_RETRY_DELAY * transient_attempts).await;
                        continue;
                    }
                    if err.is_timeout() {
                        return Err(SankhyaError::Timeout);
                    }
                    return Err(SankhyaError::Network(err));
                }
            }
        }
    }

    // ========================================================================
    // Price Lookup
    // ========================================================================

    /// Live unit price for a product, from the price table service.
    ///
    /// Price absence must never block a product listing, so every failure
    /// collapses to 0 instead of propagating. Applies the same one-shot
    /// 401/403 refresh and a single transient retry, on a short timeout.
    pub async fn buscar_preco(&self, cod_prod: &str) -> f64 {
        let url = format!(
            "{}/v1/precos/produto/{}/tabela/0?pagina=1",
            self.config.base_url, cod_prod
        );

        let mut auth_retried = false;
        let mut transient_retried = false;

        loop {
            let token = match self.get_token().await {
                Ok(token) => token,
                Err(_) => return 0.0,
            };

            let result = self
                .http_client
                .get(&url)
                .bearer_auth(&token)
                .header("Content-Type", "application/json")
                .timeout(PRICE_TIMEOUT)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                        self.invalidate_token();
                        if !auth_retried {
                            auth_retried = true;
                            tokio::time::sleep(REFRESH_DELAY).await;
                            continue;
                        }
                        return 0.0;
                    }

                    if status.is_server_error() {
                        if !transient_retried {
                            transient_retried = true;
                            tokio::time::sleep(REFRESH_DELAY).await;
                            continue;
                        }
                        return 0.0;
                    }

                    if !status.is_success() {
                        return 0.0;
                    }

                    return match response.json::<PrecoResponse>().await {
                        Ok(body) => body.first_price(),
                        Err(_) => 0.0,
                    };
                }
                Err(err) => {
                    if err.is_timeout() && !transient_retried {
                        transient_retried = true;
                        tokio::time::sleep(REFRESH_DELAY).await;
                        continue;
                    }
                    return 0.0;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PrecoResponse {
    produtos: Option<Vec<PrecoEntry>>,
}

#[derive(Debug, Deserialize)]
struct PrecoEntry {
    valor: Option<Value>,
}

impl PrecoResponse {
    fn first_price(self) -> f64 {
        self.produtos
            .and_then(|list| list.into_iter().next())
            .and_then(|entry| entry.valor)
            .map(|valor| match valor {
                Value::Number(n) => n.as_f64().unwrap_or(0.0),
                Value::String(s) => s.parse().unwrap_or(0.0),
                _ => 0.0,
            })
            .unwrap_or(0.0)
    }
}

/// Best-effort human-readable message from an upstream error response.
async fn upstream_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            body.get("statusMessage")
                .or_else(|| body.get("error"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| {
            if text.is_empty() {
                format!("HTTP {}", status)
            } else {
                text
            }
        })
}

// ============================================================================
// Tests
// ============================================================================
