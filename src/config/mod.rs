use std::env;

use anyhow::{bail, Result};

const DEFAULT_SANKHYA_BASE_URL: &str = "https://api.sandbox.sankhya.com.br";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Static Sankhya credentials, read once from the environment and immutable
/// for the process lifetime.
#[derive(Debug, Clone)]
pub struct SankhyaConfig {
    pub base_url: String,
    pub token: String,
    pub app_key: String,
    pub username: String,
    pub password: String,
}

impl SankhyaConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: env::var("SANKHYA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_SANKHYA_BASE_URL.to_string()),
            token: env::var("SANKHYA_TOKEN").unwrap_or_default(),
            app_key: env::var("SANKHYA_APPKEY").unwrap_or_default(),
            username: env::var("SANKHYA_USERNAME").unwrap_or_default(),
            password: env::var("SANKHYA_PASSWORD").unwrap_or_default(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            bail!("SANKHYA_BASE_URL is required");
        }
        if self.token.is_empty() {
            bail!("SANKHYA_TOKEN is required");
        }
        if self.app_key.is_empty() {
            bail!("SANKHYA_APPKEY is required");
        }
        if self.username.is_empty() {
            bail!("SANKHYA_USERNAME is required");
        }
        if self.password.is_empty() {
            bail!("SANKHYA_PASSWORD is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
            api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub sankhya: SankhyaConfig,
    pub gemini: GeminiConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            cors_origins,
            sankhya: SankhyaConfig::from_env()?,
            gemini: GeminiConfig::from_env(),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sankhya_config_validation() {
        let config = SankhyaConfig {
            base_url: "http://localhost".to_string(),
            token: String::new(),
            app_key: "k".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        };
        assert!(config.validate().is_err());

        let config = SankhyaConfig {
            token: "t".to_string(),
            ..config
        };
        assert!(config.validate().is_ok());
    }
}
