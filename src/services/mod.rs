pub mod gemini_chat_service;
pub mod sankhya;

pub use gemini_chat_service::{ChatMessage, ChatRequest, GeminiChatService};
pub use sankhya::{CatalogService, PartnerService, SankhyaClient, SankhyaError};
