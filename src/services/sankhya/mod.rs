// Sankhya ERP Integration Module
// Exports the gateway client, the entity mapper and the catalog/partner
// services built on top of it.

pub mod catalog_service;
pub mod client;
pub mod mapper;
pub mod partner_service;

pub use catalog_service::{CatalogService, EstoqueResult, ProdutoPage};
pub use client::{Result as SankhyaResult, SankhyaClient, SankhyaError};
pub use mapper::{map_entities, record_field, Entities, MappedRecord, ServiceResponse};
pub use partner_service::{ParceiroPage, PartnerService};
