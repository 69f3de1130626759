// Columnar wire format → named-field records
// The CRUD gateway answers with a field-name list in the metadata and rows
// whose attributes are indexed positionally (f0, f1, ...), each value wrapped
// one level as {"$": value}. Mapping is pure and never fails: malformed input
// degrades to empty or partial records.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Named-field record produced from one positional row. Values keep the JSON
/// type the gateway sent (usually strings).
pub type MappedRecord = Map<String, Value>;

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ServiceResponse {
    #[serde(rename = "responseBody")]
    pub response_body: Option<ResponseBody>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseBody {
    pub entities: Option<Entities>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Entities {
    pub metadata: Option<Metadata>,
    /// A bare object for single-row results, an array otherwise.
    pub entity: Option<Value>,
    /// Upstream-reported total row count; string or number depending on the
    /// service, absent on some queries.
    pub total: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub fields: FieldSet,
}

#[derive(Debug, Default, Deserialize)]
pub struct FieldSet {
    /// List of `{ "name": ... }` descriptors; a bare object when the fieldset
    /// has a single column.
    #[serde(default)]
    pub field: Value,
}

impl ServiceResponse {
    /// Parse a raw gateway response, treating any unexpected structure as an
    /// absent body rather than an error.
    pub fn from_value(raw: Value) -> Self {
        serde_json::from_value(raw).unwrap_or_default()
    }

    pub fn into_entities(self) -> Option<Entities> {
        self.response_body.and_then(|body| body.entities)
    }
}

impl Entities {
    /// Upstream total when reported, whichever convention it arrived in.
    pub fn reported_total(&self) -> Option<i64> {
        match self.total.as_ref()? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }
}

// ============================================================================
// Mapping
// ============================================================================

/// Zip the metadata field names with each row's positional values.
///
/// `key_field` names the primary business key (CODPROD, CODPARC, ...); when
/// present and non-empty it becomes the record's `_id`, otherwise the ordinal
/// position in the result set is used (request-scoped only).
pub fn map_entities(entities: &Entities, key_field: &str) -> Vec<MappedRecord> {
    let field_names: Vec<String> = entities
        .metadata
        .as_ref()
        .map(|metadata| {
            normalize_to_array(&metadata.fields.field)
                .iter()
                .filter_map(|f| f.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let rows = match entities.entity.as_ref() {
        Some(entity) => normalize_to_array(entity),
        None => return Vec::new(),
    };

    rows.iter()
        .enumerate()
        .map(|(index, raw)| {
            let mut record = MappedRecord::new();

            for (position, name) in field_names.iter().enumerate() {
                // Missing positional fields are simply omitted.
                if let Some(value) = raw
                    .get(format!("f{}", position))
                    .and_then(|wrapped| wrapped.get("$"))
                {
                    record.insert(name.clone(), value.clone());
                }
            }

            let id = record
                .get(key_field)
                .and_then(value_as_string)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| index.to_string());
            record.insert("_id".to_string(), Value::String(id));

            record
        })
        .collect()
}

/// The gateway drops the array wrapper around single-element lists; put it
/// back so callers always see a slice.
fn normalize_to_array(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// String field of a mapped record, empty when absent or non-scalar.
pub fn record_field(record: &MappedRecord, field: &str) -> String {
    record.get(field).and_then(value_as_string).unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
