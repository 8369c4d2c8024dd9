use crate::errors::DbError;
use crate::query::QueryRequest;
use crate::types::DocumentId;

/// Builds a request from `key=value` arguments; a bare `key` gets an empty value.
#[must_use]
pub fn parse_pairs(pairs: &[String]) -> QueryRequest {
    QueryRequest::from_pairs(pairs.iter().map(|p| match p.split_once('=') {
        Some((k, v)) => (k.to_string(), v.to_string()),
        None => (p.clone(), String::new()),
    }))
}

/// # Errors
/// `InvalidDocumentId` when `s` is not a UUID.
pub fn parse_id(s: &str) -> Result<DocumentId, DbError> {
    DocumentId::parse(s.trim())
}
