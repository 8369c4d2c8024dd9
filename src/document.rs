use crate::errors::DbError;
use crate::types::{CREATED_AT_FIELD, DocumentId, ID_FIELD, VERSION_FIELD};
use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};

/// A stored record: its id plus the BSON body. The body always carries `_id` as well.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
}

impl Document {
    /// Wraps a body, keeping a valid `_id` already present or assigning a fresh one.
    #[must_use]
    pub fn new(mut data: BsonDocument) -> Self {
        let id = data.get(ID_FIELD).and_then(DocumentId::from_bson).unwrap_or_default();
        data.insert(ID_FIELD, id.to_bson());
        Self { id, data }
    }

    /// Rebuilds a document from a persisted body, which must carry a valid `_id`.
    ///
    /// # Errors
    /// Returns `InvalidDocumentId` when `_id` is missing or malformed.
    pub fn from_stored(data: BsonDocument) -> Result<Self, DbError> {
        let id = data
            .get(ID_FIELD)
            .and_then(DocumentId::from_bson)
            .ok_or_else(|| DbError::InvalidDocumentId(format!("{:?}", data.get(ID_FIELD))))?;
        Ok(Self { id, data })
    }

    /// Reads a reference to another document stored under `field`.
    #[must_use]
    pub fn get_ref(&self, field: &str) -> Option<DocumentId> {
        self.data.get(field).and_then(DocumentId::from_bson)
    }

    #[must_use]
    pub fn version(&self) -> i32 {
        match self.data.get(VERSION_FIELD) {
            Some(Bson::Int32(v)) => *v,
            Some(Bson::Int64(v)) => i32::try_from(*v).unwrap_or(i32::MAX),
            _ => 0,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> Option<bson::DateTime> {
        match self.data.get(CREATED_AT_FIELD) {
            Some(Bson::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_inner(self) -> BsonDocument {
        self.data
    }
}
