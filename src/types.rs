use crate::errors::DbError;
use bson::Bson;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Primary key field stored on every document body.
pub const ID_FIELD: &str = "_id";
/// Internal version counter, hidden by the default projection.
pub const VERSION_FIELD: &str = "__v";
/// Creation timestamp, the default sort key.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// A wrapper around `uuid::Uuid`; stored in document bodies as its hyphenated string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an id as it arrives from a route parameter or a reference field.
    ///
    /// # Errors
    /// Returns `InvalidDocumentId` if `s` is not a UUID.
    pub fn parse(s: &str) -> Result<Self, DbError> {
        Uuid::parse_str(s.trim()).map(Self).map_err(|_| DbError::InvalidDocumentId(s.to_string()))
    }

    /// Reads an id from a BSON value (string form).
    #[must_use]
    pub fn from_bson(v: &Bson) -> Option<Self> {
        match v {
            Bson::String(s) => Self::parse(s).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_bson(&self) -> Bson {
        Bson::String(self.0.to_string())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = DbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DocumentId> for Bson {
    fn from(id: DocumentId) -> Self {
        id.to_bson()
    }
}
