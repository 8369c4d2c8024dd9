use super::core::{Collection, CollectionState};
use crate::document::Document;
use crate::errors::DbError;
use crate::query::get_path;
use crate::types::DocumentId;
use bson::Bson;

/// A unique constraint over one or more fields. Documents missing any of the fields are not
/// constrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIndex {
    pub fields: Vec<String>,
}

impl UniqueIndex {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { fields: fields.into_iter().map(Into::into).collect() }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.fields.join("_")
    }

    fn key(&self, doc: &bson::Document) -> Option<Vec<Bson>> {
        self.fields.iter().map(|f| get_path(doc, f).filter(|v| !matches!(v, Bson::Null)).cloned()).collect()
    }

    fn render(key: &[Bson]) -> String {
        key.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

impl Collection {
    /// Checks `doc` against every unique index, ignoring the document with id `skip`.
    pub(crate) fn check_unique(
        &self,
        state: &CollectionState,
        doc: &Document,
        skip: Option<&DocumentId>,
    ) -> Result<(), DbError> {
        for idx in &self.unique {
            let Some(key) = idx.key(&doc.data) else { continue };
            let clash = state
                .docs
                .values()
                .filter(|other| Some(&other.id) != skip)
                .any(|other| idx.key(&other.data).as_ref() == Some(&key));
            if clash {
                log::debug!("collection {}: duplicate key on {}", self.name(), idx.name());
                return Err(DbError::DuplicateKey { index: idx.name(), key: UniqueIndex::render(&key) });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn unique_indexes(&self) -> &[UniqueIndex] {
        &self.unique
    }
}
