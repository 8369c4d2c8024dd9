use super::hooks::{MutationEvent, MutationHook};
use super::index_admin::UniqueIndex;
use crate::document::Document;
use crate::errors::DbError;
use crate::query::Filter;
use crate::schema::Schema;
use crate::types::DocumentId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Documents in insertion order plus an id lookup.
#[derive(Debug, Default)]
pub(crate) struct CollectionState {
    pub(crate) next_seq: u64,
    pub(crate) docs: BTreeMap<u64, Document>,
    pub(crate) by_id: HashMap<DocumentId, u64>,
}

impl CollectionState {
    pub(crate) fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.by_id.get(id).and_then(|seq| self.docs.get(seq))
    }

    pub(crate) fn push(&mut self, doc: Document) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(doc.id.clone(), seq);
        self.docs.insert(seq, doc);
    }

    pub(crate) fn replace(&mut self, doc: Document) -> bool {
        match self.by_id.get(&doc.id).copied() {
            Some(seq) => {
                self.docs.insert(seq, doc);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        let seq = self.by_id.remove(id)?;
        self.docs.remove(&seq)
    }
}

/// An in-memory document collection: the handle every query and mutation goes through.
///
/// Configuration (`with_*`) happens before the collection is shared; hooks are registered on
/// the shared handle during startup.
pub struct Collection {
    name: String,
    pub(crate) state: RwLock<CollectionState>,
    pub(crate) schema: Option<Schema>,
    pub(crate) unique: Vec<UniqueIndex>,
    pub(crate) read_filter: Option<Filter>,
    pub(crate) hooks: RwLock<Vec<Arc<dyn MutationHook>>>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("unique", &self.unique)
            .finish_non_exhaustive()
    }
}

impl Collection {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(CollectionState::default()),
            schema: None,
            unique: Vec::new(),
            read_filter: None,
            hooks: RwLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Adds a unique index over one or more fields (compound when several).
    #[must_use]
    pub fn with_unique<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(UniqueIndex::new(fields));
        self
    }

    /// A filter conjoined into every read through `find`, `find_one`, `find_by_id`, `count`.
    #[must_use]
    pub fn with_read_filter(mut self, filter: Filter) -> Self {
        self.read_filter = Some(filter);
        self
    }

    pub fn register_hook(&self, hook: Arc<dyn MutationHook>) {
        log::info!("collection {}: registered hook {}", self.name, hook.name());
        self.hooks.write().push(hook);
    }

    pub(crate) fn hooks_for(&self, event: MutationEvent) -> Vec<Arc<dyn MutationHook>> {
        self.hooks.read().iter().filter(|h| h.handles(event)).cloned().collect()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read filter ∧ `filter`, with operands cast against the schema.
    pub(crate) fn effective_filter(&self, filter: &Filter) -> Result<Filter, DbError> {
        let f = match &self.read_filter {
            Some(rf) => rf.clone().and(filter.clone()),
            None => filter.clone(),
        };
        self.cast_filter(&f)
    }

    pub(crate) fn cast_filter(&self, filter: &Filter) -> Result<Filter, DbError> {
        match &self.schema {
            Some(s) => s.cast_filter(filter),
            None => Ok(filter.clone()),
        }
    }

    /// Clones the matching documents, in insertion order.
    pub(crate) fn scan<F>(&self, pred: F) -> Vec<Document>
    where
        F: Fn(&Document) -> bool,
    {
        self.state.read().docs.values().filter(|d| pred(d)).cloned().collect()
    }

    pub(crate) fn scan_count<F>(&self, pred: F) -> usize
    where
        F: Fn(&Document) -> bool,
    {
        self.state.read().docs.values().filter(|d| pred(d)).count()
    }

    /// Whether `id` is stored, regardless of the read filter.
    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.state.read().by_id.contains_key(id)
    }

    /// All documents in insertion order, bypassing the read filter.
    #[must_use]
    pub fn get_all_documents(&self) -> Vec<Document> {
        self.state.read().docs.values().cloned().collect()
    }
}
