//! Lifecycle hooks for collection mutations.
//!
//! Hooks are registered explicitly on a collection during startup. For by-query mutations the
//! collection reads the first matching document before executing and lets each hook capture
//! what it needs from that pre-image; the captured value is handed back after the mutation.

use bson::Bson;

use crate::document::Document;
use crate::errors::DbError;
use crate::types::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationEvent {
    Created,
    UpdatedByQuery,
    DeletedByQuery,
}

impl MutationEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::UpdatedByQuery => "updated_by_query",
            Self::DeletedByQuery => "deleted_by_query",
        }
    }
}

/// What a hook took from the pre-image of a by-query mutation. Lives for one call only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captured(pub Option<Bson>);

impl Captured {
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        self.0.as_ref().and_then(DocumentId::from_bson)
    }
}

/// The affected record as seen by a post-mutation hook.
#[derive(Debug, Clone, Copy)]
pub enum HookSubject<'a> {
    /// The document that was just created.
    Created(&'a Document),
    /// A by-query mutation: the captured value and, for updates, the post-image.
    ByQuery { captured: &'a Captured, post: Option<&'a Document> },
}

pub trait MutationHook: Send + Sync {
    fn name(&self) -> &str;

    fn handles(&self, event: MutationEvent) -> bool;

    /// Runs before an update/delete-by-query with the first matching document, if any.
    fn capture(&self, _event: MutationEvent, _pre: Option<&Document>) -> Captured {
        Captured::default()
    }

    /// Runs once the mutation is applied. Errors reach the caller of the mutation; the
    /// mutation itself stays applied.
    ///
    /// # Errors
    /// Whatever the hook's own work fails with.
    fn after(&self, event: MutationEvent, subject: HookSubject<'_>) -> Result<(), DbError>;
}
