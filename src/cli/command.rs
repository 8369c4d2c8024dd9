use crate::catalog::Resource;
use crate::types::DocumentId;
use std::path::PathBuf;

/// One catalog operation, already parsed from the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List {
        resource: Resource,
        /// `key=value` request pairs, e.g. `price[gte]=100` or `sort=-price`.
        pairs: Vec<String>,
        /// Restricts reviews to one tour.
        tour: Option<DocumentId>,
    },
    Get {
        resource: Resource,
        id: DocumentId,
    },
    TopCheap {
        pairs: Vec<String>,
    },
    Stats,
    Import {
        resource: Resource,
        file: PathBuf,
    },
    TourCreate {
        json: String,
    },
    TourUpdate {
        id: DocumentId,
        json: String,
    },
    TourDelete {
        id: DocumentId,
    },
    UserCreate {
        json: String,
    },
    ReviewAdd {
        tour: Option<DocumentId>,
        user: Option<DocumentId>,
        json: String,
    },
    ReviewUpdate {
        id: DocumentId,
        json: String,
    },
    ReviewDelete {
        id: DocumentId,
    },
    Recompute {
        tour: DocumentId,
    },
}

impl Command {
    /// Whether the command changes stored data and should be flushed afterwards.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::List { .. } | Self::Get { .. } | Self::TopCheap { .. } | Self::Stats)
    }
}
