use crate::document::Document;

/// Materialized results of a [`Query`](super::Query), consumed in order.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    docs: Vec<Document>,
    pos: usize,
}

impl Cursor {
    #[must_use]
    pub(crate) const fn new(docs: Vec<Document>) -> Self {
        Self { docs, pos: 0 }
    }

    pub fn advance(&mut self) -> Option<Document> {
        let d = self.docs.get(self.pos).cloned()?;
        self.pos += 1;
        Some(d)
    }

    /// Number of documents not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.docs.len().saturating_sub(self.pos)
    }

    #[must_use]
    pub fn to_vec(mut self) -> Vec<Document> {
        if self.pos == 0 {
            return std::mem::take(&mut self.docs);
        }
        self.docs.split_off(self.pos.min(self.docs.len()))
    }

    /// The remaining bodies, as returned to clients.
    #[must_use]
    pub fn into_bodies(self) -> Vec<bson::Document> {
        self.to_vec().into_iter().map(Document::into_inner).collect()
    }
}

impl Iterator for Cursor {
    type Item = Document;
    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}
