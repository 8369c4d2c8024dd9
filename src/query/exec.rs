use crate::collection::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::utils::devlog::dev6;
use std::sync::Arc;
use std::time::Instant;

use super::cursor::Cursor;
use super::eval::{compare_docs, eval_filter, project_fields};
use super::types::{Filter, FindOptions, Projection, SortSpec};

/// A lazily executed query over one collection.
///
/// Building a `Query` does no work; [`Query::exec`] and [`Query::count`] read the collection.
#[derive(Clone)]
pub struct Query {
    collection: Arc<Collection>,
    filter: Filter,
    options: FindOptions,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("collection", &self.collection.name())
            .field("filter", &self.filter)
            .field("options", &self.options)
            .finish()
    }
}

impl Query {
    #[must_use]
    pub fn new(collection: Arc<Collection>, filter: Filter) -> Self {
        Self { collection, filter, options: FindOptions::default() }
    }

    /// Conjoins `filter` with whatever filter the query already carries.
    #[must_use]
    pub fn and_filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::replace(&mut self.filter, Filter::True).and(filter);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.options.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn select(mut self, projection: Projection) -> Self {
        self.options.projection = Some(projection);
        self
    }

    #[must_use]
    pub const fn skip(mut self, skip: usize) -> Self {
        self.options.skip = Some(skip);
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn filter(&self) -> &Filter {
        &self.filter
    }

    #[must_use]
    pub const fn options(&self) -> &FindOptions {
        &self.options
    }

    #[must_use]
    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    /// Runs the query.
    ///
    /// # Errors
    /// Propagates store errors: operand cast failures and unusable projections.
    pub fn exec(&self) -> Result<Cursor, DbError> {
        find_docs(&self.collection, &self.filter, &self.options).map(Cursor::new)
    }

    /// Counts matches, ignoring sort, projection and pagination.
    ///
    /// # Errors
    /// Propagates operand cast failures.
    pub fn count(&self) -> Result<usize, DbError> {
        count_docs(&self.collection, &self.filter)
    }
}

/// Filter, stable sort, skip/limit, then projection.
///
/// # Errors
/// Returns `Cast` when a filter operand does not fit the schema, `QueryError` for a mixed
/// projection.
pub fn find_docs(col: &Collection, filter: &Filter, opts: &FindOptions) -> Result<Vec<Document>, DbError> {
    let bench_start = Instant::now();
    let filter = col.effective_filter(filter)?;
    let projection = opts.projection.as_ref().map(Projection::resolve).transpose()?;

    let mut docs = col.scan(|d| eval_filter(&d.data, &filter));
    let matched = docs.len();

    if let Some(sort) = &opts.sort {
        docs.sort_by(|a, b| compare_docs(&a.data, &b.data, sort));
    }

    let skip = opts.skip.unwrap_or(0);
    let limit = opts.limit.unwrap_or(usize::MAX);
    let mut docs: Vec<Document> = docs.into_iter().skip(skip).take(limit).collect();

    if let Some(p) = &projection {
        for d in &mut docs {
            d.data = project_fields(&d.data, p);
        }
    }

    dev6!("query", {
        "op": "find",
        "collection": col.name(),
        "duration_ms": u64::try_from(bench_start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "matched": matched,
        "result_count": docs.len(),
        "skip": skip,
        "limit": opts.limit,
    });
    Ok(docs)
}

/// # Errors
/// Returns `Cast` when a filter operand does not fit the schema.
pub fn count_docs(col: &Collection, filter: &Filter) -> Result<usize, DbError> {
    let start = Instant::now();
    let filter = col.effective_filter(filter)?;
    let n = col.scan_count(|d| eval_filter(&d.data, &filter));
    dev6!("query", {
        "op": "count",
        "collection": col.name(),
        "duration_ms": u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "result_count": n,
    });
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CmpOp, Order};
    use bson::doc;

    fn seeded() -> Arc<Collection> {
        let col = Arc::new(Collection::new("u_find"));
        for (k, v) in [(1, 3), (2, 1), (3, 2)] {
            col.insert(doc! {"k": k, "v": v, "x": 0}).unwrap();
        }
        col
    }

    #[test]
    fn find_docs_projection_sort_and_pagination() {
        let col = seeded();
        let opts = FindOptions {
            projection: Some(Projection::include(["k"])),
            sort: Some(vec![SortSpec { field: "v".into(), order: Order::Asc }]),
            skip: None,
            limit: Some(2),
        };
        let docs = find_docs(&col, &Filter::eq("x", 0), &opts).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].data.get("v").is_none());
        assert!(docs[0].data.get("_id").is_some());
        assert_eq!(docs[0].data.get_i32("k").unwrap(), 2);
    }

    #[test]
    fn query_is_lazy_and_reusable() {
        let col = seeded();
        let q = col.find(Filter::cmp("v", CmpOp::Gte, 2)).sort(vec![SortSpec::desc("v")]);
        col.insert(doc! {"k": 4, "v": 9, "x": 0}).unwrap();
        let docs = q.exec().unwrap().to_vec();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].data.get_i32("k").unwrap(), 4);
        assert_eq!(q.count().unwrap(), 3);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let col = Arc::new(Collection::new("ties"));
        for i in 0..5 {
            col.insert(doc! {"i": i, "g": 1}).unwrap();
        }
        let docs = col.find(Filter::True).sort(vec![SortSpec::asc("g")]).exec().unwrap().to_vec();
        let order: Vec<i32> = docs.iter().map(|d| d.data.get_i32("i").unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn mixed_projection_is_a_store_error() {
        let col = seeded();
        let err = col.find(Filter::True).select(Projection::include(["k", "-v"])).exec().unwrap_err();
        assert!(matches!(err, DbError::QueryError(_)));
    }

    #[test]
    fn skip_past_end_is_empty() {
        let col = seeded();
        assert!(col.find(Filter::True).skip(usize::MAX / 2).limit(10).exec().unwrap().to_vec().is_empty());
    }
}
