//! Request-driven query construction for list endpoints.
//!
//! ```ignore
//! let docs = QueryBuilder::new(tours.find(base), request)
//!     .filter()
//!     .sort()
//!     .limit_fields()
//!     .paginate()
//!     .into_query()
//!     .exec()?;
//! ```
//!
//! Stages are meant to run in that order. Each one writes its own slot of the plan and
//! applies it to the wrapped [`Query`]; none of them touches the store.

use super::exec::Query;
use super::parse::{Page, QueryRequest, parse_fields, parse_filter, parse_page, parse_sort};
use super::types::{Filter, Projection, SortSpec};

/// The plan pieces a builder has applied so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    pub filter: Option<Filter>,
    pub sort: Option<Vec<SortSpec>>,
    pub projection: Option<Projection>,
    pub page: Option<Page>,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
    request: QueryRequest,
    plan: QueryPlan,
}

impl QueryBuilder {
    /// Wraps a query that may already carry a base filter (e.g. children of one parent).
    #[must_use]
    pub fn new(query: Query, request: QueryRequest) -> Self {
        Self { query, request, plan: QueryPlan::default() }
    }

    #[must_use]
    pub fn filter(mut self) -> Self {
        let f = parse_filter(&self.request);
        self.query = self.query.and_filter(f.clone());
        self.plan.filter = Some(f);
        self
    }

    #[must_use]
    pub fn sort(mut self) -> Self {
        let s = parse_sort(self.request.sort_str());
        self.query = self.query.sort(s.clone());
        self.plan.sort = Some(s);
        self
    }

    #[must_use]
    pub fn limit_fields(mut self) -> Self {
        let p = parse_fields(self.request.fields_str());
        self.query = self.query.select(p.clone());
        self.plan.projection = Some(p);
        self
    }

    #[must_use]
    pub fn paginate(mut self) -> Self {
        let page = parse_page(self.request.page_str(), self.request.limit_str());
        self.query = self.query.skip(page.skip).limit(page.limit);
        self.plan.page = Some(page);
        self
    }

    #[must_use]
    pub const fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// The resulting query, still unexecuted.
    #[must_use]
    pub fn into_query(self) -> Query {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Collection;
    use crate::query::CmpOp;
    use bson::{Bson, doc};
    use std::sync::Arc;

    #[test]
    fn stages_record_and_apply_the_plan() {
        let col = Arc::new(Collection::new("tours"));
        let req = QueryRequest::from_query_str("price[lt]=500&sort=price&page=3&limit=2");
        let b = QueryBuilder::new(col.find(Filter::eq("difficulty", "easy")), req)
            .filter()
            .sort()
            .limit_fields()
            .paginate();
        assert_eq!(b.plan().page, Some(Page { skip: 4, limit: 2 }));
        assert_eq!(b.plan().filter, Some(Filter::cmp_text("price", CmpOp::Lt, "500")));
        let q = b.into_query();
        assert_eq!(
            q.filter(),
            &Filter::And(vec![
                Filter::eq("difficulty", "easy"),
                Filter::cmp_text("price", CmpOp::Lt, "500"),
            ])
        );
        assert_eq!(q.options().skip, Some(4));
        assert_eq!(q.options().sort, Some(vec![SortSpec::asc("price")]));
        assert!(matches!(q.filter(), Filter::And(fs) if matches!(&fs[1], Filter::Cmp { value: Bson::Int64(500), .. })));
    }

    #[test]
    fn partial_chains_leave_other_slots_alone() {
        let col = Arc::new(Collection::new("tours"));
        col.insert(doc! {"name": "a"}).unwrap();
        let q = QueryBuilder::new(col.find(Filter::True), QueryRequest::new()).sort().into_query();
        assert_eq!(q.options().limit, None);
        assert_eq!(q.options().projection, None);
        assert_eq!(q.exec().unwrap().to_vec().len(), 1);
    }
}
