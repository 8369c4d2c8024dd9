use bson::Bson;
use serde::{Deserialize, Serialize};

use crate::errors::DbError;
use crate::types::ID_FIELD;

// Deeper dotted paths resolve to nothing.
pub(crate) const MAX_PATH_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

/// Field selection in select-string form: `name` includes, `-name` excludes.
///
/// The builder passes client lists through untouched; the store decides whether the list is
/// usable when the query executes (see [`Projection::resolve`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub fields: Vec<String>,
}

/// A projection the store can apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedProjection {
    /// Keep only these fields (plus `_id` unless `keep_id` is false).
    Include { fields: Vec<String>, keep_id: bool },
    /// Drop these fields.
    Exclude(Vec<String>),
}

impl Projection {
    #[must_use]
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { fields: fields.into_iter().map(Into::into).collect() }
    }

    #[must_use]
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { fields: fields.into_iter().map(|f| format!("-{}", f.into())).collect() }
    }

    /// Applies the store rule: a projection is all inclusions or all exclusions, except that
    /// `-_id` may accompany inclusions.
    ///
    /// # Errors
    /// Returns `QueryError` when inclusions and exclusions of other fields are mixed.
    pub fn resolve(&self) -> Result<ResolvedProjection, DbError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for f in &self.fields {
            match f.strip_prefix('-') {
                Some(name) if !name.is_empty() => exclude.push(name.to_string()),
                Some(_) => {}
                None if !f.is_empty() => include.push(f.clone()),
                None => {}
            }
        }
        if include.is_empty() {
            return Ok(ResolvedProjection::Exclude(exclude));
        }
        let keep_id = !exclude.iter().any(|f| f == ID_FIELD);
        if let Some(bad) = exclude.iter().find(|f| f.as_str() != ID_FIELD) {
            return Err(DbError::QueryError(format!(
                "cannot do exclusion on field {bad} in inclusion projection"
            )));
        }
        Ok(ResolvedProjection::Include { fields: include, keep_id })
    }
}

/// Options applied by `find_docs` after filtering.
///
/// Semantics:
/// - Sorting is applied before skip/limit, projection last.
/// - Sorting is stable over insertion order, so ties keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Vec<SortSpec>>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    /// Maps a bracket keyword from a client request. Only the four range keywords are
    /// operators; every other token yields `None`.
    #[must_use]
    pub fn from_keyword(kw: &str) -> Option<Self> {
        match kw {
            "gte" => Some(Self::Gte),
            "gt" => Some(Self::Gt),
            "lte" => Some(Self::Lte),
            "lt" => Some(Self::Lt),
            _ => None,
        }
    }
}

/// Filter tree. Predicates parsed from request text keep that text in `raw`, so the store can
/// cast it against the declared field type instead of the inferred value.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Not(Box<Filter>),
    In { path: String, values: Vec<Bson>, raw: Option<Vec<String>> },
    Cmp { path: String, op: CmpOp, value: Bson, raw: Option<String> },
}

impl Filter {
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op: CmpOp::Eq, value: value.into(), raw: None }
    }

    #[must_use]
    pub fn cmp(path: impl Into<String>, op: CmpOp, value: impl Into<Bson>) -> Self {
        Self::Cmp { path: path.into(), op, value: value.into(), raw: None }
    }

    /// Comparison against request text, typed by [`infer_value`](super::infer_value).
    #[must_use]
    pub fn cmp_text(path: impl Into<String>, op: CmpOp, text: impl Into<String>) -> Self {
        let text = text.into();
        Self::Cmp { path: path.into(), op, value: super::parse::infer_value(&text), raw: Some(text) }
    }

    /// Membership in a list of request texts.
    #[must_use]
    pub fn in_text<I, S>(path: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let texts: Vec<String> = texts.into_iter().map(Into::into).collect();
        let values = texts.iter().map(|t| super::parse::infer_value(t)).collect();
        Self::In { path: path.into(), values, raw: Some(texts) }
    }

    /// Conjunction that flattens nested `And`s and drops `True`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let mut parts = Vec::new();
        for f in [self, other] {
            match f {
                Self::True => {}
                Self::And(fs) => parts.extend(fs),
                f => parts.push(f),
            }
        }
        match parts.len() {
            0 => Self::True,
            1 => parts.remove(0),
            _ => Self::And(parts),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub unset: Vec<String>,
}

impl UpdateDoc {
    /// Turns a client body into `$set` pairs, one per top-level field.
    #[must_use]
    pub fn from_body(body: &bson::Document) -> Self {
        Self { set: body.iter().map(|(k, v)| (k.clone(), v.clone())).collect(), unset: Vec::new() }
    }

    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.set.push((path.into(), value.into()));
        self
    }

    /// Paths touched by this update.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.set.iter().map(|(k, _)| k.as_str()).chain(self.unset.iter().map(String::as_str))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_flattens_and_drops_true() {
        let f = Filter::True.and(Filter::eq("a", 1)).and(Filter::eq("b", 2));
        assert_eq!(f, Filter::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)]));
        assert_eq!(Filter::True.and(Filter::True), Filter::True);
    }

    #[test]
    fn keyword_whitelist_is_closed() {
        assert_eq!(CmpOp::from_keyword("gte"), Some(CmpOp::Gte));
        assert_eq!(CmpOp::from_keyword("lt"), Some(CmpOp::Lt));
        for kw in ["$gt", "ne", "regex", "where", "GT", "eq", ""] {
            assert_eq!(CmpOp::from_keyword(kw), None, "{kw}");
        }
    }

    #[test]
    fn projection_resolution_follows_store_rule() {
        assert_eq!(
            Projection::exclude(["__v"]).resolve().unwrap(),
            ResolvedProjection::Exclude(vec!["__v".into()])
        );
        assert_eq!(
            Projection::include(["name", "-_id"]).resolve().unwrap(),
            ResolvedProjection::Include { fields: vec!["name".into()], keep_id: false }
        );
        assert!(Projection::include(["name", "-price"]).resolve().is_err());
    }

    #[test]
    fn wide_projections_keep_every_field() {
        let fields: Vec<String> = (0..100).map(|i| format!("f{i}")).collect();
        let ResolvedProjection::Include { fields: kept, .. } = Projection::include(fields.clone()).resolve().unwrap() else {
            panic!("expected an inclusion");
        };
        assert_eq!(kept, fields);
        let mut mixed = fields;
        mixed.push("-price".into());
        assert!(Projection { fields: mixed }.resolve().is_err());
    }
}
