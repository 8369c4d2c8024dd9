//! Client query requests and their translation into typed plan pieces.
//!
//! A request is what a query-string parser hands over: field names mapped to a string, a list
//! of strings (repeated key), or a mapping of bracket keywords (`price[gte]=100`) to strings.
//! Everything here is a pure, infallible transformation; malformed optional input falls back
//! to defaults.

use bson::Bson;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{CmpOp, Filter, Projection, SortSpec};
use crate::types::{CREATED_AT_FIELD, VERSION_FIELD};

pub const PAGE_KEY: &str = "page";
pub const LIMIT_KEY: &str = "limit";
pub const SORT_KEY: &str = "sort";
pub const FIELDS_KEY: &str = "fields";

/// Keys that steer pagination, ordering and projection and are never filter fields.
pub const RESERVED_KEYS: [&str; 4] = [PAGE_KEY, SORT_KEY, LIMIT_KEY, FIELDS_KEY];

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Single(String),
    Many(Vec<String>),
    Operators(BTreeMap<String, String>),
}

impl RawValue {
    /// The value as a single string, if it is one.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            _ => None,
        }
    }
}

/// An untrusted list-endpoint request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryRequest(pub BTreeMap<String, RawValue>);

impl QueryRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a request from decoded `key=value` pairs.
    ///
    /// `field[kw]` keys become operator entries under `field`; repeating a plain key collects
    /// its values into a list. A later pair replaces an earlier one of a different shape.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut req = Self::new();
        for (k, v) in pairs {
            req.push(k.as_ref(), v.into());
        }
        req
    }

    /// Parses `a=1&b[gte]=2` where the components are already percent-decoded.
    #[must_use]
    pub fn from_query_str(qs: &str) -> Self {
        Self::from_pairs(
            qs.split('&')
                .filter(|p| !p.is_empty())
                .map(|p| p.split_once('=').unwrap_or((p, ""))),
        )
    }

    pub fn push(&mut self, key: &str, value: String) {
        if let Some((field, kw)) = split_bracket(key) {
            match self.0.get_mut(field) {
                Some(RawValue::Operators(ops)) => {
                    ops.insert(kw.to_string(), value);
                }
                _ => {
                    let ops = BTreeMap::from([(kw.to_string(), value)]);
                    self.0.insert(field.to_string(), RawValue::Operators(ops));
                }
            }
            return;
        }
        match self.0.get_mut(key) {
            Some(RawValue::Single(prev)) => {
                let prev = std::mem::take(prev);
                self.0.insert(key.to_string(), RawValue::Many(vec![prev, value]));
            }
            Some(RawValue::Many(vals)) => vals.push(value),
            _ => {
                self.0.insert(key.to_string(), RawValue::Single(value));
            }
        }
    }

    /// Sets a reserved or filter key to a single value, replacing what was there.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), RawValue::Single(value.into()));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.0.get(key)
    }

    fn single(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(RawValue::as_single)
    }

    /// Entries that are filter predicates, i.e. everything but the reserved keys.
    pub fn filter_entries(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.0
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// Splits `field[kw]` into its parts. Anything else, including deeper nesting, is not a
/// bracket key.
fn split_bracket(key: &str) -> Option<(&str, &str)> {
    let inner = key.strip_suffix(']')?;
    let (field, kw) = inner.split_once('[')?;
    if field.is_empty() || kw.is_empty() || kw.contains(['[', ']']) {
        return None;
    }
    Some((field, kw))
}

/// Types a raw operand: integers, then finite decimals, then booleans; anything else stays a
/// string. Schema-aware casting happens later, in the store.
#[must_use]
pub fn infer_value(raw: &str) -> Bson {
    let s = raw.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Bson::Int64(i);
    }
    if let Ok(f) = s.parse::<f64>()
        && f.is_finite()
        && s.bytes().any(|b| b.is_ascii_digit())
    {
        return Bson::Double(f);
    }
    match s {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        _ => Bson::String(raw.to_string()),
    }
}

/// Filter stage: one predicate per non-reserved entry, joined by conjunction.
///
/// Operator sub-mappings are matched against the closed keyword set; an unknown keyword
/// becomes a literal equality on the field named `field[kw]`, which is never an operator.
#[must_use]
pub fn parse_filter(req: &QueryRequest) -> Filter {
    let mut parts = Vec::new();
    for (field, value) in req.filter_entries() {
        match value {
            RawValue::Single(s) => parts.push(Filter::cmp_text(field, CmpOp::Eq, s.as_str())),
            RawValue::Many(vals) => parts.push(Filter::in_text(field, vals.iter().map(String::as_str))),
            RawValue::Operators(ops) => {
                for (kw, s) in ops {
                    if let Some(op) = CmpOp::from_keyword(kw) {
                        parts.push(Filter::cmp_text(field, op, s.as_str()));
                    } else {
                        log::debug!("unrecognized comparison keyword `{kw}` on `{field}`; matching literally");
                        parts.push(Filter::eq(format!("{field}[{kw}]"), Bson::String(s.clone())));
                    }
                }
            }
        }
    }
    parts.into_iter().fold(Filter::True, Filter::and)
}

#[must_use]
pub fn default_sort() -> Vec<SortSpec> {
    vec![SortSpec::desc(CREATED_AT_FIELD)]
}

/// Sort stage: comma-separated directives, `-` for descending. Falls back to newest first.
#[must_use]
pub fn parse_sort(raw: Option<&str>) -> Vec<SortSpec> {
    let specs: Vec<SortSpec> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter_map(|part| match part.strip_prefix('-') {
            Some(f) if !f.trim().is_empty() => Some(SortSpec::desc(f.trim())),
            Some(_) => None,
            None if !part.is_empty() => Some(SortSpec::asc(part)),
            None => None,
        })
        .collect();
    if specs.is_empty() { default_sort() } else { specs }
}

#[must_use]
pub fn default_projection() -> Projection {
    Projection::exclude([VERSION_FIELD])
}

/// Field-selection stage: comma-separated select tokens, or hide the version field.
#[must_use]
pub fn parse_fields(raw: Option<&str>) -> Projection {
    let fields: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if fields.is_empty() { default_projection() } else { Projection { fields } }
}

/// Skip/limit pair derived from page and limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

fn positive(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok()).filter(|n| *n >= 1)
}

/// Pagination stage: page and limit must be integers >= 1, otherwise 1 and 100.
#[must_use]
pub fn parse_page(page: Option<&str>, limit: Option<&str>) -> Page {
    let page = positive(page).unwrap_or(DEFAULT_PAGE);
    let limit = positive(limit).unwrap_or(DEFAULT_LIMIT);
    Page { skip: (page - 1).saturating_mul(limit), limit }
}

impl QueryRequest {
    pub(crate) fn sort_str(&self) -> Option<&str> {
        self.single(SORT_KEY)
    }
    pub(crate) fn fields_str(&self) -> Option<&str> {
        self.single(FIELDS_KEY)
    }
    pub(crate) fn page_str(&self) -> Option<&str> {
        self.single(PAGE_KEY)
    }
    pub(crate) fn limit_str(&self) -> Option<&str> {
        self.single(LIMIT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::types::Order;

    #[test]
    fn bracket_keys_become_operator_entries() {
        let req = QueryRequest::from_query_str("price[gte]=100&price[lte]=200&difficulty=easy");
        assert_eq!(
            req.get("price"),
            Some(&RawValue::Operators(BTreeMap::from([
                ("gte".into(), "100".into()),
                ("lte".into(), "200".into())
            ])))
        );
        assert_eq!(req.get("difficulty"), Some(&RawValue::Single("easy".into())));
    }

    #[test]
    fn repeated_keys_collect_into_lists() {
        let req = QueryRequest::from_query_str("difficulty=easy&difficulty=medium");
        assert_eq!(req.get("difficulty"), Some(&RawValue::Many(vec!["easy".into(), "medium".into()])));
    }

    #[test]
    fn deep_or_empty_brackets_are_literal_keys() {
        assert_eq!(split_bracket("a[b][c]"), None);
        assert_eq!(split_bracket("[gt]"), None);
        assert_eq!(split_bracket("a[]"), None);
        assert_eq!(split_bracket("price[gt]"), Some(("price", "gt")));
    }

    #[test]
    fn reserved_keys_never_filter() {
        let req = QueryRequest::from_query_str("page=2&limit=3&sort=price&fields=name&duration=5");
        assert_eq!(parse_filter(&req), Filter::cmp_text("duration", CmpOp::Eq, "5"));
    }

    #[test]
    fn unknown_keyword_is_literal() {
        let req = QueryRequest::from_query_str("price[foo]=1&price[$where]=x");
        assert_eq!(
            parse_filter(&req),
            Filter::And(vec![
                Filter::eq("price[$where]", "x"),
                Filter::eq("price[foo]", "1"),
            ])
        );
    }

    #[test]
    fn predicates_keep_the_request_text() {
        let req = QueryRequest::from_query_str("name=0000000001&price[gte]=1e2&difficulty=easy&difficulty=007");
        let Filter::And(fs) = parse_filter(&req) else { panic!("expected a conjunction") };
        assert!(fs.contains(&Filter::cmp_text("name", CmpOp::Eq, "0000000001")));
        assert!(fs.contains(&Filter::in_text("difficulty", ["easy", "007"])));
        let price = fs.iter().find(|f| matches!(f, Filter::Cmp { path, .. } if path == "price")).unwrap();
        assert_eq!(
            price,
            &Filter::Cmp { path: "price".into(), op: CmpOp::Gte, value: Bson::Double(100.0), raw: Some("1e2".into()) }
        );
    }

    #[test]
    fn values_are_typed() {
        assert_eq!(infer_value("100"), Bson::Int64(100));
        assert_eq!(infer_value("4.5"), Bson::Double(4.5));
        assert_eq!(infer_value("true"), Bson::Boolean(true));
        assert_eq!(infer_value("NaN"), Bson::String("NaN".into()));
        assert_eq!(infer_value("inf"), Bson::String("inf".into()));
        assert_eq!(infer_value("easy"), Bson::String("easy".into()));
    }

    #[test]
    fn sort_defaults_and_precedence() {
        assert_eq!(parse_sort(None), vec![SortSpec::desc("createdAt")]);
        assert_eq!(parse_sort(Some(" , -")), vec![SortSpec::desc("createdAt")]);
        let s = parse_sort(Some("-ratingsAverage, price"));
        assert_eq!(s[0].order, Order::Desc);
        assert_eq!(s[1], SortSpec::asc("price"));
    }

    #[test]
    fn fields_default_hides_version() {
        assert_eq!(parse_fields(None), Projection { fields: vec!["-__v".into()] });
        assert_eq!(parse_fields(Some("name, price")).fields, vec!["name", "price"]);
    }

    #[test]
    fn page_arithmetic() {
        assert_eq!(parse_page(Some("2"), Some("10")), Page { skip: 10, limit: 10 });
        assert_eq!(parse_page(None, None), Page { skip: 0, limit: 100 });
        assert_eq!(parse_page(Some("0"), Some("-3")), Page { skip: 0, limit: 100 });
        assert_eq!(parse_page(Some("abc"), Some("2.5")), Page { skip: 0, limit: 100 });
    }

    #[test]
    fn deserializes_nested_form() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"price":{"gte":"100"},"difficulty":["easy","medium"],"sort":"price"}"#)
                .unwrap();
        assert_eq!(parse_sort(req.sort_str()), vec![SortSpec::asc("price")]);
        assert!(matches!(parse_filter(&req), Filter::And(ref fs) if fs.len() == 2));
    }
}
