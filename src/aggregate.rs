//! Grouped aggregation over a collection: match, group with accumulators, optional sort.

use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

use crate::document::Document;
use crate::errors::DbError;
use crate::query::{Filter, SortSpec, as_number, bson_eq, compare_bson, compare_docs, get_path};
use crate::types::ID_FIELD;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    /// One group for every matching document; `_id` is null.
    All,
    Field(String),
    /// String values upper-cased; other values used as they are.
    Upper(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    /// Number of documents in the group (Int64).
    Count,
    Sum(String),
    /// Mean of the numeric values; null when the group has none.
    Avg(String),
    Min(String),
    Max(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub filter: Filter,
    pub key: GroupKey,
    pub accumulators: Vec<(String, Accumulator)>,
    pub sort: Option<SortSpec>,
}

impl GroupSpec {
    #[must_use]
    pub fn new(key: GroupKey) -> Self {
        Self { filter: Filter::True, key, accumulators: Vec::new(), sort: None }
    }

    #[must_use]
    pub fn matching(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn accumulate(mut self, name: impl Into<String>, acc: Accumulator) -> Self {
        self.accumulators.push((name.into(), acc));
        self
    }

    #[must_use]
    pub fn sort_by(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }
}

#[derive(Debug, Clone)]
enum AccState {
    Count(i64),
    Sum { total: f64, all_int: bool },
    Avg { total: f64, n: u64 },
    Extreme { best: Option<Bson>, want: Ordering },
}

impl AccState {
    fn start(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Count => Self::Count(0),
            Accumulator::Sum(_) => Self::Sum { total: 0.0, all_int: true },
            Accumulator::Avg(_) => Self::Avg { total: 0.0, n: 0 },
            Accumulator::Min(_) => Self::Extreme { best: None, want: Ordering::Less },
            Accumulator::Max(_) => Self::Extreme { best: None, want: Ordering::Greater },
        }
    }

    fn feed(&mut self, value: Option<&Bson>) {
        match self {
            Self::Count(n) => *n += 1,
            Self::Sum { total, all_int } => {
                if let Some(v) = value
                    && let Some(x) = as_number(v)
                {
                    *total += x;
                    *all_int &= matches!(v, Bson::Int32(_) | Bson::Int64(_));
                }
            }
            Self::Avg { total, n } => {
                if let Some(x) = value.and_then(as_number) {
                    *total += x;
                    *n += 1;
                }
            }
            Self::Extreme { best, want } => {
                let Some(v) = value.filter(|v| !matches!(v, Bson::Null)) else { return };
                if best.as_ref().is_none_or(|b| compare_bson(v, b) == *want) {
                    *best = Some(v.clone());
                }
            }
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn finish(self) -> Bson {
        match self {
            Self::Count(n) => Bson::Int64(n),
            Self::Sum { total, all_int: true } => Bson::Int64(total as i64),
            Self::Sum { total, .. } => Bson::Double(total),
            Self::Avg { n: 0, .. } => Bson::Null,
            Self::Avg { total, n } => Bson::Double(total / n as f64),
            Self::Extreme { best, .. } => best.unwrap_or(Bson::Null),
        }
    }
}

fn accumulator_path(acc: &Accumulator) -> Option<&str> {
    match acc {
        Accumulator::Count => None,
        Accumulator::Sum(p) | Accumulator::Avg(p) | Accumulator::Min(p) | Accumulator::Max(p) => Some(p),
    }
}

fn group_key(doc: &BsonDocument, key: &GroupKey) -> Bson {
    match key {
        GroupKey::All => Bson::Null,
        GroupKey::Field(p) => get_path(doc, p).cloned().unwrap_or(Bson::Null),
        GroupKey::Upper(p) => match get_path(doc, p) {
            Some(Bson::String(s)) => Bson::String(s.to_uppercase()),
            Some(v) => v.clone(),
            None => Bson::Null,
        },
    }
}

/// Groups already-matched documents; `GroupSpec::filter` is applied by the caller.
///
/// # Errors
/// Returns `Aggregation` when an output name is empty, `_id`, or repeated.
pub fn run_group(docs: &[Document], spec: &GroupSpec) -> Result<Vec<BsonDocument>, DbError> {
    for (i, (name, _)) in spec.accumulators.iter().enumerate() {
        if name.is_empty() || name == ID_FIELD {
            return Err(DbError::Aggregation(format!("invalid accumulator name `{name}`")));
        }
        if spec.accumulators[..i].iter().any(|(n, _)| n == name) {
            return Err(DbError::Aggregation(format!("duplicate accumulator `{name}`")));
        }
    }

    let mut groups: Vec<(Bson, Vec<AccState>)> = Vec::new();
    for doc in docs {
        let key = group_key(&doc.data, &spec.key);
        let idx = match groups.iter().position(|(k, _)| bson_eq(k, &key)) {
            Some(i) => i,
            None => {
                groups.push((key, spec.accumulators.iter().map(|(_, a)| AccState::start(a)).collect()));
                groups.len() - 1
            }
        };
        let (_, states) = &mut groups[idx];
        for ((_, acc), state) in spec.accumulators.iter().zip(states.iter_mut()) {
            state.feed(accumulator_path(acc).and_then(|p| get_path(&doc.data, p)));
        }
    }

    let mut out: Vec<BsonDocument> = groups
        .into_iter()
        .map(|(key, states)| {
            let mut row = BsonDocument::new();
            row.insert(ID_FIELD, key);
            for ((name, _), state) in spec.accumulators.iter().zip(states) {
                row.insert(name.clone(), state.finish());
            }
            row
        })
        .collect();
    if let Some(sort) = &spec.sort {
        out.sort_by(|a, b| compare_docs(a, b, std::slice::from_ref(sort)));
    }
    Ok(out)
}
