//! Per-collection field rules.
//!
//! A schema casts and checks what goes into a collection: defaults and setters on write,
//! validators on create (and on update when asked), casting of filter operands on read, and
//! the set of fields clients may never write.

use bson::{Bson, Document as BsonDocument};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::errors::DbError;
use crate::query::{Filter, UpdateDoc, as_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    /// Id of another document (UUID string).
    Reference,
    Array,
    Any,
}

impl FieldType {
    const fn label(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Integer => "Integer",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::Reference => "Reference",
            Self::Array => "Array",
            Self::Any => "Any",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub kind: FieldType,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub one_of: Option<Vec<String>>,
    pub default: Option<Bson>,
    pub trim: bool,
    pub lowercase: bool,
    /// Setter rounding numbers to this many decimals on every write.
    pub round_to: Option<i32>,
    /// Clients may not write this field; only internal writes can.
    pub protected: bool,
}

impl FieldRule {
    #[must_use]
    pub const fn new(kind: FieldType) -> Self {
        Self {
            kind,
            required: false,
            min: None,
            max: None,
            min_len: None,
            max_len: None,
            one_of: None,
            default: None,
            trim: false,
            lowercase: false,
            round_to: None,
            protected: false,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    #[must_use]
    pub const fn length(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    #[must_use]
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_of = Some(values.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn default_value(mut self, v: impl Into<Bson>) -> Self {
        self.default = Some(v.into());
        self
    }

    #[must_use]
    pub const fn trimmed(mut self) -> Self {
        self.trim = true;
        self
    }

    #[must_use]
    pub const fn lowercased(mut self) -> Self {
        self.lowercase = true;
        self
    }

    #[must_use]
    pub const fn rounded(mut self, decimals: i32) -> Self {
        self.round_to = Some(decimals);
        self
    }

    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: BTreeMap<String, FieldRule>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.insert(name.into(), rule);
        self
    }

    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    pub fn apply_defaults(&self, doc: &mut BsonDocument) {
        for (name, rule) in &self.fields {
            if let Some(d) = &rule.default
                && !doc.contains_key(name)
            {
                doc.insert(name.clone(), d.clone());
            }
        }
    }

    /// Casts stored values to their declared type and runs the trim, lowercase and rounding
    /// setters.
    ///
    /// # Errors
    /// Returns `Cast` when a present value cannot be converted.
    pub fn apply_setters(&self, doc: &mut BsonDocument) -> Result<(), DbError> {
        for (name, rule) in &self.fields {
            let Some(v) = doc.get(name) else { continue };
            if matches!(v, Bson::Null) {
                continue;
            }
            let mut v = cast_value(name, rule.kind, v)?;
            if rule.trim
                && let Bson::String(s) = &v
            {
                v = Bson::String(s.trim().to_string());
            }
            if rule.lowercase
                && let Bson::String(s) = &v
            {
                v = Bson::String(s.to_lowercase());
            }
            if let Some(decimals) = rule.round_to
                && let Some(n) = as_number(&v)
            {
                let factor = 10f64.powi(decimals);
                v = Bson::Double((n * factor).round() / factor);
            }
            doc.insert(name.clone(), v);
        }
        Ok(())
    }

    /// Runs every validator against a full document.
    ///
    /// # Errors
    /// Returns the first `Validation` failure.
    pub fn validate(&self, doc: &BsonDocument) -> Result<(), DbError> {
        for (name, rule) in &self.fields {
            validate_field(name, rule, doc.get(name))?;
        }
        Ok(())
    }

    /// Runs validators only for the given paths, as update-time validation does.
    ///
    /// # Errors
    /// Returns the first `Validation` failure.
    pub fn validate_paths<'a>(
        &self,
        doc: &BsonDocument,
        paths: impl Iterator<Item = &'a str>,
    ) -> Result<(), DbError> {
        for p in paths {
            if let Some(rule) = self.fields.get(p) {
                validate_field(p, rule, doc.get(p))?;
            }
        }
        Ok(())
    }

    /// Rejects client input that touches protected fields.
    ///
    /// # Errors
    /// Returns `ProtectedField` naming the first offending path.
    pub fn check_writable<'a>(&self, paths: impl Iterator<Item = &'a str>) -> Result<(), DbError> {
        for p in paths {
            let top = p.split('.').next().unwrap_or(p);
            if self.fields.get(top).is_some_and(|r| r.protected) {
                return Err(DbError::ProtectedField(top.to_string()));
            }
        }
        Ok(())
    }

    /// Casts an update's `$set` values like a stored document would be.
    ///
    /// # Errors
    /// Returns `Cast` for values that do not fit their declared type.
    pub fn cast_update(&self, update: &UpdateDoc) -> Result<UpdateDoc, DbError> {
        let mut out = update.clone();
        for (path, v) in &mut out.set {
            if let Some(rule) = self.fields.get(path.as_str())
                && !matches!(v, Bson::Null)
            {
                *v = cast_value(path, rule.kind, v)?;
            }
        }
        Ok(out)
    }

    /// Casts filter operands against declared field types; unknown paths pass through.
    ///
    /// # Errors
    /// Returns `Cast` for operands that cannot be converted, e.g. `price >= "abc"`.
    pub fn cast_filter(&self, filter: &Filter) -> Result<Filter, DbError> {
        Ok(match filter {
            Filter::True => Filter::True,
            Filter::And(fs) => Filter::And(fs.iter().map(|f| self.cast_filter(f)).collect::<Result<_, _>>()?),
            Filter::Not(f) => Filter::Not(Box::new(self.cast_filter(f)?)),
            Filter::In { path, values, raw } => {
                let text = |i: usize| raw.as_ref().and_then(|r| r.get(i)).map(String::as_str);
                Filter::In {
                    path: path.clone(),
                    values: values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| self.cast_operand(path, v, text(i)))
                        .collect::<Result<_, _>>()?,
                    raw: raw.clone(),
                }
            }
            Filter::Cmp { path, op, value, raw } => Filter::Cmp {
                path: path.clone(),
                op: *op,
                value: self.cast_operand(path, value, raw.as_deref())?,
                raw: raw.clone(),
            },
        })
    }

    /// Text-typed fields are cast from the request text when there is one, so `0001` stays
    /// `"0001"` rather than going through an integer.
    fn cast_operand(&self, path: &str, value: &Bson, raw: Option<&str>) -> Result<Bson, DbError> {
        match (self.fields.get(path), raw) {
            (Some(rule), _) if rule.kind == FieldType::Array => Ok(value.clone()),
            (Some(rule), Some(text)) if matches!(rule.kind, FieldType::String | FieldType::Reference) => {
                cast_value(path, rule.kind, &Bson::String(text.to_string()))
            }
            (Some(rule), _) => cast_value(path, rule.kind, value),
            (None, _) => Ok(value.clone()),
        }
    }
}

fn cast_error(field: &str, kind: FieldType, value: &Bson) -> DbError {
    DbError::Cast { field: field.to_string(), expected: kind.label().to_string(), value: value.to_string() }
}

fn cast_value(field: &str, kind: FieldType, value: &Bson) -> Result<Bson, DbError> {
    let fail = || cast_error(field, kind, value);
    match kind {
        FieldType::Any | FieldType::Array => Ok(value.clone()),
        FieldType::Number => match value {
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(value.clone()),
            Bson::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(Bson::Double).ok_or_else(fail),
            _ => Err(fail()),
        },
        FieldType::Integer => match value {
            Bson::Int32(i) => Ok(Bson::Int64(i64::from(*i))),
            Bson::Int64(_) => Ok(value.clone()),
            #[allow(clippy::cast_possible_truncation)]
            Bson::Double(f) if f.fract() == 0.0 && f.is_finite() => Ok(Bson::Int64(*f as i64)),
            Bson::String(s) => s.trim().parse::<i64>().map(Bson::Int64).map_err(|_| fail()),
            _ => Err(fail()),
        },
        FieldType::String => match value {
            Bson::String(_) => Ok(value.clone()),
            Bson::Int32(i) => Ok(Bson::String(i.to_string())),
            Bson::Int64(i) => Ok(Bson::String(i.to_string())),
            Bson::Double(f) => Ok(Bson::String(f.to_string())),
            Bson::Boolean(b) => Ok(Bson::String(b.to_string())),
            _ => Err(fail()),
        },
        FieldType::Boolean => match value {
            Bson::Boolean(_) => Ok(value.clone()),
            Bson::String(s) => match s.as_str() {
                "true" | "1" | "yes" => Ok(Bson::Boolean(true)),
                "false" | "0" | "no" => Ok(Bson::Boolean(false)),
                _ => Err(fail()),
            },
            Bson::Int32(0) | Bson::Int64(0) => Ok(Bson::Boolean(false)),
            Bson::Int32(1) | Bson::Int64(1) => Ok(Bson::Boolean(true)),
            _ => Err(fail()),
        },
        FieldType::Date => match value {
            Bson::DateTime(_) => Ok(value.clone()),
            Bson::Int64(ms) => Ok(Bson::DateTime(bson::DateTime::from_millis(*ms))),
            Bson::String(s) => parse_date(s).map(Bson::DateTime).ok_or_else(fail),
            _ => Err(fail()),
        },
        FieldType::Reference => match value {
            Bson::String(s) if crate::types::DocumentId::parse(s).is_ok() => Ok(value.clone()),
            _ => Err(fail()),
        },
    }
}

fn parse_date(s: &str) -> Option<bson::DateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(bson::DateTime::from_millis(dt.with_timezone(&Utc).timestamp_millis()));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| bson::DateTime::from_millis(dt.and_utc().timestamp_millis()))
}

fn validate_field(name: &str, rule: &FieldRule, value: Option<&Bson>) -> Result<(), DbError> {
    let invalid = |message: String| DbError::Validation { field: name.to_string(), message };
    let value = match value {
        None | Some(Bson::Null) => {
            return if rule.required { Err(invalid("is required".into())) } else { Ok(()) };
        }
        Some(v) => v,
    };
    if let Bson::String(s) = value {
        if rule.required && s.trim().is_empty() {
            return Err(invalid("is required".into()));
        }
        let len = s.chars().count();
        if let Some(min) = rule.min_len
            && len < min
        {
            return Err(invalid(format!("must have at least {min} characters")));
        }
        if let Some(max) = rule.max_len
            && len > max
        {
            return Err(invalid(format!("must have at most {max} characters")));
        }
        if let Some(allowed) = &rule.one_of
            && !allowed.iter().any(|a| a == s)
        {
            return Err(invalid(format!("must be one of {}", allowed.join(", "))));
        }
    }
    if let Some(n) = as_number(value) {
        if let Some(min) = rule.min
            && n < min
        {
            return Err(invalid(format!("must be >= {min}")));
        }
        if let Some(max) = rule.max
            && n > max
        {
            return Err(invalid(format!("must be <= {max}")));
        }
    }
    Ok(())
}
