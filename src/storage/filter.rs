// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Typed timeline filters.
//!
//! Predicates are validated when they are added to a [`FilterBuilder`], then
//! composed into a [`Filter`] tree with explicit AND / OR nodes. The same tree
//! is evaluated in memory ([`Filter::matches`]) or rendered to a parameterised
//! SQL clause ([`Filter::to_sql`]).

use rusqlite::types::Value;

use crate::error::{ReplayError, Result};
use crate::model::TimelineEntry;

/// A single condition on a timeline row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    CameraIn(Vec<String>),
    LabelIn(Vec<String>),
    SourceId(String),
    /// `timestamp < t`
    Before(f64),
    /// `timestamp > t`
    After(f64),
}

impl Predicate {
    pub fn validate(&self) -> Result<()> {
        match self {
            Predicate::CameraIn(items) | Predicate::LabelIn(items) => {
                if items.is_empty() {
                    return Err(ReplayError::invalid("Filter list must not be empty"));
                }
                if items.iter().any(|s| s.trim().is_empty()) {
                    return Err(ReplayError::invalid("Filter list contains an empty value"));
                }
            }
            Predicate::SourceId(id) => {
                if id.trim().is_empty() {
                    return Err(ReplayError::invalid("source_id must not be empty"));
                }
            }
            Predicate::Before(t) | Predicate::After(t) => {
                if !t.is_finite() {
                    return Err(ReplayError::invalid("Filter timestamp must be finite"));
                }
            }
        }
        Ok(())
    }

    pub fn matches(&self, entry: &TimelineEntry) -> bool {
        match self {
            Predicate::CameraIn(cams) => cams.iter().any(|c| *c == entry.camera),
            Predicate::LabelIn(labels) => entry
                .label()
                .is_some_and(|l| labels.iter().any(|x| x == l)),
            Predicate::SourceId(id) => entry.source_id == *id,
            Predicate::Before(t) => entry.timestamp < *t,
            Predicate::After(t) => entry.timestamp > *t,
        }
    }

    fn to_sql(&self, params: &mut Vec<Value>) -> String {
        fn in_list(column: &str, items: &[String], params: &mut Vec<Value>) -> String {
            let marks = vec!["?"; items.len()].join(", ");
            params.extend(items.iter().cloned().map(Value::Text));
            format!("{column} IN ({marks})")
        }
        match self {
            Predicate::CameraIn(cams) => in_list("camera", cams, params),
            Predicate::LabelIn(labels) => in_list("json_extract(data, '$.label')", labels, params),
            Predicate::SourceId(id) => {
                params.push(Value::Text(id.clone()));
                "source_id = ?".into()
            }
            Predicate::Before(t) => {
                params.push(Value::Real(*t));
                "timestamp < ?".into()
            }
            Predicate::After(t) => {
                params.push(Value::Real(*t));
                "timestamp > ?".into()
            }
        }
    }
}

/// Composed filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row.
    Always,
    Pred(Predicate),
    All(Vec<Filter>),
    Any(Vec<Filter>),
}

impl Filter {
    pub fn matches(&self, entry: &TimelineEntry) -> bool {
        match self {
            Filter::Always => true,
            Filter::Pred(p) => p.matches(entry),
            Filter::All(parts) => parts.iter().all(|f| f.matches(entry)),
            Filter::Any(parts) => parts.iter().any(|f| f.matches(entry)),
        }
    }

    /// Render as a SQL boolean expression, appending bind values to `params`.
    pub fn to_sql(&self, params: &mut Vec<Value>) -> String {
        match self {
            Filter::Always => "1".into(),
            Filter::Pred(p) => p.to_sql(params),
            Filter::All(parts) if parts.is_empty() => "1".into(),
            Filter::Any(parts) if parts.is_empty() => "0".into(),
            Filter::All(parts) => join(parts, " AND ", params),
            Filter::Any(parts) => join(parts, " OR ", params),
        }
    }
}

fn join(parts: &[Filter], op: &str, params: &mut Vec<Value>) -> String {
    let rendered: Vec<String> = parts.iter().map(|p| p.to_sql(params)).collect();
    format!("({})", rendered.join(op))
}

/// Accumulates validated clauses; all clauses are AND-ed together.
#[derive(Debug, Default)]
pub struct FilterBuilder {
    clauses: Vec<Filter>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// AND a single predicate.
    pub fn and(mut self, predicate: Predicate) -> Result<Self> {
        predicate.validate()?;
        self.clauses.push(Filter::Pred(predicate));
        Ok(self)
    }

    /// AND a predicate only when one is given.
    pub fn and_maybe(self, predicate: Option<Predicate>) -> Result<Self> {
        match predicate {
            Some(p) => self.and(p),
            None => Ok(self),
        }
    }

    /// AND a group whose members are OR-ed.
    pub fn and_any(mut self, predicates: Vec<Predicate>) -> Result<Self> {
        if predicates.is_empty() {
            return Err(ReplayError::invalid("OR group must not be empty"));
        }
        for p in &predicates {
            p.validate()?;
        }
        self.clauses.push(Filter::Any(predicates.into_iter().map(Filter::Pred).collect()));
        Ok(self)
    }

    pub fn build(mut self) -> Filter {
        match self.clauses.len() {
            0 => Filter::Always,
            1 => self.clauses.remove(0),
            _ => Filter::All(self.clauses),
        }
    }
}

/// Split a comma separated query value; `"all"` or an empty value means no filter.
pub fn list_param(value: Option<&str>) -> Option<Vec<String>> {
    let value = value?.trim();
    if value.is_empty() || value == "all" {
        return None;
    }
    Some(value.split(',').map(|s| s.trim().to_string()).collect())
}
