//! Dotted-key query filters for node and event queries.
//!
//! A filter is parsed from query-string pairs. A bare key means equality;
//! the suffixes `__gt`, `__gte`, `__lt`, `__lte`, `__ne` compare, `__re`
//! matches a regex. Keys are dotted paths into the serialized document
//! (e.g. `data.kernel_revision.tree`). The literal string `null` matches an
//! absent or null field.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::HubError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Re,
}

#[derive(Clone, Debug)]
enum TermValue {
    Null,
    Text(String),
    Pattern(Regex),
}

#[derive(Clone, Debug)]
struct Term {
    path: Vec<String>,
    op: Op,
    value: TermValue,
}

/// A conjunction of terms; an empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    terms: Vec<Term>,
}

impl Filter {
    /// Parses query pairs into a filter. Fails with `InvalidInput` on an
    /// unknown operator suffix or an invalid regex.
    pub fn parse<'a, I>(pairs: I) -> Result<Self, HubError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut terms = Vec::new();
        for (key, raw) in pairs {
            let (field, op) = match key.rsplit_once("__") {
                Some((field, suffix)) => {
                    let op = match suffix {
                        "gt" => Op::Gt,
                        "gte" => Op::Gte,
                        "lt" => Op::Lt,
                        "lte" => Op::Lte,
                        "ne" => Op::Ne,
                        "re" => Op::Re,
                        other => {
                            return Err(HubError::InvalidInput(format!(
                                "unknown query operator '__{other}' in '{key}'"
                            )))
                        }
                    };
                    (field, op)
                }
                None => (key, Op::Eq),
            };
            if field.is_empty() {
                return Err(HubError::InvalidInput(format!("empty field in '{key}'")));
            }
            let value = match op {
                Op::Re => TermValue::Pattern(Regex::new(raw).map_err(|e| {
                    HubError::InvalidInput(format!("invalid regex for '{key}': {e}"))
                })?),
                _ if raw == "null" => TermValue::Null,
                _ => TermValue::Text(raw.to_string()),
            };
            terms.push(Term {
                path: field.split('.').map(str::to_string).collect(),
                op,
                value,
            });
        }
        Ok(Self { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether the serialized document satisfies every term.
    pub fn matches(&self, doc: &Value) -> bool {
        self.terms.iter().all(|term| term.matches(doc))
    }
}

impl Term {
    fn matches(&self, doc: &Value) -> bool {
        let found = resolve(doc, &self.path);
        let value = found.unwrap_or(&Value::Null);
        match (&self.op, &self.value) {
            (Op::Eq, TermValue::Null) => value.is_null(),
            (Op::Ne, TermValue::Null) => !value.is_null(),
            (Op::Eq, TermValue::Text(text)) => compare(value, text) == Some(Ordering::Equal),
            (Op::Ne, TermValue::Text(text)) => compare(value, text) != Some(Ordering::Equal),
            (Op::Gt, TermValue::Text(text)) => compare(value, text) == Some(Ordering::Greater),
            (Op::Lt, TermValue::Text(text)) => compare(value, text) == Some(Ordering::Less),
            (Op::Gte, TermValue::Text(text)) => matches!(
                compare(value, text),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            (Op::Lte, TermValue::Text(text)) => matches!(
                compare(value, text),
                Some(Ordering::Less) | Some(Ordering::Equal)
            ),
            (Op::Re, TermValue::Pattern(re)) => match text_form(value) {
                Some(text) => re.is_match(&text),
                None => false,
            },
            // Null only pairs with Eq/Ne; comparisons against null never match.
            _ => false,
        }
    }
}

fn resolve<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn text_form(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Type-aware comparison between a document value and a query literal:
/// numbers compare numerically, RFC 3339 timestamps as instants, everything
/// else as text. Objects and arrays never compare.
fn compare(value: &Value, literal: &str) -> Option<Ordering> {
    match value {
        Value::Number(n) => {
            let doc = n.as_f64()?;
            let lit: f64 = literal.parse().ok()?;
            doc.partial_cmp(&lit)
        }
        Value::String(s) => {
            if let (Ok(doc), Ok(lit)) = (
                s.parse::<DateTime<Utc>>(),
                literal.parse::<DateTime<Utc>>(),
            ) {
                return Some(doc.cmp(&lit));
            }
            Some(s.as_str().cmp(literal))
        }
        Value::Bool(b) => Some(b.to_string().as_str().cmp(literal)),
        _ => None,
    }
}
