//! Predicates and sort descriptors over stored records.
//!
//! Records are JSON objects; a predicate names a field and compares its value.
//! Queries compose by conjunction, so filtering a filtered view narrows it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// One condition on a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Equal(String, Value),
    NotEqual(String, Value),
    BeginsWith(String, String),
    EndsWith(String, String),
    Contains(String, String),
    GreaterThan(String, Value),
    LessThan(String, Value),
    Not(Box<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Predicate::Equal(field, expected) => field_of(record, field) == expected,
            Predicate::NotEqual(field, expected) => field_of(record, field) != expected,
            Predicate::BeginsWith(field, prefix) => {
                string_field(record, field).is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            Predicate::EndsWith(field, suffix) => {
                string_field(record, field).is_some_and(|s| s.ends_with(suffix.as_str()))
            }
            Predicate::Contains(field, needle) => {
                string_field(record, field).is_some_and(|s| s.contains(needle.as_str()))
            }
            Predicate::GreaterThan(field, bound) => {
                compare_values(field_of(record, field), bound) == Ordering::Greater
            }
            Predicate::LessThan(field, bound) => {
                compare_values(field_of(record, field), bound) == Ordering::Less
            }
            Predicate::Not(inner) => !inner.matches(record),
            Predicate::Or(alternatives) => alternatives.iter().any(|p| p.matches(record)),
        }
    }
}

/// Sort key of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub field: String,
    pub ascending: bool,
}

/// A conjunction of predicates plus an optional ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    predicates: Vec<Predicate>,
    sort: Vec<SortDescriptor>,
}

impl Query {
    /// Matches everything, in storage order.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn equal(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Predicate::Equal(field.into(), value.into()))
    }

    pub fn not_equal(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Predicate::NotEqual(field.into(), value.into()))
    }

    pub fn begins_with(self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.with(Predicate::BeginsWith(field.into(), prefix.into()))
    }

    pub fn ends_with(self, field: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.with(Predicate::EndsWith(field.into(), suffix.into()))
    }

    pub fn contains(self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.with(Predicate::Contains(field.into(), needle.into()))
    }

    /// Adds a sort key. Earlier keys take precedence.
    pub fn sorted_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort.push(SortDescriptor {
            field: field.into(),
            ascending,
        });
        self
    }

    /// Narrows this query by `other`. A sort on `other` replaces this one.
    pub fn and(mut self, other: Query) -> Self {
        self.predicates.extend(other.predicates);
        if !other.sort.is_empty() {
            self.sort = other.sort;
        }
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn sort_descriptors(&self) -> &[SortDescriptor] {
        &self.sort
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }

    /// Filters and orders `records`. The sort is stable.
    pub fn apply(&self, records: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut matching: Vec<Value> = records.into_iter().filter(|r| self.matches(r)).collect();
        if !self.sort.is_empty() {
            matching.sort_by(|a, b| {
                for descriptor in &self.sort {
                    let ordering =
                        compare_values(field_of(a, &descriptor.field), field_of(b, &descriptor.field));
                    let ordering = if descriptor.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        matching
    }
}

static NULL: Value = Value::Null;

fn field_of<'a>(record: &'a Value, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&NULL)
}

fn string_field<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}

// null < bool < number < string; other shapes compare equal.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
