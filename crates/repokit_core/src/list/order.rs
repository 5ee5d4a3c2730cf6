//! Order specifications and the in-memory comparator behind array lists.
//!
//! # Invariants
//! - Sorting is stable: fully tied items keep their input order.
//! - Nulls sort last ascending and first descending, matching the SQL
//!   emitted by `OrderSpec::to_sql`.
//! - One entry per column; a later entry replaces the direction in place.

use crate::repo::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

static COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Asc => f.write_str("ASC"),
            Self::Desc => f.write_str("DESC"),
        }
    }
}

/// Ordered `(column, direction)` list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderSpec {
    columns: Vec<(String, Direction)>,
}

impl OrderSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `"name, created_at DESC"`.
    pub fn parse(clause: &str) -> Result<Self, ConfigError> {
        let mut spec = Self::new();
        for part in clause.split(',') {
            let tokens: Vec<&str> = part.split_whitespace().collect();
            let (column, direction) = match tokens.as_slice() {
                [column] => (*column, Direction::Asc),
                [column, direction] => (
                    *column,
                    Direction::parse(direction)
                        .ok_or_else(|| ConfigError::InvalidOrder(clause.to_string()))?,
                ),
                _ => return Err(ConfigError::InvalidOrder(clause.to_string())),
            };
            spec = spec.then(column, direction)?;
        }
        Ok(spec)
    }

    /// Appends `column`, or replaces its direction if already present.
    pub fn then(mut self, column: &str, direction: Direction) -> Result<Self, ConfigError> {
        validate_column(column)?;
        match self.columns.iter_mut().find(|(existing, _)| existing == column) {
            Some((_, slot)) => *slot = direction,
            None => self.columns.push((column.to_string(), direction)),
        }
        Ok(self)
    }

    pub fn asc(self, column: &str) -> Result<Self, ConfigError> {
        self.then(column, Direction::Asc)
    }

    pub fn desc(self, column: &str) -> Result<Self, ConfigError> {
        self.then(column, Direction::Desc)
    }

    /// `other`'s entries applied on top of this one.
    pub fn merge(self, other: &OrderSpec) -> Self {
        other
            .columns
            .iter()
            .fold(self, |mut spec, (column, direction)| {
                match spec.columns.iter_mut().find(|(existing, _)| existing == column) {
                    Some((_, slot)) => *slot = *direction,
                    None => spec.columns.push((column.clone(), *direction)),
                }
                spec
            })
    }

    pub fn columns(&self) -> &[(String, Direction)] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn reversed(&self) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|(column, direction)| (column.clone(), direction.reversed()))
                .collect(),
        }
    }

    /// `ORDER BY` body, null placement included.
    pub fn to_sql(&self) -> String {
        self.columns
            .iter()
            .map(|(column, direction)| {
                let nulls = match direction {
                    Direction::Asc => "NULLS LAST",
                    Direction::Desc => "NULLS FIRST",
                };
                format!("{} {direction} {nulls}", quote_column(column))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Compares two items column by column; ties fall through.
    pub fn compare<T, F>(&self, left: &T, right: &T, value: F) -> Ordering
    where
        F: for<'a> Fn(&'a T, &str) -> Option<&'a Value>,
    {
        for (column, direction) in &self.columns {
            let key = attribute_name(column);
            let ordering = compare_nulls_last(value(left, key), value(right, key));
            let ordering = match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort.
    pub fn sort<T, F>(&self, items: &mut [T], value: F)
    where
        F: for<'a> Fn(&'a T, &str) -> Option<&'a Value>,
    {
        if self.is_empty() {
            return;
        }
        items.sort_by(|left, right| self.compare(left, right, &value));
    }
}

impl Display for OrderSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|(column, direction)| format!("{column} {direction}"))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Argument shapes accepted wherever an order is given.
pub trait IntoOrder {
    fn into_order(self) -> Result<OrderSpec, ConfigError>;
}

impl IntoOrder for OrderSpec {
    fn into_order(self) -> Result<OrderSpec, ConfigError> {
        Ok(self)
    }
}

impl IntoOrder for &OrderSpec {
    fn into_order(self) -> Result<OrderSpec, ConfigError> {
        Ok(self.clone())
    }
}

impl IntoOrder for &str {
    fn into_order(self) -> Result<OrderSpec, ConfigError> {
        OrderSpec::parse(self)
    }
}

impl IntoOrder for &[(&str, Direction)] {
    fn into_order(self) -> Result<OrderSpec, ConfigError> {
        self.iter()
            .try_fold(OrderSpec::new(), |spec, (column, direction)| {
                spec.then(column, *direction)
            })
    }
}

impl<const N: usize> IntoOrder for [(&str, Direction); N] {
    fn into_order(self) -> Result<OrderSpec, ConfigError> {
        self.as_slice().into_order()
    }
}

pub(crate) fn validate_column(column: &str) -> Result<(), ConfigError> {
    if COLUMN_RE.is_match(column) {
        Ok(())
    } else {
        Err(ConfigError::InvalidColumn(column.to_string()))
    }
}

/// `posts.created_at` reads `created_at` from in-memory rows.
fn attribute_name(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

fn quote_column(column: &str) -> String {
    column
        .split('.')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join(".")
}

fn compare_nulls_last(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(left), Some(right)) => compare_values(left, right),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .unwrap_or_default()
                .partial_cmp(&b.as_f64().unwrap_or_default())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (a, b) if type_rank(a) == type_rank(b) => a.to_string().cmp(&b.to_string()),
        (a, b) => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, IntoOrder, OrderSpec};
    use crate::model::Attributes;
    use crate::repo::ConfigError;
    use serde_json::{json, Value};

    fn rows(values: Value) -> Vec<Attributes> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|row| row.as_object().cloned().unwrap())
            .collect()
    }

    fn sorted(order: &OrderSpec, values: Value) -> Vec<Attributes> {
        let mut items = rows(values);
        order.sort(&mut items, |row, column| row.get(column));
        items
    }

    #[test]
    fn multi_key_sort_puts_nulls_last_ascending() {
        let order = OrderSpec::new().asc("a").unwrap().desc("b").unwrap();
        let input = json!([{ "a": null, "b": 5 }, { "a": 1, "b": 1 }, { "a": 1, "b": 2 }]);
        assert_eq!(
            sorted(&order, input),
            rows(json!([{ "a": 1, "b": 2 }, { "a": 1, "b": 1 }, { "a": null, "b": 5 }]))
        );
    }

    #[test]
    fn descending_puts_nulls_first() {
        let order = OrderSpec::parse("a DESC").unwrap();
        let input = json!([{ "a": 1, "b": 2 }, { "a": 1, "b": 1 }, { "a": null, "b": 5 }]);
        let result = sorted(&order, input);
        assert_eq!(result[0].get("a"), Some(&json!(null)));
        assert_eq!(result[1].get("b"), Some(&json!(2)));
    }

    #[test]
    fn ties_keep_input_order_for_every_permutation() {
        let order = OrderSpec::parse("rank").unwrap();
        let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for permutation in permutations {
            let input: Vec<Value> = permutation
                .iter()
                .map(|tag| json!({ "rank": 1, "tag": tag }))
                .collect();
            let result = sorted(&order, Value::Array(input));
            let tags: Vec<&Value> = result.iter().map(|row| &row["tag"]).collect();
            let expected: Vec<Value> = permutation.iter().map(|tag| json!(tag)).collect();
            assert_eq!(tags, expected.iter().collect::<Vec<_>>());
        }
    }

    #[test]
    fn later_entries_replace_direction_in_place() {
        let order = OrderSpec::parse("a DESC, b")
            .unwrap()
            .merge(&[("a", Direction::Asc)].into_order().unwrap());
        assert_eq!(order.to_string(), "a ASC, b ASC");
    }

    #[test]
    fn reversing_twice_restores_directions() {
        let order = OrderSpec::parse("a, b DESC").unwrap();
        assert_eq!(order.reversed().to_string(), "a DESC, b ASC");
        assert_eq!(order.reversed().reversed(), order);
    }

    #[test]
    fn sql_names_null_placement() {
        let order = OrderSpec::parse("posts.created_at desc, id").unwrap();
        assert_eq!(
            order.to_sql(),
            "\"posts\".\"created_at\" DESC NULLS FIRST, \"id\" ASC NULLS LAST"
        );
    }

    #[test]
    fn malformed_clauses_are_rejected() {
        assert_eq!(
            OrderSpec::parse("name; DROP TABLE users").unwrap_err(),
            ConfigError::InvalidOrder("name; DROP TABLE users".into())
        );
        assert_eq!(
            OrderSpec::parse("na-me").unwrap_err(),
            ConfigError::InvalidColumn("na-me".into())
        );
    }
}
