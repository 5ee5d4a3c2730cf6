//! Thin row wrappers and the table query builder they are read through.
//!
//! # Responsibility
//! - Map a record class name to its table (`PostCommentRecord` -> `post_comments`).
//! - Carry one stored row as an ordered attribute map.
//! - Convert between JSON attribute values and SQLite values.
//!
//! # Invariants
//! - Records are read-only snapshots; writes go through `Scope`.

use crate::lookup::{inflect, ClassEntry, ClassKind, ClassRef, ClassRegistry};
use crate::model::Attributes;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Row;
use serde_json::Value;

mod scope;

pub use scope::{Filter, Scope};

pub type RecordId = i64;

pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Storage class for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordClass {
    name: String,
    table: String,
    primary_key: String,
}

impl RecordClass {
    /// Table name derived from the class name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: inflect::table_name(&name),
            name,
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Unfiltered query over the whole table.
    pub fn all(&self) -> Scope {
        Scope::new(&self.table, &self.primary_key)
    }

    /// Registers this class under its name so repositories can find it.
    pub fn register(self, registry: &ClassRegistry) -> ClassRef {
        registry.register(ClassEntry::new(self.name.clone(), self).kind(ClassKind::Record))
    }
}

/// One stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: String,
    primary_key: String,
    attributes: Attributes,
}

impl Record {
    pub fn new(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            attributes,
        }
    }

    pub(crate) fn from_row(table: &str, primary_key: &str, row: &Row<'_>) -> rusqlite::Result<Self> {
        let statement = row.as_ref();
        let mut attributes = Attributes::new();
        for index in 0..statement.column_count() {
            let name = statement.column_name(index)?.to_string();
            attributes.insert(name, json_from_sql(row.get_ref(index)?));
        }
        Ok(Self::new(table, primary_key, attributes))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn id(&self) -> Option<RecordId> {
        self.attributes.get(&self.primary_key).and_then(Value::as_i64)
    }

    /// Column values in read order.
    pub fn to_hash(&self) -> &Attributes {
        &self.attributes
    }

    pub fn into_attributes(self) -> Attributes {
        self.attributes
    }
}

pub(crate) fn json_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => Value::from(number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

pub(crate) fn sql_from_json(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{json_from_sql, sql_from_json, RecordClass};
    use rusqlite::types::{Value as SqlValue, ValueRef};
    use serde_json::json;

    #[test]
    fn table_name_follows_class_name() {
        let class = RecordClass::new("PostCommentRecord");
        assert_eq!(class.table(), "post_comments");
        assert_eq!(class.primary_key(), "id");
        assert_eq!(RecordClass::new("FooRecord").with_table("legacy_foo").table(), "legacy_foo");
    }

    #[test]
    fn values_convert_both_ways() {
        assert_eq!(sql_from_json(&json!(true)), SqlValue::Integer(1));
        assert_eq!(sql_from_json(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(sql_from_json(&json!({"a": 1})), SqlValue::Text("{\"a\":1}".into()));
        assert_eq!(json_from_sql(ValueRef::Integer(3)), json!(3));
        assert_eq!(json_from_sql(ValueRef::Null), json!(null));
    }
}
