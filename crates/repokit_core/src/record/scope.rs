//! Table query builder and the storage primitives repositories call.
//!
//! # Responsibility
//! - Compose filters, joins, extra selects, order, limit and offset into SQL.
//! - Execute reads and writes, classifying constraint failures.
//!
//! # Invariants
//! - Values are always bound, never interpolated.
//! - Equality filters double as defaults for rows created through the scope.

use super::{sql_from_json, Record, RecordId};
use crate::list::{IntoOrder, OrderSpec};
use crate::model::Attributes;
use crate::repo::{ConfigError, RepoError, RepoResult};
use log::debug;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Raw predicate with positional `?` parameters.
    Sql(String, Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    table: String,
    primary_key: String,
    filters: Vec<Filter>,
    selects: Vec<String>,
    joins: Vec<String>,
    distinct: bool,
    order: OrderSpec,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Scope {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            filters: Vec::new(),
            selects: Vec::new(),
            joins: Vec::new(),
            distinct: false,
            order: OrderSpec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order_spec(&self) -> &OrderSpec {
        &self.order
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<usize> {
        self.offset
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.into(), value.into()));
        self
    }

    pub fn where_attributes(self, attributes: &Attributes) -> Self {
        attributes
            .iter()
            .fold(self, |scope, (column, value)| scope.where_eq(column.clone(), value.clone()))
    }

    pub fn where_sql(mut self, predicate: impl Into<String>, params: Vec<Value>) -> Self {
        self.filters.push(Filter::Sql(predicate.into(), params));
        self
    }

    /// Extra select expression, e.g. `(SELECT COUNT(*) ...) AS posts_count`.
    pub fn select(mut self, expression: impl Into<String>) -> Self {
        self.selects.push(expression.into());
        self
    }

    pub fn join(mut self, clause: impl Into<String>) -> Self {
        self.joins.push(clause.into());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Appends to the current order.
    pub fn order(mut self, order: impl IntoOrder) -> Result<Self, ConfigError> {
        self.order = self.order.merge(&order.into_order()?);
        Ok(self)
    }

    /// Replaces the current order.
    pub fn reorder(mut self, order: impl IntoOrder) -> Result<Self, ConfigError> {
        self.order = order.into_order()?;
        Ok(self)
    }

    pub fn with_order(mut self, order: OrderSpec) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    /// Attributes implied by equality filters.
    pub fn defaults(&self) -> Attributes {
        self.filters
            .iter()
            .filter_map(|filter| match filter {
                Filter::Eq(column, value) => Some((column.clone(), value.clone())),
                Filter::Sql(..) => None,
            })
            .collect()
    }

    fn where_clause(&self, bind_values: &mut Vec<SqlValue>) -> String {
        if self.filters.is_empty() {
            return String::new();
        }
        let predicates: Vec<String> = self
            .filters
            .iter()
            .map(|filter| match filter {
                Filter::Eq(column, Value::Null) => {
                    format!("{} IS NULL", self.qualified(column))
                }
                Filter::Eq(column, value) => {
                    bind_values.push(sql_from_json(value));
                    format!("{} = ?", self.qualified(column))
                }
                Filter::Sql(predicate, params) => {
                    bind_values.extend(params.iter().map(sql_from_json));
                    format!("({predicate})")
                }
            })
            .collect();
        format!(" WHERE {}", predicates.join(" AND "))
    }

    fn select_sql(&self, bind_values: &mut Vec<SqlValue>) -> String {
        let mut columns = vec![format!("{}.*", quote_ident(&self.table))];
        columns.extend(self.selects.iter().cloned());

        let mut sql = format!(
            "SELECT {}{} FROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            columns.join(", "),
            quote_ident(&self.table)
        );
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&self.where_clause(bind_values));
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.to_sql());
        }
        match (self.limit.map(sql_count), self.offset.map(sql_count)) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        sql
    }

    fn qualified(&self, column: &str) -> String {
        if column.contains('.') {
            column
                .split('.')
                .map(quote_ident)
                .collect::<Vec<_>>()
                .join(".")
        } else {
            format!("{}.{}", quote_ident(&self.table), quote_ident(column))
        }
    }

    /// Rows matching the scope, in scope order.
    pub fn load(&self, conn: &Connection) -> RepoResult<Vec<Record>> {
        let mut bind_values = Vec::new();
        let sql = self.select_sql(&mut bind_values);
        debug!("event=scope_load module=record status=start table={}", self.table);

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Record::from_row(&self.table, &self.primary_key, row)?);
        }
        Ok(records)
    }

    pub fn count(&self, conn: &Connection) -> RepoResult<usize> {
        let mut bind_values = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM ({})",
            self.select_sql(&mut bind_values)
        );
        let count: i64 = conn.query_row(&sql, params_from_iter(bind_values.iter()), |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn exists(&self, conn: &Connection) -> RepoResult<bool> {
        Ok(self.clone().limit(Some(1)).count(conn)? > 0)
    }

    /// Record by primary key within this scope.
    pub fn find(&self, conn: &Connection, id: RecordId) -> RepoResult<Record> {
        self.clone()
            .where_eq(self.primary_key.clone(), id)
            .first(conn)?
            .ok_or_else(|| RepoError::NotFound {
                table: self.table.clone(),
                key: format!("{}={id}", self.primary_key),
            })
    }

    /// First record matching `attributes`; not-found is an error.
    pub fn find_by(&self, conn: &Connection, attributes: &Attributes) -> RepoResult<Record> {
        self.find_optional_by(conn, attributes)?
            .ok_or_else(|| RepoError::NotFound {
                table: self.table.clone(),
                key: describe(attributes),
            })
    }

    pub fn find_optional_by(
        &self,
        conn: &Connection,
        attributes: &Attributes,
    ) -> RepoResult<Option<Record>> {
        self.clone().where_attributes(attributes).first(conn)
    }

    fn first(self, conn: &Connection) -> RepoResult<Option<Record>> {
        Ok(self.limit(Some(1)).offset(None).load(conn)?.into_iter().next())
    }

    /// Inserts a row with the scope defaults under `attributes`.
    pub fn create(&self, conn: &Connection, attributes: &Attributes) -> RepoResult<Record> {
        let mut values = self.defaults();
        for (column, value) in attributes {
            values.insert(column.clone(), value.clone());
        }

        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&self.table))
        } else {
            let columns: Vec<String> = values.keys().map(|column| quote_ident(column)).collect();
            let placeholders = vec!["?"; values.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                quote_ident(&self.table),
                columns.join(", ")
            )
        };
        let bind_values: Vec<SqlValue> = values.values().map(sql_from_json).collect();
        conn.execute(&sql, params_from_iter(bind_values.iter()))?;

        self.reload(conn, conn.last_insert_rowid())
    }

    /// Applies `attributes` to the record with `id`.
    pub fn update(
        &self,
        conn: &Connection,
        id: RecordId,
        attributes: &Attributes,
    ) -> RepoResult<Record> {
        let existing = self.find(conn, id)?;
        if attributes.is_empty() {
            return Ok(existing);
        }

        let assignments: Vec<String> = attributes
            .keys()
            .map(|column| format!("{} = ?", quote_ident(column)))
            .collect();
        let mut bind_values: Vec<SqlValue> = attributes.values().map(sql_from_json).collect();
        bind_values.push(SqlValue::Integer(id));
        conn.execute(
            &format!(
                "UPDATE {} SET {} WHERE {} = ?",
                quote_ident(&self.table),
                assignments.join(", "),
                quote_ident(&self.primary_key)
            ),
            params_from_iter(bind_values.iter()),
        )?;

        self.reload(conn, id)
    }

    /// Deletes the record with `id`, returning its last state.
    pub fn destroy(&self, conn: &Connection, id: RecordId) -> RepoResult<Record> {
        let existing = self.find(conn, id)?;
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?",
                quote_ident(&self.table),
                quote_ident(&self.primary_key)
            ),
            [id],
        )?;
        Ok(existing)
    }

    // A written row may fall outside SQL filters; fall back to the bare table.
    fn reload(&self, conn: &Connection, id: RecordId) -> RepoResult<Record> {
        let narrowed = self.clone().where_eq(self.primary_key.clone(), id);
        match narrowed.first(conn)? {
            Some(record) => Ok(record),
            None => Scope::new(&self.table, &self.primary_key).find(conn, id),
        }
    }
}

/// SQLite integers are signed 64-bit; larger windows mean "no bound".
fn sql_count(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn describe(attributes: &Attributes) -> String {
    attributes
        .iter()
        .map(|(column, value)| format!("{column}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::Scope;
    use crate::repo::{ErrorKind, RepoError};
    use rusqlite::Connection;
    use serde_json::json;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                admin INTEGER NOT NULL DEFAULT 0
            );",
        )
        .unwrap();
        conn
    }

    fn attrs(value: serde_json::Value) -> crate::model::Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_filters_become_create_defaults() {
        let conn = conn();
        let admins = Scope::new("users", "id").where_eq("admin", 1);
        let created = admins
            .create(&conn, &attrs(json!({ "email": "root@example.com" })))
            .unwrap();
        assert_eq!(created.get("admin"), Some(&json!(1)));
        assert_eq!(admins.count(&conn).unwrap(), 1);
    }

    #[test]
    fn oversized_windows_are_clamped() {
        let conn = conn();
        let all = Scope::new("users", "id");
        all.create(&conn, &attrs(json!({ "email": "a@example.com" }))).unwrap();

        assert_eq!(all.clone().limit(Some(usize::MAX)).count(&conn).unwrap(), 1);
        assert_eq!(all.clone().offset(Some(usize::MAX)).count(&conn).unwrap(), 0);
    }

    #[test]
    fn find_outside_scope_is_not_found() {
        let conn = conn();
        let all = Scope::new("users", "id");
        let user = all.create(&conn, &attrs(json!({ "email": "a@example.com" }))).unwrap();
        let admins = all.clone().where_eq("admin", 1);

        let err = admins.find(&conn, user.id().unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecordNotFound);
        assert!(all.find(&conn, user.id().unwrap()).is_ok());
    }

    #[test]
    fn order_limit_offset_and_extra_selects() {
        let conn = conn();
        let all = Scope::new("users", "id");
        for (email, name) in [("a@x", Some("b")), ("b@x", None), ("c@x", Some("a"))] {
            all.create(&conn, &attrs(json!({ "email": email, "name": name })))
                .unwrap();
        }

        let names: Vec<_> = all
            .clone()
            .select("upper(email) AS shout")
            .order("name")
            .unwrap()
            .load(&conn)
            .unwrap()
            .into_iter()
            .map(|record| record.get("shout").cloned().unwrap())
            .collect();
        assert_eq!(names, [json!("C@X"), json!("A@X"), json!("B@X")]);

        let page = all.clone().order("id").unwrap().limit(Some(1)).offset(Some(1));
        assert_eq!(page.load(&conn).unwrap()[0].get("email"), Some(&json!("b@x")));
        assert_eq!(page.count(&conn).unwrap(), 1);
    }

    #[test]
    fn update_and_destroy_go_through_find() {
        let conn = conn();
        let all = Scope::new("users", "id");
        let user = all.create(&conn, &attrs(json!({ "email": "a@x" }))).unwrap();
        let id = user.id().unwrap();

        let updated = all.update(&conn, id, &attrs(json!({ "name": "Ann" }))).unwrap();
        assert_eq!(updated.get("name"), Some(&json!("Ann")));

        all.destroy(&conn, id).unwrap();
        assert!(matches!(
            all.destroy(&conn, id),
            Err(RepoError::NotFound { .. })
        ));
    }

    #[test]
    fn constraint_failures_are_typed() {
        let conn = conn();
        let all = Scope::new("users", "id");
        all.create(&conn, &attrs(json!({ "email": "a@x" }))).unwrap();

        let taken = all.create(&conn, &attrs(json!({ "email": "a@x" }))).unwrap_err();
        assert_eq!(taken.kind(), ErrorKind::RecordNotUnique);
        let blank = all.create(&conn, &attrs(json!({ "name": "x" }))).unwrap_err();
        assert_eq!(blank.kind(), ErrorKind::NotNullViolation);
        assert_eq!(blank.to_string(), "NOT NULL constraint failed: users.email");
    }
}
