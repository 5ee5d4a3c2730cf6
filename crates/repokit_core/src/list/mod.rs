//! Deferred, refinable views over records that materialize to models.
//!
//! # Responsibility
//! - Offer one refinement surface (`order`, `reorder`, `reverse_order`,
//!   `limit`, `offset`, `default_order`) over two sources: a query scope
//!   executed lazily in SQLite, or an in-memory array of records.
//!
//! # Invariants
//! - A list is immutable; refinements return new lists.
//! - The default order applies only while no explicit order exists in the
//!   list's lineage; once dropped it never comes back.
//! - Both sources agree on ordering, null placement included.

use crate::lookup::{ClassRegistry, LookupError};
use crate::model::input::BASE;
use crate::model::{Errors, Model};
use crate::record::{Record, Scope};
use crate::repo::{ConfigError, Failure, Outcome, RecordToHash, RepoError, RepoResult};
use rusqlite::Connection;
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

mod order;

pub use order::{Direction, IntoOrder, OrderSpec};

#[derive(Clone)]
enum ListSource {
    Scope(Scope),
    Array(Arc<Vec<Record>>),
    /// The repository's record class is missing; every read fails with it.
    Unavailable(LookupError),
}

#[derive(Debug, Clone, PartialEq)]
enum OrderState {
    Unset,
    Append(OrderSpec),
    Replace(OrderSpec),
}

pub struct List<'c, M> {
    conn: &'c Connection,
    source: ListSource,
    projector: Arc<RecordToHash>,
    registry: Weak<ClassRegistry>,
    order: OrderState,
    default_order: Option<OrderSpec>,
    limit: Option<usize>,
    offset: Option<usize>,
    model: PhantomData<fn() -> M>,
}

impl<M> Clone for List<'_, M> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn,
            source: self.source.clone(),
            projector: Arc::clone(&self.projector),
            registry: Weak::clone(&self.registry),
            order: self.order.clone(),
            default_order: self.default_order.clone(),
            limit: self.limit,
            offset: self.offset,
            model: PhantomData,
        }
    }
}

impl<M: Model> Debug for List<'_, M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            ListSource::Scope(scope) => format!("scope({})", scope.table()),
            ListSource::Array(records) => format!("array({})", records.len()),
            ListSource::Unavailable(err) => format!("unavailable({err})"),
        };
        f.debug_struct("List")
            .field("model", &self.projector.model())
            .field("source", &source)
            .field("order", &self.effective_order().to_string())
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<'c, M: Model> List<'c, M> {
    pub(crate) fn from_scope(
        conn: &'c Connection,
        scope: Result<Scope, LookupError>,
        projector: Arc<RecordToHash>,
        registry: Weak<ClassRegistry>,
    ) -> Self {
        let source = match scope {
            Ok(scope) => ListSource::Scope(scope),
            Err(err) => ListSource::Unavailable(err),
        };
        Self::with_source(conn, source, projector, registry)
    }

    pub(crate) fn from_records(
        conn: &'c Connection,
        records: Vec<Record>,
        projector: Arc<RecordToHash>,
        registry: Weak<ClassRegistry>,
    ) -> Self {
        Self::with_source(conn, ListSource::Array(Arc::new(records)), projector, registry)
    }

    fn with_source(
        conn: &'c Connection,
        source: ListSource,
        projector: Arc<RecordToHash>,
        registry: Weak<ClassRegistry>,
    ) -> Self {
        Self {
            conn,
            source,
            projector,
            registry,
            order: OrderState::Unset,
            default_order: None,
            limit: None,
            offset: None,
            model: PhantomData,
        }
    }

    pub(crate) fn with_default_order(mut self, order: Option<OrderSpec>) -> Self {
        self.default_order = order;
        self
    }

    pub fn is_array_backed(&self) -> bool {
        matches!(self.source, ListSource::Array(_))
    }

    /// Adds order columns; an existing column keeps its place and takes the
    /// new direction.
    pub fn order(&self, order: impl IntoOrder) -> Result<Self, ConfigError> {
        let order = order.into_order()?;
        let mut list = self.clone();
        list.order = match &self.order {
            OrderState::Unset => OrderState::Append(order),
            OrderState::Append(current) => OrderState::Append(current.clone().merge(&order)),
            OrderState::Replace(current) => OrderState::Replace(current.clone().merge(&order)),
        };
        list.default_order = None;
        Ok(list)
    }

    /// Replaces every order, including one the source scope carries.
    pub fn reorder(&self, order: impl IntoOrder) -> Result<Self, ConfigError> {
        let mut list = self.clone();
        list.order = OrderState::Replace(order.into_order()?);
        list.default_order = None;
        Ok(list)
    }

    /// Flips every direction of the effective order; no-op without one.
    pub fn reverse_order(&self) -> Self {
        let effective = self.effective_order();
        if effective.is_empty() {
            return self.clone();
        }
        let mut list = self.clone();
        list.order = OrderState::Replace(effective.reversed());
        list.default_order = None;
        list
    }

    /// Fallback order, used only while no explicit order exists.
    pub fn default_order(&self, order: impl IntoOrder) -> Result<Self, ConfigError> {
        let order = order.into_order()?;
        let mut list = self.clone();
        if list.order == OrderState::Unset {
            list.default_order = Some(order);
        }
        Ok(list)
    }

    pub fn limit(&self, limit: Option<usize>) -> Self {
        let mut list = self.clone();
        list.limit = limit;
        list
    }

    pub fn offset(&self, offset: Option<usize>) -> Self {
        let mut list = self.clone();
        list.offset = offset;
        list
    }

    /// `len` items starting at `start`, relative to the current window.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let mut list = self.clone();
        list.offset = Some(self.offset.unwrap_or(0).saturating_add(start));
        list.limit = Some(match self.limit {
            Some(limit) => len.min(limit.saturating_sub(start)),
            None => len,
        });
        list
    }

    /// Order the list currently sorts by.
    pub fn effective_order(&self) -> OrderSpec {
        let inherited = match &self.source {
            ListSource::Scope(scope) => scope.order_spec().clone(),
            ListSource::Array(_) | ListSource::Unavailable(_) => OrderSpec::new(),
        };
        match &self.order {
            OrderState::Replace(order) => order.clone(),
            OrderState::Append(order) => inherited.merge(order),
            OrderState::Unset if inherited.is_empty() => {
                self.default_order.clone().unwrap_or_default()
            }
            OrderState::Unset => inherited,
        }
    }

    fn resolved_scope(&self, scope: &Scope) -> Scope {
        scope
            .clone()
            .with_order(self.effective_order())
            .limit(self.limit.or(scope.limit_value()))
            .offset(self.offset.or(scope.offset_value()))
    }

    /// Records in list order, window applied.
    pub fn records(&self) -> RepoResult<Vec<Record>> {
        match &self.source {
            ListSource::Scope(scope) => self.resolved_scope(scope).load(self.conn),
            ListSource::Array(records) => {
                let mut sorted: Vec<Record> = records.as_ref().clone();
                self.effective_order()
                    .sort(&mut sorted, |record, column| record.get(column));
                Ok(sorted
                    .into_iter()
                    .skip(self.offset.unwrap_or(0))
                    .take(self.limit.unwrap_or(usize::MAX))
                    .collect())
            }
            ListSource::Unavailable(err) => Err(err.clone().into()),
        }
    }

    fn model(&self, record: &Record) -> RepoResult<M> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| LookupError::RegistryDropped {
                owner: M::NAME.to_string(),
            })?;
        let attributes = self.projector.call(self.conn, &registry, record)?;
        Ok(M::from_attributes(attributes)?)
    }

    pub fn to_vec(&self) -> RepoResult<Vec<M>> {
        self.records()?
            .iter()
            .map(|record| self.model(record))
            .collect()
    }

    pub fn try_for_each(&self, mut f: impl FnMut(M) -> RepoResult<()>) -> RepoResult<()> {
        for record in self.records()? {
            f(self.model(&record)?)?;
        }
        Ok(())
    }

    pub fn count(&self) -> RepoResult<usize> {
        match &self.source {
            ListSource::Scope(scope) => self.resolved_scope(scope).count(self.conn),
            _ => Ok(self.records()?.len()),
        }
    }

    pub fn len(&self) -> RepoResult<usize> {
        self.count()
    }

    pub fn is_empty(&self) -> RepoResult<bool> {
        Ok(self.slice(0, 1).count()? == 0)
    }

    pub fn exists(&self) -> RepoResult<bool> {
        Ok(!self.is_empty()?)
    }

    /// Raw record values for `columns`, one row per record.
    pub fn pluck(&self, columns: &[&str]) -> RepoResult<Vec<Vec<Value>>> {
        Ok(self
            .records()?
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect())
    }

    pub fn pluck_column(&self, column: &str) -> RepoResult<Vec<Value>> {
        Ok(self
            .records()?
            .iter()
            .map(|record| record.get(column).cloned().unwrap_or(Value::Null))
            .collect())
    }

    pub fn first(&self) -> RepoResult<Option<M>> {
        Ok(self.first_n(1)?.into_iter().next())
    }

    pub fn first_n(&self, count: usize) -> RepoResult<Vec<M>> {
        self.slice(0, count).to_vec()
    }

    pub fn last(&self) -> RepoResult<Option<M>> {
        Ok(self.last_n(1)?.into_iter().last())
    }

    /// Last `count` models, in list order.
    pub fn last_n(&self, count: usize) -> RepoResult<Vec<M>> {
        let records = match &self.source {
            ListSource::Scope(_) if self.limit.is_none() && self.offset.is_none() => {
                let order = self.effective_order();
                let order = if order.is_empty() {
                    self.primary_key_order()?
                } else {
                    order
                };
                let mut tail = self
                    .reorder(order.reversed())?
                    .limit(Some(count))
                    .records()?;
                tail.reverse();
                tail
            }
            _ => {
                let records = self.records()?;
                let skip = records.len().saturating_sub(count);
                records.into_iter().skip(skip).collect()
            }
        };
        records.iter().map(|record| self.model(record)).collect()
    }

    fn primary_key_order(&self) -> Result<OrderSpec, ConfigError> {
        match &self.source {
            ListSource::Scope(scope) => {
                OrderSpec::new().asc(&format!("{}.{}", scope.table(), scope.primary_key()))
            }
            _ => Ok(OrderSpec::new()),
        }
    }

    /// Model at `index`; negative indexes count from the end.
    pub fn get(&self, index: isize) -> RepoResult<Option<M>> {
        if index >= 0 {
            return Ok(self.slice(index.unsigned_abs(), 1).first_n(1)?.into_iter().next());
        }
        let from_end = index.unsigned_abs();
        let tail = self.last_n(from_end)?;
        Ok(if tail.len() == from_end {
            tail.into_iter().next()
        } else {
            None
        })
    }

    pub fn first_or_fail(&self) -> RepoResult<Outcome<M>> {
        Ok(match self.first()? {
            Some(model) => Outcome::Success(model),
            None => Outcome::Failure(self.not_found("first")),
        })
    }

    pub fn last_or_fail(&self) -> RepoResult<Outcome<M>> {
        Ok(match self.last()? {
            Some(model) => Outcome::Success(model),
            None => Outcome::Failure(self.not_found("last")),
        })
    }

    fn not_found(&self, position: &str) -> Failure {
        let table = match &self.source {
            ListSource::Scope(scope) => scope.table().to_string(),
            _ => self.projector.model().to_string(),
        };
        Failure::new(
            RepoError::NotFound {
                table,
                key: position.to_string(),
            },
            Errors::on(BASE, "not found"),
        )
    }
}
