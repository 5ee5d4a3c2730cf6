//! Repository classes and their immutable instances.
//!
//! # Responsibility
//! - Build repository classes from a config and a dependency container.
//! - Expose CRUD and list entry points that return `Outcome`s.
//! - Memoize sibling instances per `with` selection.
//!
//! # Invariants
//! - An instance's `with`, projector, scope and default order are fixed at
//!   construction; refinement produces another instance.
//! - `with` is validated when the instance is built, not on first use.
//! - Writes run in their own savepoint.

use super::config::WithSpec;
use super::projector::RecordToHash;
use super::{
    Config, ConfigError, ErrorKind, ExceptionHandler, Failure, Outcome, RepoError, RepoResult,
    ScopeModifier,
};
use crate::db::Savepoint;
use crate::dependencies::{
    typed, DependencyCache, DependencyContainer, DependencyDefault, DependencyOverrides,
    DependencyOwner, DependencyValue,
};
use crate::list::{IntoOrder, List, OrderSpec};
use crate::logging::sanitize_message;
use crate::lookup::{ClassEntry, ClassKind, ClassRef, ClassRegistry, LookupError};
use crate::model::input::BASE;
use crate::model::{Attributes, Errors, Input, Model, ModelError};
use crate::record::{Record, RecordClass, RecordId, Scope};
use log::{debug, info, warn};
use rusqlite::Connection;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

/// Dependency key of the record class a repository reads and writes.
pub const RECORD_CLASS: &str = "record_class";

/// Name and registry a repository resolves its dependencies against.
///
/// The registry owns the class through its `RepositoryHandle`, so the class
/// only keeps a weak reference back.
pub struct RepositoryMeta {
    name: String,
    registry: Weak<ClassRegistry>,
}

impl RepositoryMeta {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> Result<Arc<ClassRegistry>, LookupError> {
        self.registry
            .upgrade()
            .ok_or_else(|| LookupError::RegistryDropped {
                owner: self.name.clone(),
            })
    }
}

impl DependencyOwner for RepositoryMeta {
    fn lookup_name(&self) -> &str {
        &self.name
    }

    fn registry(&self) -> Result<Arc<ClassRegistry>, LookupError> {
        RepositoryMeta::registry(self)
    }
}

/// How `find` locates one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Finder {
    Key(RecordId),
    By(Attributes),
}

impl From<RecordId> for Finder {
    fn from(value: RecordId) -> Self {
        Self::Key(value)
    }
}

impl From<Attributes> for Finder {
    fn from(value: Attributes) -> Self {
        Self::By(value)
    }
}

struct ClassInner {
    meta: RepositoryMeta,
    config: Config,
    dependencies: DependencyContainer<RepositoryMeta>,
    siblings: Mutex<HashMap<String, Arc<RepoState>>>,
}

/// Shared repository class; cheap to clone.
pub struct RepositoryClass<M> {
    inner: Arc<ClassInner>,
    model: PhantomData<fn() -> M>,
}

impl<M> Clone for RepositoryClass<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            model: PhantomData,
        }
    }
}

impl<M> Display for RepositoryClass<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.inner.meta.name)
    }
}

pub struct RepositoryBuilder<M> {
    name: String,
    /// `None` when a subclass outlived its parent's registry.
    registry: Option<Arc<ClassRegistry>>,
    config: Config,
    dependencies: DependencyContainer<RepositoryMeta>,
    model: PhantomData<fn() -> M>,
}

impl<M: Model + 'static> RepositoryBuilder<M> {
    /// Uses `registry` instead of the process-wide one. The caller keeps
    /// the registry alive; the class only holds a weak reference.
    pub fn registry(mut self, registry: Arc<ClassRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Pins the record class instead of resolving `<Base>Record`.
    pub fn record_class(mut self, record_class: RecordClass) -> Self {
        let entry = ClassEntry::new(record_class.name().to_string(), record_class)
            .kind(ClassKind::Record);
        self.dependencies.add(
            RECORD_CLASS,
            DependencyDefault::literal(ClassRef::Found(Arc::new(entry))),
        );
        self
    }

    pub fn dependency(mut self, key: impl Into<String>, default: DependencyDefault<RepositoryMeta>) -> Self {
        self.dependencies.add(key, default);
        self
    }

    pub fn class_dependency(
        mut self,
        key: impl Into<String>,
        default: DependencyDefault<RepositoryMeta>,
    ) -> Self {
        self.dependencies.add_class_only(key, default);
        self
    }

    pub fn configure(
        mut self,
        f: impl FnOnce(&mut Config) -> Result<(), ConfigError>,
    ) -> Result<Self, ConfigError> {
        f(&mut self.config)?;
        Ok(self)
    }

    pub fn optional(mut self, name: impl Into<String>, bundle: super::OptionalBundle) -> Self {
        self.config.optional(name, bundle);
        self
    }

    pub fn optional_model(mut self, name: &str, foreign_key: Option<&str>) -> Self {
        self.config.optional_model(name, foreign_key, None);
        self
    }

    pub fn optional_list(mut self, name: &str, foreign_key: Option<&str>) -> Self {
        self.config.optional_list(name, foreign_key, None);
        self
    }

    pub fn named_scope(mut self, name: impl Into<String>, modifier: ScopeModifier) -> Self {
        self.config.named_scope(name, modifier);
        self
    }

    pub fn default_order(mut self, order: impl IntoOrder) -> Result<Self, ConfigError> {
        self.config.default_order(order)?;
        Ok(self)
    }

    pub fn exception(mut self, kind: ErrorKind, handler: ExceptionHandler) -> Self {
        self.config.exception(kind, handler);
        self
    }

    /// Finishes the class and registers it under its name.
    pub fn build(self) -> RepositoryClass<M> {
        let class = RepositoryClass {
            inner: Arc::new(ClassInner {
                meta: RepositoryMeta {
                    name: self.name,
                    registry: self.registry.as_ref().map(Arc::downgrade).unwrap_or_default(),
                },
                config: self.config,
                dependencies: self.dependencies,
                siblings: Mutex::new(HashMap::new()),
            }),
            model: PhantomData,
        };

        let meta = &class.inner.meta;
        match &self.registry {
            Some(registry) => {
                registry.register(
                    ClassEntry::new(meta.name.clone(), RepositoryHandle::new(class.clone()))
                        .kind(ClassKind::Repository),
                );
            }
            None => warn!(
                "event=repo_build module=repo status=unregistered repo={} reason=registry_dropped",
                meta.name
            ),
        }
        info!(
            "event=repo_build module=repo status=ok repo={} model={} optionals={}",
            meta.name,
            M::NAME,
            class.inner.config.optional_keys().join(",")
        );
        class
    }
}

impl<M: Model + 'static> RepositoryClass<M> {
    /// Starts a class whose record class resolves by convention.
    pub fn builder(name: impl Into<String>) -> RepositoryBuilder<M> {
        let mut dependencies = DependencyContainer::new();
        dependencies.add(RECORD_CLASS, DependencyDefault::Associated(ClassKind::Record));
        RepositoryBuilder {
            name: name.into(),
            registry: Some(ClassRegistry::global()),
            config: Config::new(),
            dependencies,
            model: PhantomData,
        }
    }

    /// Child class starting from copies of this class's config and
    /// dependencies; the parent is never touched.
    pub fn subclass<N: Model + 'static>(&self, name: impl Into<String>) -> RepositoryBuilder<N> {
        RepositoryBuilder {
            name: name.into(),
            registry: self.inner.meta.registry.upgrade(),
            config: self.inner.config.derive(),
            dependencies: self.inner.dependencies.derive(),
            model: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.meta.name
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> Result<Arc<ClassRegistry>, LookupError> {
        self.inner.meta.registry()
    }

    pub fn dependency_keys(&self) -> Vec<&str> {
        self.inner.dependencies.keys()
    }

    pub fn repository(&self) -> RepoResult<Repository<M>> {
        self.with(WithSpec::new())
    }

    /// Memoized instance with `with` active; the same key set always
    /// yields the same instance.
    pub fn with(&self, with: impl Into<WithSpec>) -> RepoResult<Repository<M>> {
        let with = with.into();
        let key = with.cache_key();
        if let Some(state) = self.siblings().get(&key) {
            return Ok(self.instance_of(Arc::clone(state)));
        }

        let state = Arc::new(self.build_state(with, DependencyOverrides::new())?);
        let state = Arc::clone(self.siblings().entry(key).or_insert(state));
        Ok(self.instance_of(state))
    }

    /// Fresh, non-memoized instance with per-instance dependency overrides.
    pub fn instance(
        &self,
        with: impl Into<WithSpec>,
        overrides: DependencyOverrides,
    ) -> RepoResult<Repository<M>> {
        let state = self.build_state(with.into(), overrides)?;
        Ok(self.instance_of(Arc::new(state)))
    }

    fn siblings(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<RepoState>>> {
        self.inner
            .siblings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn instance_of(&self, state: Arc<RepoState>) -> Repository<M> {
        Repository {
            class: self.clone(),
            state,
        }
    }

    fn build_state(&self, with: WithSpec, overrides: DependencyOverrides) -> RepoResult<RepoState> {
        let config = &self.inner.config;
        config.assert_optional(&with)?;
        self.inner.dependencies.check_overrides(&overrides)?;

        let dependencies = DependencyCache::new();
        let record_class = record_class_of(resolve_dependency(
            &self.inner,
            &overrides,
            &dependencies,
            RECORD_CLASS,
        )?)?;
        let scope = match record_class {
            Ok(record_class) => Ok(config.scope(record_class.all(), &with)?),
            Err(missing) => Err(missing),
        };

        debug!(
            "event=repo_build module=repo status=instance repo={} with={} record_class={}",
            self.name(),
            with,
            if scope.is_ok() { "found" } else { "missing" }
        );
        Ok(RepoState {
            projector: Arc::new(config.record_to_hash(M::NAME, &with)),
            default_order: config.default_order_spec().cloned(),
            with,
            scope,
            overrides,
            dependencies,
        })
    }
}

fn resolve_dependency(
    inner: &ClassInner,
    overrides: &DependencyOverrides,
    cache: &DependencyCache,
    key: &str,
) -> RepoResult<DependencyValue> {
    match overrides.get(key) {
        Some(value) => Ok(Arc::clone(value)),
        None => Ok(cache.get(&inner.dependencies, &inner.meta, key)?),
    }
}

/// The record class behind a dependency value; a missing class is a
/// value, other mismatches are errors.
fn record_class_of(value: DependencyValue) -> RepoResult<Result<Arc<RecordClass>, LookupError>> {
    let value = match value.downcast::<RecordClass>() {
        Ok(record_class) => return Ok(Ok(record_class)),
        Err(value) => value,
    };
    let class_ref = typed::<ClassRef>(RECORD_CLASS, value)?;
    match class_ref.get::<RecordClass>() {
        Ok(record_class) => Ok(Ok(record_class)),
        Err(missing @ LookupError::NotFound(_)) => Ok(Err(missing)),
        Err(other) => Err(other.into()),
    }
}

struct RepoState {
    with: WithSpec,
    projector: Arc<RecordToHash>,
    scope: Result<Scope, LookupError>,
    default_order: Option<OrderSpec>,
    overrides: DependencyOverrides,
    dependencies: DependencyCache,
}

/// Immutable repository instance.
pub struct Repository<M> {
    class: RepositoryClass<M>,
    state: Arc<RepoState>,
}

impl<M> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self {
            class: self.class.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<M> Display for Repository<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.class.inner.meta.name)?;
        if !self.state.with.is_empty() {
            write!(f, ".with({})", self.state.with)?;
        }
        Ok(())
    }
}

impl<M> std::fmt::Debug for Repository<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl<M: Model + 'static> Repository<M> {
    pub fn class(&self) -> &RepositoryClass<M> {
        &self.class
    }

    pub fn with_spec(&self) -> &WithSpec {
        &self.state.with
    }

    /// Same memoized instance.
    pub fn same_instance(&self, other: &Repository<M>) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Sibling with `with` added to the keys already active.
    pub fn with(&self, with: impl Into<WithSpec>) -> RepoResult<Repository<M>> {
        self.class.with(self.state.with.merge(&with.into()))
    }

    pub fn scope(&self) -> RepoResult<&Scope> {
        self.state.scope.as_ref().map_err(|missing| missing.clone().into())
    }

    pub fn record_class(&self) -> RepoResult<Arc<RecordClass>> {
        let value = resolve_dependency(
            &self.class.inner,
            &self.state.overrides,
            &self.state.dependencies,
            RECORD_CLASS,
        )?;
        Ok(record_class_of(value)??)
    }

    pub fn dependency<T: Any + Send + Sync>(&self, key: &str) -> RepoResult<Arc<T>> {
        let value = resolve_dependency(
            &self.class.inner,
            &self.state.overrides,
            &self.state.dependencies,
            key,
        )?;
        Ok(typed::<T>(key, value)?)
    }

    pub fn model(&self, conn: &Connection, record: &Record) -> RepoResult<M> {
        let attributes = self
            .state
            .projector
            .call(conn, &*self.class.inner.meta.registry()?, record)?;
        Ok(M::from_attributes(attributes)?)
    }

    /// Scope-backed list over every record the instance can see.
    pub fn all<'c>(&self, conn: &'c Connection) -> List<'c, M> {
        List::from_scope(
            conn,
            self.state.scope.clone(),
            Arc::clone(&self.state.projector),
            Weak::clone(&self.class.inner.meta.registry),
        )
        .with_default_order(self.state.default_order.clone())
    }

    /// Array-backed list over already loaded records.
    pub fn list<'c>(&self, conn: &'c Connection, records: Vec<Record>) -> List<'c, M> {
        List::from_records(
            conn,
            records,
            Arc::clone(&self.state.projector),
            Weak::clone(&self.class.inner.meta.registry),
        )
        .with_default_order(self.state.default_order.clone())
    }

    /// Runs `f` against a throwaway sibling whose scope is narrowed.
    pub fn scoped<T>(
        &self,
        narrow: impl FnOnce(Scope) -> RepoResult<Scope>,
        f: impl FnOnce(&Repository<M>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let narrowed = narrow(self.scope()?.clone())?;
        let sibling = Repository {
            class: self.class.clone(),
            state: Arc::new(RepoState {
                with: self.state.with.clone(),
                projector: Arc::clone(&self.state.projector),
                scope: Ok(narrowed),
                default_order: self.state.default_order.clone(),
                overrides: self.state.overrides.clone(),
                dependencies: DependencyCache::new(),
            }),
        };
        f(&sibling)
    }

    /// Runs `f` inside a new savepoint. A failure outcome rolls back and is
    /// returned; `RepoError::Rollback` rolls back quietly as a failure; any
    /// other error rolls back and propagates.
    pub fn transaction<T>(
        &self,
        conn: &Connection,
        f: impl FnOnce(&Repository<M>) -> RepoResult<Outcome<T>>,
    ) -> RepoResult<Outcome<T>> {
        let savepoint = Savepoint::begin(conn)?;
        match f(self) {
            Ok(Outcome::Success(value)) => {
                savepoint.commit()?;
                Ok(Outcome::Success(value))
            }
            Ok(Outcome::Failure(failure)) => {
                savepoint.rollback()?;
                Ok(Outcome::Failure(failure))
            }
            Err(RepoError::Rollback) => {
                savepoint.rollback()?;
                Ok(Outcome::Failure(Failure::new(
                    RepoError::Rollback,
                    Errors::on(BASE, "rolled back"),
                )))
            }
            Err(err) => {
                savepoint.rollback()?;
                Err(err)
            }
        }
    }

    /// Signal that rolls back the innermost `transaction`.
    pub fn rollback<T>(&self) -> RepoResult<T> {
        Err(RepoError::Rollback)
    }

    /// Maps errors claimed by the exception table to failures.
    pub fn wrap<T>(&self, f: impl FnOnce() -> RepoResult<T>) -> RepoResult<Outcome<T>> {
        match f() {
            Ok(value) => Ok(Outcome::Success(value)),
            Err(error) => match self.class.inner.config.exceptions().handle(&error) {
                Some(errors) => {
                    warn!(
                        "event=repo_failure module=repo status=failure repo={} kind={} message={}",
                        self,
                        error.kind(),
                        sanitize_message(&error.to_string())
                    );
                    Ok(Outcome::Failure(Failure::new(error, errors)))
                }
                None => Err(error),
            },
        }
    }

    /// `wrap`, optionally in a transaction; failure details are copied onto
    /// `input` when it holds errors.
    pub fn to_result<T>(
        &self,
        conn: &Connection,
        input: Option<&mut dyn Input>,
        transactional: bool,
        f: impl FnOnce() -> RepoResult<T>,
    ) -> RepoResult<Outcome<T>> {
        let outcome = if transactional {
            self.transaction(conn, |repo| repo.wrap(f))?
        } else {
            self.wrap(f)?
        };
        if let (Outcome::Failure(failure), Some(input)) = (&outcome, input) {
            input.attach_errors(&failure.errors);
        }
        Ok(outcome)
    }

    /// `to_result` for a block producing a record, mapped to a model.
    pub fn model_result(
        &self,
        conn: &Connection,
        f: impl FnOnce(&Repository<M>) -> RepoResult<Record>,
    ) -> RepoResult<Outcome<M>> {
        self.to_result(conn, None, false, || {
            let record = f(self)?;
            self.model(conn, &record)
        })
    }

    pub fn find(&self, conn: &Connection, finder: impl Into<Finder>) -> RepoResult<Outcome<M>> {
        let started = Instant::now();
        let finder = finder.into();
        let outcome = self.to_result(conn, None, false, || {
            let scope = self.scope()?;
            let record = match &finder {
                Finder::Key(id) => scope.find(conn, *id)?,
                Finder::By(attributes) if attributes.is_empty() => {
                    return Err(ConfigError::EmptyFinder.into())
                }
                Finder::By(attributes) => scope.find_by(conn, attributes)?,
            };
            self.model(conn, &record)
        });
        self.log_op("find", started, &outcome);
        outcome
    }

    pub fn create(&self, conn: &Connection, input: &mut dyn Input) -> RepoResult<Outcome<M>> {
        let started = Instant::now();
        let attributes = input.attributes().map_err(RepoError::Invalid);
        let outcome = self.to_result(conn, Some(input), true, || {
            let record = self.scope()?.create(conn, &attributes?)?;
            self.model(conn, &record)
        });
        self.log_op("create", started, &outcome);
        outcome
    }

    pub fn update(
        &self,
        conn: &Connection,
        id: RecordId,
        input: &mut dyn Input,
    ) -> RepoResult<Outcome<M>> {
        let started = Instant::now();
        let attributes = input.attributes().map_err(RepoError::Invalid);
        let outcome = self.to_result(conn, Some(input), true, || {
            let record = self.scope()?.update(conn, id, &attributes?)?;
            self.model(conn, &record)
        });
        self.log_op("update", started, &outcome);
        outcome
    }

    /// Updates the record matching `by`, or creates one from `by` plus the
    /// input's attributes.
    pub fn upsert(
        &self,
        conn: &Connection,
        by: &Attributes,
        mut input: Option<&mut dyn Input>,
    ) -> RepoResult<Outcome<M>> {
        let started = Instant::now();
        let attributes = match input.as_deref_mut() {
            Some(input) => input.attributes().map_err(RepoError::Invalid),
            None => Ok(Attributes::new()),
        };
        let outcome = self.to_result(conn, input, true, || {
            let attributes = attributes?;
            let scope = self.scope()?;
            let record = match scope.find_optional_by(conn, by)? {
                Some(existing) => {
                    let id = existing.id().ok_or_else(|| ModelError::MissingAttribute {
                        model: scope.table().to_string(),
                        attribute: scope.primary_key().to_string(),
                    })?;
                    scope.update(conn, id, &attributes)?
                }
                None => scope.clone().where_attributes(by).create(conn, &attributes)?,
            };
            self.model(conn, &record)
        });
        self.log_op("upsert", started, &outcome);
        outcome
    }

    /// Deletes the record, returning the model it was.
    pub fn destroy(&self, conn: &Connection, id: RecordId) -> RepoResult<Outcome<M>> {
        let started = Instant::now();
        let outcome = self.to_result(conn, None, true, || {
            let record = self.scope()?.destroy(conn, id)?;
            self.model(conn, &record)
        });
        self.log_op("destroy", started, &outcome);
        outcome
    }

    fn log_op<T>(&self, op: &str, started: Instant, outcome: &RepoResult<Outcome<T>>) {
        let status = match outcome {
            Ok(Outcome::Success(_)) => "ok",
            Ok(Outcome::Failure(_)) => "failure",
            Err(_) => "error",
        };
        let duration_ms = started.elapsed().as_millis();
        match outcome {
            Err(err) => warn!(
                "event=repo_op module=repo status={status} op={op} repo={} duration_ms={duration_ms} error={}",
                self,
                sanitize_message(&err.to_string())
            ),
            _ => debug!(
                "event=repo_op module=repo status={status} op={op} repo={} duration_ms={duration_ms}",
                self
            ),
        }
    }
}

/// Type-erased repository access used by nested optional loaders.
pub trait AnyRepository: Send + Sync {
    fn name(&self) -> &str;

    /// Model hash of the record with `id`, if any.
    fn find_hash(&self, conn: &Connection, with: &WithSpec, id: RecordId)
        -> RepoResult<Option<Value>>;

    /// Model hashes of every record whose `column` equals `value`.
    fn where_hashes(
        &self,
        conn: &Connection,
        with: &WithSpec,
        column: &str,
        value: &Value,
    ) -> RepoResult<Vec<Value>>;
}

impl<M: Model + 'static> AnyRepository for RepositoryClass<M> {
    fn name(&self) -> &str {
        RepositoryClass::name(self)
    }

    fn find_hash(
        &self,
        conn: &Connection,
        with: &WithSpec,
        id: RecordId,
    ) -> RepoResult<Option<Value>> {
        let repository = self.with(with)?;
        let scope = repository.scope()?;
        let key: Attributes = [(scope.primary_key().to_string(), Value::from(id))]
            .into_iter()
            .collect();
        match scope.find_optional_by(conn, &key)? {
            Some(record) => Ok(Some(Value::Object(repository.model(conn, &record)?.to_hash()))),
            None => Ok(None),
        }
    }

    fn where_hashes(
        &self,
        conn: &Connection,
        with: &WithSpec,
        column: &str,
        value: &Value,
    ) -> RepoResult<Vec<Value>> {
        let repository = self.with(with)?;
        repository.scoped(
            |scope| Ok(scope.where_eq(column, value.clone())),
            |narrowed| {
                Ok(narrowed
                    .all(conn)
                    .to_vec()?
                    .into_iter()
                    .map(|model| Value::Object(model.to_hash()))
                    .collect())
            },
        )
    }
}

/// Registry value for a repository class.
#[derive(Clone)]
pub struct RepositoryHandle(Arc<dyn AnyRepository>);

impl RepositoryHandle {
    pub fn new(repository: impl AnyRepository + 'static) -> Self {
        Self(Arc::new(repository))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn find_hash(
        &self,
        conn: &Connection,
        with: &WithSpec,
        id: RecordId,
    ) -> RepoResult<Option<Value>> {
        self.0.find_hash(conn, with, id)
    }

    pub fn where_hashes(
        &self,
        conn: &Connection,
        with: &WithSpec,
        column: &str,
        value: &Value,
    ) -> RepoResult<Vec<Value>> {
        self.0.where_hashes(conn, with, column, value)
    }
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RepositoryHandle").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Finder, RepositoryClass};
    use crate::dependencies::DependencyError;
    use crate::lookup::{ClassRegistry, LookupError};
    use crate::model::{AttributeSet, Model, ModelError};
    use crate::repo::{ConfigError, RepoError};
    use rusqlite::Connection;
    use serde::Serialize;
    use std::sync::Arc;

    #[derive(Debug, Serialize)]
    struct Ghost {
        id: i64,
    }

    impl Model for Ghost {
        const NAME: &'static str = "Ghost";

        fn from_attributes(mut attributes: AttributeSet) -> Result<Self, ModelError> {
            Ok(Self {
                id: attributes.take("id")?,
            })
        }
    }

    #[test]
    fn missing_record_class_fails_only_when_used() {
        let registry = Arc::new(ClassRegistry::new());
        let ghosts = RepositoryClass::<Ghost>::builder("GhostRepository")
            .registry(Arc::clone(&registry))
            .build();
        let repo = ghosts.repository().unwrap();
        assert_eq!(repo.to_string(), "GhostRepository");

        let conn = Connection::open_in_memory().unwrap();
        let err = repo.find(&conn, 1_i64).unwrap_err();
        assert!(matches!(
            err,
            RepoError::Lookup(LookupError::NotFound(ref missing)) if missing.class_name() == "GhostRecord"
        ));
        assert!(repo.all(&conn).to_vec().is_err());
    }

    #[test]
    fn dropping_a_private_registry_frees_it() {
        let registry = Arc::new(ClassRegistry::new());
        let pinned = RepositoryClass::<Ghost>::builder("PinnedGhostRepository")
            .registry(Arc::clone(&registry))
            .record_class(crate::record::RecordClass::new("GhostRecord"))
            .build();
        let conventional = RepositoryClass::<Ghost>::builder("GhostRepository")
            .registry(Arc::clone(&registry))
            .build();
        assert!(registry.get("GhostRepository").is_some());

        let weak = Arc::downgrade(&registry);
        drop(registry);
        assert!(weak.upgrade().is_none());

        assert!(matches!(
            pinned.registry(),
            Err(LookupError::RegistryDropped { ref owner }) if owner == "PinnedGhostRepository"
        ));
        let err = conventional.repository().unwrap_err();
        assert!(matches!(
            err,
            RepoError::Dependency(DependencyError::Lookup(LookupError::RegistryDropped { .. }))
        ));
        assert_eq!(
            err.to_string(),
            "class registry used by `GhostRepository` was dropped"
        );
    }

    #[test]
    fn empty_filter_is_a_configuration_error() {
        let registry = Arc::new(ClassRegistry::new());
        let ghosts = RepositoryClass::<Ghost>::builder("GhostRepository")
            .registry(Arc::clone(&registry))
            .record_class(crate::record::RecordClass::new("GhostRecord"))
            .build();
        let conn = Connection::open_in_memory().unwrap();
        let err = ghosts
            .repository()
            .unwrap()
            .find(&conn, Finder::By(Default::default()))
            .unwrap_err();
        assert!(matches!(err, RepoError::Config(ConfigError::EmptyFinder)));
    }
}
