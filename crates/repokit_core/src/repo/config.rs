//! Per-repository configuration: attribute projection, optional bundles,
//! scopes, default order and exception mapping.
//!
//! # Responsibility
//! - Decide which record attributes reach the model.
//! - Hold named optional bundles (extra attributes plus scope changes)
//!   that are only applied when requested through `with`.
//!
//! # Invariants
//! - `only` and `except` are never both set.
//! - Every optional attribute name is also an always-attribute, so an
//!   unrequested bundle shows up as an unloaded placeholder.
//! - Bundles apply in registration order, whatever order `with` names them.

use super::projector::{LoadContext, RecordToHash};
use super::repository::RepositoryHandle;
use super::{ConfigError, ErrorKind, ExceptionHandler, ExceptionTable, RepoResult};
use crate::list::{IntoOrder, OrderSpec};
use crate::lookup::{inflect, ClassLookup};
use crate::record::{Record, Scope};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Requested optional keys, each with its own nested selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WithSpec {
    entries: BTreeMap<String, WithSpec>,
}

impl WithSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(self, key: impl Into<String>) -> Self {
        self.nested(key, WithSpec::new())
    }

    /// `key` with a nested selection for the repository it loads through.
    pub fn nested(mut self, key: impl Into<String>, nested: impl Into<WithSpec>) -> Self {
        let nested = nested.into();
        self.entries
            .entry(key.into())
            .and_modify(|existing| *existing = existing.merge(&nested))
            .or_insert(nested);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn nested_for(&self, key: &str) -> WithSpec {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&self, other: &WithSpec) -> WithSpec {
        other
            .entries
            .iter()
            .fold(self.clone(), |spec, (key, nested)| spec.nested(key.clone(), nested.clone()))
    }

    /// Order-insensitive identity, used to memoize sibling repositories.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl Display for WithSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(key, nested)| {
                if nested.is_empty() {
                    key.clone()
                } else {
                    format!("{key}({nested})")
                }
            })
            .collect();
        f.write_str(&parts.join(", "))
    }
}

impl From<&str> for WithSpec {
    fn from(value: &str) -> Self {
        Self::new().key(value)
    }
}

impl From<&[&str]> for WithSpec {
    fn from(value: &[&str]) -> Self {
        value.iter().fold(Self::new(), |spec, key| spec.key(*key))
    }
}

impl<const N: usize> From<[&str; N]> for WithSpec {
    fn from(value: [&str; N]) -> Self {
        Self::from(value.as_slice())
    }
}

impl From<Vec<String>> for WithSpec {
    fn from(value: Vec<String>) -> Self {
        value.into_iter().fold(Self::new(), WithSpec::key)
    }
}

impl From<&WithSpec> for WithSpec {
    fn from(value: &WithSpec) -> Self {
        value.clone()
    }
}

type RecordLoaderFn = Arc<dyn Fn(&Record) -> RepoResult<Value> + Send + Sync>;
type NestedLoaderFn = Arc<dyn Fn(&LoadContext<'_>, &Record) -> RepoResult<Value> + Send + Sync>;
pub(crate) type ScopeFn = Arc<dyn Fn(Scope) -> RepoResult<Scope> + Send + Sync>;
type NestedScopeFn = Arc<dyn Fn(Scope, &WithSpec) -> RepoResult<Scope> + Send + Sync>;

/// How one optional attribute is computed from a loaded record.
#[derive(Clone)]
pub enum AttributeLoader {
    /// Read a column of the record, typically one the bundle's scope selects.
    Column(String),
    Record(RecordLoaderFn),
    /// Also receives the connection and the nested `with` selection.
    Nested(NestedLoaderFn),
}

impl AttributeLoader {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn record<F>(f: F) -> Self
    where
        F: Fn(&Record) -> RepoResult<Value> + Send + Sync + 'static,
    {
        Self::Record(Arc::new(f))
    }

    pub fn nested<F>(f: F) -> Self
    where
        F: Fn(&LoadContext<'_>, &Record) -> RepoResult<Value> + Send + Sync + 'static,
    {
        Self::Nested(Arc::new(f))
    }

    pub(crate) fn load(&self, context: &LoadContext<'_>, record: &Record) -> RepoResult<Value> {
        match self {
            Self::Column(column) => Ok(record.get(column).cloned().unwrap_or(Value::Null)),
            Self::Record(f) => f(record),
            Self::Nested(f) => f(context, record),
        }
    }
}

impl std::fmt::Debug for AttributeLoader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column(column) => f.debug_tuple("Column").field(column).finish(),
            Self::Record(_) => f.write_str("Record(..)"),
            Self::Nested(_) => f.write_str("Nested(..)"),
        }
    }
}

/// Query change applied when a bundle is requested.
#[derive(Clone)]
pub enum ScopeModifier {
    Plain(ScopeFn),
    Nested(NestedScopeFn),
    /// Delegates to a named scope registered on the same config.
    Named(String),
}

impl ScopeModifier {
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(Scope) -> RepoResult<Scope> + Send + Sync + 'static,
    {
        Self::Plain(Arc::new(f))
    }

    pub fn nested<F>(f: F) -> Self
    where
        F: Fn(Scope, &WithSpec) -> RepoResult<Scope> + Send + Sync + 'static,
    {
        Self::Nested(Arc::new(f))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl std::fmt::Debug for ScopeModifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Plain(..)"),
            Self::Nested(_) => f.write_str("Nested(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

/// Named opt-in attributes plus an optional scope change.
#[derive(Debug, Clone, Default)]
pub struct OptionalBundle {
    attributes: Vec<(String, AttributeLoader)>,
    scope: Option<ScopeModifier>,
}

impl OptionalBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, name: impl Into<String>, loader: AttributeLoader) -> Self {
        let name = name.into();
        match self.attributes.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = loader,
            None => self.attributes.push((name, loader)),
        }
        self
    }

    pub fn scope(mut self, modifier: ScopeModifier) -> Self {
        self.scope = Some(modifier);
        self
    }

    pub fn attributes(&self) -> &[(String, AttributeLoader)] {
        &self.attributes
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    only: Option<Vec<String>>,
    except: Option<Vec<String>>,
    always: Vec<String>,
    optionals: Vec<(String, OptionalBundle)>,
    named_scopes: Vec<(String, ScopeModifier)>,
    default_order: Option<OrderSpec>,
    exceptions: ExceptionTable,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the allow or deny list; giving both in one call is an error.
    pub fn attributes(
        &mut self,
        only: Option<&[&str]>,
        except: Option<&[&str]>,
    ) -> Result<&mut Self, ConfigError> {
        match (only, except) {
            (Some(_), Some(_)) => Err(ConfigError::OnlyAndExcept),
            (Some(only), None) => self.only(only),
            (None, Some(except)) => self.except(except),
            (None, None) => Ok(self),
        }
    }

    pub fn only(&mut self, columns: &[&str]) -> Result<&mut Self, ConfigError> {
        if self.except.is_some() {
            return Err(ConfigError::OnlyAndExcept);
        }
        self.only = Some(columns.iter().map(|column| column.to_string()).collect());
        Ok(self)
    }

    pub fn except(&mut self, columns: &[&str]) -> Result<&mut Self, ConfigError> {
        if self.only.is_some() {
            return Err(ConfigError::OnlyAndExcept);
        }
        self.except = Some(columns.iter().map(|column| column.to_string()).collect());
        Ok(self)
    }

    /// Attribute always present in projections, unloaded when absent.
    pub fn always(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if !self.always.contains(&name) {
            self.always.push(name);
        }
        self
    }

    /// Registers (or replaces) bundle `name`. A bundle without attributes
    /// loads the column of the same name.
    pub fn optional(&mut self, name: impl Into<String>, bundle: OptionalBundle) -> &mut Self {
        let name = name.into();
        let bundle = if bundle.attributes.is_empty() {
            bundle.attribute(name.clone(), AttributeLoader::column(name.clone()))
        } else {
            bundle
        };
        for (attribute, _) in &bundle.attributes {
            self.always(attribute.clone());
        }
        match self.optionals.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = bundle,
            None => self.optionals.push((name, bundle)),
        }
        self
    }

    /// Bundle loading the model referenced by `foreign_key` (default
    /// `<name>_id`) through the repository `lookup` finds (default
    /// `<Name>Repository`, then `<Name>Repo`).
    pub fn optional_model(
        &mut self,
        name: &str,
        foreign_key: Option<&str>,
        lookup: Option<ClassLookup>,
    ) -> &mut Self {
        let foreign_key = foreign_key.map_or_else(|| format!("{name}_id"), str::to_string);
        let lookup = lookup.unwrap_or_else(|| ClassLookup::repository_for(name));
        let loader = AttributeLoader::nested(move |context, record| {
            let id = match record.get(&foreign_key).and_then(Value::as_i64) {
                Some(id) => id,
                None => return Ok(Value::Null),
            };
            let repository = lookup
                .call(context.registry, None)?
                .get::<RepositoryHandle>()?;
            Ok(repository
                .find_hash(context.conn, context.with, id)?
                .unwrap_or(Value::Null))
        });
        self.optional(name, OptionalBundle::new().attribute(name, loader))
    }

    /// Bundle loading every model whose `foreign_key` (default
    /// `<owner model>_id`) points at the record.
    pub fn optional_list(
        &mut self,
        name: &str,
        foreign_key: Option<&str>,
        lookup: Option<ClassLookup>,
    ) -> &mut Self {
        let foreign_key = foreign_key.map(str::to_string);
        let lookup = lookup.unwrap_or_else(|| ClassLookup::repository_for(name));
        let loader = AttributeLoader::nested(move |context, record| {
            let Some(id) = record.id() else {
                return Ok(Value::Array(Vec::new()));
            };
            let foreign_key = foreign_key
                .clone()
                .unwrap_or_else(|| format!("{}_id", inflect::underscore(context.model)));
            let repository = lookup
                .call(context.registry, None)?
                .get::<RepositoryHandle>()?;
            Ok(Value::Array(repository.where_hashes(
                context.conn,
                context.with,
                &foreign_key,
                &Value::from(id),
            )?))
        });
        self.optional(name, OptionalBundle::new().attribute(name, loader))
    }

    pub fn named_scope(&mut self, name: impl Into<String>, modifier: ScopeModifier) -> &mut Self {
        let name = name.into();
        match self.named_scopes.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = modifier,
            None => self.named_scopes.push((name, modifier)),
        }
        self
    }

    pub fn default_order(&mut self, order: impl IntoOrder) -> Result<&mut Self, ConfigError> {
        self.default_order = Some(order.into_order()?);
        Ok(self)
    }

    pub fn exception(&mut self, kind: ErrorKind, handler: ExceptionHandler) -> &mut Self {
        self.exceptions.register(kind, handler);
        self
    }

    pub fn default_order_spec(&self) -> Option<&OrderSpec> {
        self.default_order.as_ref()
    }

    pub fn exceptions(&self) -> &ExceptionTable {
        &self.exceptions
    }

    pub fn only_attributes(&self) -> Option<&[String]> {
        self.only.as_deref()
    }

    pub fn except_attributes(&self) -> Option<&[String]> {
        self.except.as_deref()
    }

    pub fn always_attributes(&self) -> &[String] {
        &self.always
    }

    pub fn optional_keys(&self) -> Vec<&str> {
        self.optionals.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Copy for a child repository.
    pub fn derive(&self) -> Self {
        self.clone()
    }

    /// Every requested key must name a registered bundle.
    pub fn assert_optional(&self, with: &WithSpec) -> Result<(), ConfigError> {
        let known = self.optional_keys();
        let unknown: Vec<String> = with
            .keys()
            .filter(|key| !known.contains(key))
            .map(str::to_string)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::UnknownOptional {
                unknown,
                known: known.into_iter().map(str::to_string).collect(),
            })
        }
    }

    /// Projector for records of `model`, with the bundles in `with` active.
    pub fn record_to_hash(&self, model: &str, with: &WithSpec) -> RecordToHash {
        let extra = self
            .optionals
            .iter()
            .filter(|(name, _)| with.contains(name))
            .flat_map(|(name, bundle)| {
                let nested = with.nested_for(name);
                bundle
                    .attributes
                    .iter()
                    .map(move |(attribute, loader)| (attribute.clone(), loader.clone(), nested.clone()))
            })
            .collect();
        let inactive = self
            .optionals
            .iter()
            .filter(|(name, _)| !with.contains(name))
            .flat_map(|(_, bundle)| bundle.attributes.iter().map(|(attribute, _)| attribute.clone()))
            .collect();
        RecordToHash {
            model: model.to_string(),
            only: self.only.clone(),
            except: self.except.clone(),
            inactive,
            extra,
            always: self.always.clone(),
        }
    }

    /// `base` with the active bundles' scope changes folded in.
    pub fn scope(&self, base: Scope, with: &WithSpec) -> RepoResult<Scope> {
        self.optionals
            .iter()
            .filter(|(name, _)| with.contains(name))
            .try_fold(base, |scope, (name, bundle)| match &bundle.scope {
                Some(modifier) => self.apply(modifier, scope, &with.nested_for(name)),
                None => Ok(scope),
            })
    }

    /// Applies the named scope `name` to `scope`.
    pub fn apply_named(&self, name: &str, scope: Scope, nested: &WithSpec) -> RepoResult<Scope> {
        let modifier = self
            .named_scopes
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, modifier)| modifier)
            .ok_or_else(|| ConfigError::UnknownNamedScope(name.to_string()))?;
        match modifier {
            ScopeModifier::Named(other) if other == name => {
                Err(ConfigError::UnknownNamedScope(name.to_string()).into())
            }
            modifier => self.apply(modifier, scope, nested),
        }
    }

    fn apply(&self, modifier: &ScopeModifier, scope: Scope, nested: &WithSpec) -> RepoResult<Scope> {
        match modifier {
            ScopeModifier::Plain(f) => f(scope),
            ScopeModifier::Nested(f) => f(scope, nested),
            ScopeModifier::Named(name) => self.apply_named(name, scope, nested),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeLoader, Config, OptionalBundle, ScopeModifier, WithSpec};
    use crate::record::Scope;
    use crate::repo::ConfigError;
    use serde_json::{json, Value};

    #[test]
    fn only_and_except_are_exclusive() {
        let mut config = Config::new();
        assert_eq!(
            config
                .attributes(Some(&["id"]), Some(&["secret"]))
                .unwrap_err(),
            ConfigError::OnlyAndExcept
        );
        config.except(&["secret"]).unwrap();
        assert_eq!(config.only(&["id"]).unwrap_err(), ConfigError::OnlyAndExcept);
    }

    #[test]
    fn with_spec_is_order_insensitive() {
        let a = WithSpec::from(["posts", "comments"]);
        let b = WithSpec::from(["comments", "posts"]);
        assert_eq!(a, b);
        assert_eq!(a.cache_key(), "comments, posts");
        let nested = WithSpec::new().nested("posts", "comments");
        assert_eq!(nested.to_string(), "posts(comments)");
        assert_eq!(nested.nested_for("posts"), WithSpec::from("comments"));
    }

    #[test]
    fn unknown_optional_names_known_keys() {
        let mut config = Config::new();
        config.optional("posts_count", OptionalBundle::new());
        let err = config
            .assert_optional(&WithSpec::from(["posts_count", "bogus"]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownOptional {
                unknown: vec!["bogus".into()],
                known: vec!["posts_count".into()],
            }
        );
        assert_eq!(err.to_string(), "unknown option(s): bogus (not in: [posts_count])");
    }

    #[test]
    fn bundle_attributes_join_always_attributes() {
        let mut config = Config::new();
        config.optional(
            "stats",
            OptionalBundle::new()
                .attribute("score", AttributeLoader::record(|_| Ok(json!(1))))
                .attribute("rank", AttributeLoader::record(|_| Ok(Value::Null))),
        );
        config.optional("posts_count", OptionalBundle::new());
        assert_eq!(config.always_attributes(), ["score", "rank", "posts_count"]);
    }

    #[test]
    fn scopes_fold_in_registration_order() {
        let mut config = Config::new();
        config
            .named_scope(
                "admins",
                ScopeModifier::plain(|scope: Scope| Ok(scope.where_eq("admin", 1))),
            )
            .optional(
                "first",
                OptionalBundle::new().scope(ScopeModifier::plain(|scope: Scope| {
                    Ok(scope.select("1 AS first"))
                })),
            )
            .optional(
                "second",
                OptionalBundle::new().scope(ScopeModifier::named("admins")),
            );

        let scope = config
            .scope(Scope::new("users", "id"), &WithSpec::from(["second", "first"]))
            .unwrap();
        let expected = Scope::new("users", "id")
            .select("1 AS first")
            .where_eq("admin", 1);
        assert_eq!(scope, expected);

        let untouched = config
            .scope(Scope::new("users", "id"), &WithSpec::new())
            .unwrap();
        assert_eq!(untouched, Scope::new("users", "id"));
    }
}
