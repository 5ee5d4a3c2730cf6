//! Late-bound, named dependencies with defaults.
//!
//! # Responsibility
//! - Hold per-class defaults that resolve lazily on first access.
//! - Let instances override defaults at construction time.
//!
//! # Invariants
//! - A derived container never mutates its parent.
//! - Class-only dependencies cannot be overridden per instance.
//! - A resolved value is memoized by its cache and never re-resolved.

use crate::lookup::{ClassKind, ClassLookup, ClassRegistry, LookupError};
use std::any::Any;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};

pub type DependencyValue = Arc<dyn Any + Send + Sync>;

/// Context a dependency default is resolved against.
pub trait DependencyOwner {
    /// Source name for lookups (usually the owning class name).
    fn lookup_name(&self) -> &str;
    fn registry(&self) -> Result<Arc<ClassRegistry>, LookupError>;
}

pub enum DependencyDefault<O> {
    Literal(DependencyValue),
    Thunk(Arc<dyn Fn() -> DependencyValue + Send + Sync>),
    /// Called with the owner.
    Owner(Arc<dyn Fn(&O) -> DependencyValue + Send + Sync>),
    /// Resolves to a `ClassRef` through a chained lookup sourced at the owner.
    Lookup(ClassLookup),
    /// Resolves to the owner's conventionally associated `ClassRef`.
    Associated(ClassKind),
}

impl<O> DependencyDefault<O> {
    pub fn literal<T: Any + Send + Sync>(value: T) -> Self {
        Self::Literal(Arc::new(value))
    }

    pub fn thunk<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::Thunk(Arc::new(move || Arc::new(f()) as DependencyValue))
    }

    pub fn owner<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&O) -> T + Send + Sync + 'static,
    {
        Self::Owner(Arc::new(move |owner| Arc::new(f(owner)) as DependencyValue))
    }
}

impl<O> Clone for DependencyDefault<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(Arc::clone(value)),
            Self::Thunk(f) => Self::Thunk(Arc::clone(f)),
            Self::Owner(f) => Self::Owner(Arc::clone(f)),
            Self::Lookup(lookup) => Self::Lookup(lookup.clone()),
            Self::Associated(kind) => Self::Associated(kind.clone()),
        }
    }
}

struct DependencyEntry<O> {
    key: String,
    default: DependencyDefault<O>,
    overridable: bool,
}

impl<O> Clone for DependencyEntry<O> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            default: self.default.clone(),
            overridable: self.overridable,
        }
    }
}

/// Ordered keyed defaults owned by one class.
pub struct DependencyContainer<O> {
    entries: Vec<DependencyEntry<O>>,
}

impl<O> Default for DependencyContainer<O> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<O> Clone for DependencyContainer<O> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<O: DependencyOwner> DependencyContainer<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a dependency that instances may override.
    pub fn add(&mut self, key: impl Into<String>, default: DependencyDefault<O>) -> &mut Self {
        self.insert(key.into(), default, true)
    }

    /// Adds (or replaces) a dependency with no per-instance override.
    pub fn add_class_only(
        &mut self,
        key: impl Into<String>,
        default: DependencyDefault<O>,
    ) -> &mut Self {
        self.insert(key.into(), default, false)
    }

    fn insert(&mut self, key: String, default: DependencyDefault<O>, overridable: bool) -> &mut Self {
        let entry = DependencyEntry {
            key,
            default,
            overridable,
        };
        match self.entries.iter_mut().find(|existing| existing.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.key.as_str()).collect()
    }

    pub fn overridable_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.overridable)
            .map(|entry| entry.key.as_str())
            .collect()
    }

    /// Copy for a subclass.
    pub fn derive(&self) -> Self {
        self.clone()
    }

    pub fn resolve(&self, owner: &O, key: &str) -> Result<DependencyValue, DependencyError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.key == key)
            .ok_or_else(|| DependencyError::Unknown {
                key: key.to_string(),
            })?;

        let value = match &entry.default {
            DependencyDefault::Literal(value) => Arc::clone(value),
            DependencyDefault::Thunk(f) => f(),
            DependencyDefault::Owner(f) => f(owner),
            DependencyDefault::Lookup(lookup) => {
                Arc::new(lookup.call(&*owner.registry()?, Some(owner.lookup_name()))?)
            }
            DependencyDefault::Associated(kind) => {
                Arc::new(owner.registry()?.resolve(owner.lookup_name(), kind))
            }
        };
        Ok(value)
    }

    pub fn resolve_all(&self, owner: &O) -> Result<Vec<(String, DependencyValue)>, DependencyError> {
        self.entries
            .iter()
            .map(|entry| Ok((entry.key.clone(), self.resolve(owner, &entry.key)?)))
            .collect()
    }

    /// Validates per-instance overrides against this container.
    pub fn check_overrides(&self, overrides: &DependencyOverrides) -> Result<(), DependencyError> {
        for (key, _) in &overrides.values {
            let overridable = self
                .entries
                .iter()
                .any(|entry| entry.overridable && &entry.key == key);
            if !overridable {
                return Err(DependencyError::NotOverridable {
                    key: key.clone(),
                    overridable: self
                        .overridable_keys()
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                });
            }
        }
        Ok(())
    }
}

/// Per-instance values that bypass default resolution.
#[derive(Clone, Default)]
pub struct DependencyOverrides {
    values: Vec<(String, DependencyValue)>,
}

impl DependencyOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.values.push((key.into(), Arc::new(value)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&DependencyValue> {
        self.values
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }
}

/// Memo of resolved dependency values.
#[derive(Default)]
pub struct DependencyCache {
    values: RwLock<HashMap<String, DependencyValue>>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved value for `key`, resolving through `container` once.
    pub fn get<O: DependencyOwner>(
        &self,
        container: &DependencyContainer<O>,
        owner: &O,
        key: &str,
    ) -> Result<DependencyValue, DependencyError> {
        if let Some(value) = self
            .values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
        {
            return Ok(Arc::clone(value));
        }

        let value = container.resolve(owner, key)?;
        Ok(Arc::clone(
            self.values
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .entry(key.to_string())
                .or_insert(value),
        ))
    }
}

/// Downcasts a resolved dependency.
pub fn typed<T: Any + Send + Sync>(
    key: &str,
    value: DependencyValue,
) -> Result<Arc<T>, DependencyError> {
    value
        .downcast::<T>()
        .map_err(|_| DependencyError::WrongType {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    Unknown {
        key: String,
    },
    NotOverridable {
        key: String,
        overridable: Vec<String>,
    },
    WrongType {
        key: String,
        expected: &'static str,
    },
    Lookup(LookupError),
}

impl Display for DependencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown { key } => write!(f, "unknown dependency `{key}`"),
            Self::NotOverridable { key, overridable } => write!(
                f,
                "dependency `{key}` cannot be overridden (overridable: {})",
                overridable.join(", ")
            ),
            Self::WrongType { key, expected } => {
                write!(f, "dependency `{key}` is not a `{expected}`")
            }
            Self::Lookup(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DependencyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lookup(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LookupError> for DependencyError {
    fn from(value: LookupError) -> Self {
        Self::Lookup(value)
    }
}
