//! Convention-based association between models, records, inputs and
//! repositories.
//!
//! # Responsibility
//! - Hold explicit class registrations (`ClassRegistry`).
//! - Derive associated classes by naming convention on top of the registry.
//! - Represent misses as inert `MissingClass` placeholders.
//!
//! # Invariants
//! - A resolution is memoized per (source, kind) and never invalidated.
//! - A miss is a value, not an error, until something tries to use it.

use std::any::Any;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod class_lookup;
pub mod inflect;
mod registry;

pub use class_lookup::{ClassLookup, LookupStrategy, LookupTarget};
pub use registry::{ClassRegistry, LookupSource};

/// Role a class plays in the Model/Record/Input/Repository family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassKind {
    Model,
    Record,
    Input,
    Repository,
    /// Application-defined role, stored in `snake_case` (`list`, `policy`).
    Custom(String),
}

impl ClassKind {
    pub fn custom(name: &str) -> Self {
        Self::from_word(&inflect::underscore(name))
    }

    /// Maps a lowercase word back to a kind (`record` -> `Record`).
    pub fn from_word(word: &str) -> Self {
        match word {
            "model" => Self::Model,
            "record" => Self::Record,
            "input" => Self::Input,
            "repository" | "repo" => Self::Repository,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Infers the kind of a class from its name: the last camel-case word
    /// when it names a kind, `Model` otherwise.
    pub fn infer(class_name: &str) -> Self {
        match Self::from_word(&inflect::last_word(class_name)) {
            Self::Custom(_) => Self::Model,
            kind => kind,
        }
    }

    /// Name suffixes this kind is known by, preferred first.
    pub fn suffixes(&self) -> Vec<String> {
        match self {
            Self::Model => vec![String::new()],
            Self::Record => vec!["Record".to_string()],
            Self::Input => vec!["Input".to_string()],
            Self::Repository => vec!["Repository".to_string(), "Repo".to_string()],
            Self::Custom(name) => vec![inflect::camelize(name)],
        }
    }

    /// Conventional class names for `base` in this kind.
    pub fn class_names(&self, base: &str) -> Vec<String> {
        self.suffixes()
            .into_iter()
            .map(|suffix| format!("{base}{suffix}"))
            .collect()
    }

    /// Strips this kind's suffix from `class_name`.
    pub fn base_name<'a>(&self, class_name: &'a str) -> &'a str {
        self.suffixes()
            .iter()
            .filter(|suffix| !suffix.is_empty())
            .find_map(|suffix| class_name.strip_suffix(suffix.as_str()))
            .filter(|base| !base.is_empty())
            .unwrap_or(class_name)
    }
}

impl Display for ClassKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => f.write_str("model"),
            Self::Record => f.write_str("record"),
            Self::Input => f.write_str("input"),
            Self::Repository => f.write_str("repository"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// Placeholder for a conventional class that could not be found.
///
/// It can still be the source of further lookups; it only fails when used
/// as the class itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MissingClass {
    class_names: Vec<String>,
    base_name: String,
    kind: ClassKind,
}

impl MissingClass {
    pub fn new(class_names: Vec<String>, base_name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            class_names,
            base_name: base_name.into(),
            kind,
        }
    }

    /// The last name tried.
    pub fn class_name(&self) -> &str {
        self.class_names.last().map_or("", String::as_str)
    }

    pub fn also_tried(&self) -> &[String] {
        match self.class_names.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }
}

impl Display for MissingClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#<Missing class: {}", self.class_name())?;
        if !self.also_tried().is_empty() {
            write!(f, " (also tried: {})", self.also_tried().join(", "))?;
        }
        f.write_str(">")
    }
}

/// An explicitly registered class.
pub struct ClassEntry {
    name: String,
    kind: ClassKind,
    base_name: Option<String>,
    associations: BTreeMap<ClassKind, String>,
    value: Arc<dyn Any + Send + Sync>,
}

impl ClassEntry {
    /// Registers `value` under `name`; the kind is inferred from the name.
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, value: T) -> Self {
        let name = name.into();
        Self {
            kind: ClassKind::infer(&name),
            name,
            base_name: None,
            associations: BTreeMap::new(),
            value: Arc::new(value),
        }
    }

    pub fn kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares the base name used to derive associated classes.
    pub fn base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = Some(base_name.into());
        self
    }

    /// Overrides the associated class of `kind` with an explicit class name.
    pub fn associate(mut self, kind: ClassKind, class_name: impl Into<String>) -> Self {
        self.associations.insert(kind, class_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_kind(&self) -> &ClassKind {
        &self.kind
    }

    pub fn declared_base_name(&self) -> Option<&str> {
        self.base_name.as_deref()
    }

    pub fn association(&self, kind: &ClassKind) -> Option<&str> {
        self.associations.get(kind).map(String::as_str)
    }

    /// Base name for deriving associations.
    pub fn derived_base_name(&self) -> &str {
        self.base_name
            .as_deref()
            .unwrap_or_else(|| self.kind.base_name(&self.name))
    }

    pub fn value<T: Any + Send + Sync>(&self) -> Result<Arc<T>, LookupError> {
        Arc::clone(&self.value)
            .downcast::<T>()
            .map_err(|_| LookupError::WrongType {
                class_name: self.name.clone(),
                expected: std::any::type_name::<T>(),
            })
    }
}

impl std::fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_name", &self.base_name)
            .field("associations", &self.associations)
            .finish_non_exhaustive()
    }
}

/// Result of a lookup: a registered class or a missing placeholder.
#[derive(Debug, Clone)]
pub enum ClassRef {
    Found(Arc<ClassEntry>),
    Missing(MissingClass),
}

impl ClassRef {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Found(entry) => entry.name(),
            Self::Missing(missing) => missing.class_name(),
        }
    }

    pub fn kind(&self) -> &ClassKind {
        match self {
            Self::Found(entry) => entry.class_kind(),
            Self::Missing(missing) => missing.kind(),
        }
    }

    pub fn base_name(&self) -> &str {
        match self {
            Self::Found(entry) => entry.derived_base_name(),
            Self::Missing(missing) => missing.base_name(),
        }
    }

    pub fn entry(&self) -> Result<&Arc<ClassEntry>, LookupError> {
        match self {
            Self::Found(entry) => Ok(entry),
            Self::Missing(missing) => Err(LookupError::NotFound(missing.clone())),
        }
    }

    /// The registered value, typed.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, LookupError> {
        self.entry()?.value::<T>()
    }

    /// Same class (or same miss) as `other`.
    pub fn same_class(&self, other: &ClassRef) -> bool {
        match (self, other) {
            (Self::Found(a), Self::Found(b)) => Arc::ptr_eq(a, b),
            (Self::Missing(a), Self::Missing(b)) => a == b,
            _ => false,
        }
    }
}

impl Display for ClassRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Found(entry) => f.write_str(entry.name()),
            Self::Missing(missing) => write!(f, "{missing}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// A missing class was used as if it existed.
    NotFound(MissingClass),
    /// The registered value is not of the requested Rust type.
    WrongType {
        class_name: String,
        expected: &'static str,
    },
    /// A lookup was built without any strategy.
    NoStrategies,
    /// A transforming strategy ran without a source name.
    SourceRequired,
    /// The registry `owner` resolves against no longer exists.
    RegistryDropped { owner: String },
}

impl Display for LookupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(missing) => write!(
                f,
                "{} was accessed, but it was not found",
                missing.class_name()
            ),
            Self::WrongType {
                class_name,
                expected,
            } => write!(f, "class `{class_name}` is not a `{expected}`"),
            Self::NoStrategies => f.write_str("no lookups provided"),
            Self::SourceRequired => f.write_str("source required for lookup"),
            Self::RegistryDropped { owner } => {
                write!(f, "class registry used by `{owner}` was dropped")
            }
        }
    }
}

impl Error for LookupError {}

#[cfg(test)]
mod tests {
    use super::{ClassKind, MissingClass};

    #[test]
    fn kinds_are_inferred_from_names() {
        assert_eq!(ClassKind::infer("UserRecord"), ClassKind::Record);
        assert_eq!(ClassKind::infer("UserRepo"), ClassKind::Repository);
        assert_eq!(ClassKind::infer("UserRepository"), ClassKind::Repository);
        assert_eq!(ClassKind::infer("User"), ClassKind::Model);
        assert_eq!(ClassKind::Repository.base_name("UserRepo"), "User");
        assert_eq!(ClassKind::custom("List").class_names("User"), ["UserList"]);
    }

    #[test]
    fn missing_class_lists_earlier_attempts() {
        let missing = MissingClass::new(
            vec!["UserRepository".into(), "UserRepo".into()],
            "User",
            ClassKind::Repository,
        );
        assert_eq!(missing.class_name(), "UserRepo");
        assert_eq!(
            missing.to_string(),
            "#<Missing class: UserRepo (also tried: UserRepository)>"
        );
    }
}
