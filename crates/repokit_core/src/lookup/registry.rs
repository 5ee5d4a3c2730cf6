//! Explicit class registry with memoized conventional resolution.

use super::{ClassEntry, ClassKind, ClassRef, MissingClass};
use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

static GLOBAL: Lazy<Arc<ClassRegistry>> = Lazy::new(|| Arc::new(ClassRegistry::new()));

/// Where a resolution starts from.
#[derive(Debug, Clone)]
pub enum LookupSource {
    /// A class name; registered or not.
    Name(String),
    /// A previous lookup result, including misses.
    Class(ClassRef),
}

impl From<&str> for LookupSource {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for LookupSource {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<ClassRef> for LookupSource {
    fn from(value: ClassRef) -> Self {
        Self::Class(value)
    }
}

impl From<&ClassRef> for LookupSource {
    fn from(value: &ClassRef) -> Self {
        Self::Class(value.clone())
    }
}

impl LookupSource {
    fn memo_key(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Class(ClassRef::Found(entry)) => entry.name().to_string(),
            Self::Class(ClassRef::Missing(missing)) => {
                format!("?{}:{}", missing.base_name(), missing.kind())
            }
        }
    }
}

/// Registry of classes plus the resolution memo.
///
/// Safe for concurrent readers; first population of a memo slot takes the
/// write lock.
#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Arc<ClassEntry>>>,
    resolved: RwLock<HashMap<(String, ClassKind), ClassRef>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    pub fn global() -> Arc<ClassRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Registers (or replaces) a class by name.
    ///
    /// Replacing does not touch memoized resolutions.
    pub fn register(&self, entry: ClassEntry) -> ClassRef {
        let entry = Arc::new(entry);
        self.classes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(entry.name().to_string(), Arc::clone(&entry));
        ClassRef::Found(entry)
    }

    /// Exact name lookup without conventions or memoization.
    pub fn get(&self, class_name: &str) -> Option<Arc<ClassEntry>> {
        self.classes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(class_name)
            .cloned()
    }

    /// Resolves the class of `kind` associated with `source`.
    ///
    /// Never fails: when nothing matches, a `ClassRef::Missing` naming every
    /// attempted class is returned and memoized like a hit.
    pub fn resolve(&self, source: impl Into<LookupSource>, kind: &ClassKind) -> ClassRef {
        let source = source.into();
        let key = (source.memo_key(), kind.clone());

        if let Some(found) = self
            .resolved
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            return found.clone();
        }

        let resolved = self.resolve_uncached(&source, kind);
        self.resolved
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key)
            .or_insert(resolved)
            .clone()
    }

    fn resolve_uncached(&self, source: &LookupSource, kind: &ClassKind) -> ClassRef {
        let source = match source {
            LookupSource::Name(name) => match self.get(name) {
                Some(entry) => ClassRef::Found(entry),
                None => {
                    let source_kind = ClassKind::infer(name);
                    let base = source_kind.base_name(name).to_string();
                    ClassRef::Missing(MissingClass::new(vec![name.clone()], base, source_kind))
                }
            },
            LookupSource::Class(class_ref) => class_ref.clone(),
        };

        if source.kind() == kind {
            if let ClassRef::Found(_) = source {
                return source;
            }
        }

        if let ClassRef::Found(entry) = &source {
            if let Some(explicit) = entry.association(kind) {
                return self.find_named(&[explicit.to_string()], entry.derived_base_name(), kind);
            }
        }

        let base = source.base_name().to_string();
        self.find_named(&kind.class_names(&base), &base, kind)
    }

    fn find_named(&self, candidates: &[String], base: &str, kind: &ClassKind) -> ClassRef {
        for candidate in candidates {
            if let Some(entry) = self.get(candidate) {
                return ClassRef::Found(entry);
            }
        }
        debug!(
            "event=class_lookup module=lookup status=miss kind={kind} tried={}",
            candidates.join(",")
        );
        ClassRef::Missing(MissingClass::new(candidates.to_vec(), base, kind.clone()))
    }
}
