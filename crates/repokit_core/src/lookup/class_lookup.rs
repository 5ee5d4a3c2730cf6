//! Chained lookups: try a specialized class first, fall back to general ones.

use super::{inflect, ClassKind, ClassRef, ClassRegistry, LookupError, MissingClass};
use std::sync::Arc;

/// What a strategy produces: a class name to look up, or a class itself.
#[derive(Debug, Clone)]
pub enum LookupTarget {
    Name(String),
    Class(ClassRef),
}

impl From<&str> for LookupTarget {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

impl From<String> for LookupTarget {
    fn from(value: String) -> Self {
        Self::Name(value)
    }
}

impl From<ClassRef> for LookupTarget {
    fn from(value: ClassRef) -> Self {
        Self::Class(value)
    }
}

#[derive(Clone)]
pub enum LookupStrategy {
    Target(LookupTarget),
    Thunk(Arc<dyn Fn() -> LookupTarget + Send + Sync>),
    /// Receives the source name.
    Transform(Arc<dyn Fn(&str) -> LookupTarget + Send + Sync>),
}

impl LookupStrategy {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Target(LookupTarget::Name(name.into()))
    }

    pub fn thunk<F, T>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Into<LookupTarget>,
    {
        Self::Thunk(Arc::new(move || f().into()))
    }

    pub fn transform<F, T>(f: F) -> Self
    where
        F: Fn(&str) -> T + Send + Sync + 'static,
        T: Into<LookupTarget>,
    {
        Self::Transform(Arc::new(move |source| f(source).into()))
    }
}

impl std::fmt::Debug for LookupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(target) => f.debug_tuple("Target").field(target).finish(),
            Self::Thunk(_) => f.write_str("Thunk(..)"),
            Self::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// Ordered list of lookup strategies; the first one that finds a class wins.
///
/// Misses accumulate, so the final `MissingClass` lists every name tried.
#[derive(Debug, Clone)]
pub struct ClassLookup {
    strategies: Vec<LookupStrategy>,
    source: Option<String>,
}

impl ClassLookup {
    pub fn new(strategy: LookupStrategy) -> Self {
        Self {
            strategies: vec![strategy],
            source: None,
        }
    }

    pub fn from_strategies(strategies: Vec<LookupStrategy>) -> Result<Self, LookupError> {
        if strategies.is_empty() {
            return Err(LookupError::NoStrategies);
        }
        Ok(Self {
            strategies,
            source: None,
        })
    }

    /// Repository lookup for an association name: `posts` ->
    /// `PostRepository`, then `PostRepo`.
    pub fn repository_for(association: &str) -> Self {
        Self::new(LookupStrategy::transform(|name: &str| {
            format!("{}Repository", inflect::classify(name))
        }))
        .on_missing(LookupStrategy::transform(|name: &str| {
            format!("{}Repo", inflect::classify(name))
        }))
        .source(association)
    }

    pub fn on_missing(mut self, strategy: LookupStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Default source for transforming strategies.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn call(
        &self,
        registry: &ClassRegistry,
        source: Option<&str>,
    ) -> Result<ClassRef, LookupError> {
        let source = source.or(self.source.as_deref());
        let mut tried: Vec<String> = Vec::new();

        for strategy in &self.strategies {
            let target = match strategy {
                LookupStrategy::Target(target) => target.clone(),
                LookupStrategy::Thunk(thunk) => thunk(),
                LookupStrategy::Transform(transform) => {
                    transform(source.ok_or(LookupError::SourceRequired)?)
                }
            };

            match target {
                LookupTarget::Class(ClassRef::Found(entry)) => return Ok(ClassRef::Found(entry)),
                LookupTarget::Class(ClassRef::Missing(missing)) => {
                    tried.extend(missing.class_names().iter().cloned());
                }
                LookupTarget::Name(name) => match registry.get(&name) {
                    Some(entry) => return Ok(ClassRef::Found(entry)),
                    None => tried.push(name),
                },
            }
        }

        let last = tried.last().cloned().unwrap_or_default();
        let kind = ClassKind::infer(&last);
        let base = kind.base_name(&last).to_string();
        Ok(ClassRef::Missing(MissingClass::new(tried, base, kind)))
    }
}
