//! Immutable domain models and the attribute sets they are built from.
//!
//! # Responsibility
//! - Define the `Model` contract used by repositories to materialize rows.
//! - Distinguish attributes that were intentionally not loaded from real
//!   nulls (`Attribute::Unloaded`, `Loadable::Unloaded`).
//!
//! # Invariants
//! - A model is built from a complete attribute set; a missing attribute is a
//!   construction error, not a silent default.
//! - Reading the value of an unloaded attribute is an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod input;

pub use input::{Errors, Input, OpenInput, WithAttributes, WithModel};

/// Ordered plain attribute map, as read from records or sent to writes.
pub type Attributes = serde_json::Map<String, Value>;

/// Marker for an attribute the repository deliberately did not load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unloaded {
    pub model: String,
    pub attribute: String,
}

impl Unloaded {
    pub fn new(model: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            attribute: attribute.into(),
        }
    }
}

impl Display for Unloaded {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<unloaded {}#{}>", self.model, self.attribute)
    }
}

/// One projected attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Loaded(Value),
    Unloaded(Unloaded),
}

impl Attribute {
    /// Blank in the form sense: null, empty string, or unloaded.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Loaded(Value::Null) => true,
            Self::Loaded(Value::String(text)) => text.trim().is_empty(),
            Self::Loaded(_) => false,
            Self::Unloaded(_) => true,
        }
    }

    pub fn value(&self) -> Result<&Value, ModelError> {
        match self {
            Self::Loaded(value) => Ok(value),
            Self::Unloaded(unloaded) => Err(ModelError::UnloadedAttribute(unloaded.clone())),
        }
    }
}

/// Attribute set projected from one record, consumed by `Model::from_attributes`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSet {
    model: String,
    entries: Vec<(String, Attribute)>,
}

impl AttributeSet {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            entries: Vec::new(),
        }
    }

    pub fn from_attributes(model: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            model: model.into(),
            entries: attributes
                .into_iter()
                .map(|(name, value)| (name, Attribute::Loaded(value)))
                .collect(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Inserts or replaces `name`, keeping its original position.
    pub fn insert(&mut self, name: impl Into<String>, attribute: Attribute) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = attribute,
            None => self.entries.push((name, attribute)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, attribute)| attribute)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let index = self.entries.iter().position(|(existing, _)| existing == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and decodes a required, loaded attribute.
    pub fn take<T: DeserializeOwned>(&mut self, name: &str) -> Result<T, ModelError> {
        match self.take_attribute(name)? {
            Attribute::Loaded(value) => self.decode(name, value),
            Attribute::Unloaded(unloaded) => Err(ModelError::UnloadedAttribute(unloaded)),
        }
    }

    /// Removes and decodes an attribute that may legitimately be unloaded.
    pub fn take_loadable<T: DeserializeOwned>(
        &mut self,
        name: &str,
    ) -> Result<Loadable<T>, ModelError> {
        match self.take_attribute(name)? {
            Attribute::Loaded(value) => Ok(Loadable::Loaded(self.decode(name, value)?)),
            Attribute::Unloaded(unloaded) => Ok(Loadable::Unloaded(unloaded)),
        }
    }

    /// Plain values; unloaded attributes become null.
    pub fn to_values(&self) -> Attributes {
        self.entries
            .iter()
            .map(|(name, attribute)| {
                let value = match attribute {
                    Attribute::Loaded(value) => value.clone(),
                    Attribute::Unloaded(_) => Value::Null,
                };
                (name.clone(), value)
            })
            .collect()
    }

    fn take_attribute(&mut self, name: &str) -> Result<Attribute, ModelError> {
        self.remove(name).ok_or_else(|| ModelError::MissingAttribute {
            model: self.model.clone(),
            attribute: name.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, name: &str, value: Value) -> Result<T, ModelError> {
        serde_json::from_value(value).map_err(|err| ModelError::InvalidAttribute {
            model: self.model.clone(),
            attribute: name.to_string(),
            message: err.to_string(),
        })
    }
}

/// Model field that may be intentionally unloaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Loaded(T),
    Unloaded(Unloaded),
}

impl<T> Loadable<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Unloaded(_) => None,
        }
    }

    pub fn get(&self) -> Result<&T, ModelError> {
        match self {
            Self::Loaded(value) => Ok(value),
            Self::Unloaded(unloaded) => Err(ModelError::UnloadedAttribute(unloaded.clone())),
        }
    }

    pub fn into_loaded(self) -> Result<T, ModelError> {
        match self {
            Self::Loaded(value) => Ok(value),
            Self::Unloaded(unloaded) => Err(ModelError::UnloadedAttribute(unloaded)),
        }
    }
}

// Unloaded values serialize as null so projections stay nil-like.
impl<T: Serialize> Serialize for Loadable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Loaded(value) => value.serialize(serializer),
            Self::Unloaded(_) => serializer.serialize_none(),
        }
    }
}

/// Immutable domain value built from a projected attribute set.
pub trait Model: Sized + Serialize {
    /// Model class name; unloaded markers and diagnostics carry it.
    const NAME: &'static str;

    fn from_attributes(attributes: AttributeSet) -> Result<Self, ModelError>;

    /// Symbol-keyed projection for serialization to callers.
    fn to_hash(&self) -> Attributes {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Attributes::new(),
        }
    }
}

/// Model backed by a stored row; equal when ids match.
pub trait Persisted: Model {
    fn id(&self) -> crate::record::RecordId;

    fn same_record(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    MissingAttribute {
        model: String,
        attribute: String,
    },
    UnloadedAttribute(Unloaded),
    InvalidAttribute {
        model: String,
        attribute: String,
        message: String,
    },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingAttribute { model, attribute } => {
                write!(f, "missing attribute {attribute} for {model}")
            }
            Self::UnloadedAttribute(unloaded) => write!(f, "{unloaded} was accessed"),
            Self::InvalidAttribute {
                model,
                attribute,
                message,
            } => write!(f, "invalid attribute {model}#{attribute}: {message}"),
        }
    }
}

impl Error for ModelError {}
