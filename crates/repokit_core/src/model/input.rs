//! Mutable, validatable attribute holders used for writes.
//!
//! # Invariants
//! - `Input::attributes` validates first; invalid input never yields data.
//! - Persistence failures can be transplanted onto an input's error holder,
//!   after which the input reports itself invalid.

use super::Attributes;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Field name used for errors not attributable to one field.
pub const BASE: &str = "base";

/// Ordered field -> error codes map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Errors {
    entries: Vec<(String, Vec<String>)>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(field: impl Into<String>, code: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, code);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, code: impl Into<String>) {
        let field = field.into();
        let code = code.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == field) {
            Some((_, codes)) => {
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
            None => self.entries.push((field, vec![code])),
        }
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(existing, _)| existing == field)
            .map(|(_, codes)| codes.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(field, _)| field.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(field, codes)| (field.as_str(), codes.as_slice()))
    }

    pub fn merge(&mut self, other: &Errors) {
        for (field, codes) in other.iter() {
            for code in codes {
                self.add(field, code.clone());
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Human readable messages, `email can't be blank`.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(field, codes)| {
                codes.iter().map(move |code| {
                    let message = humanize_code(code);
                    if field == BASE {
                        message
                    } else {
                        format!("{} {message}", field.replace('_', " "))
                    }
                })
            })
            .collect()
    }
}

fn humanize_code(code: &str) -> String {
    if code == "blank" {
        return "can't be blank".to_string();
    }
    if let Some(rest) = code.strip_prefix("taken") {
        return format!("has already been taken{rest}");
    }
    code.to_string()
}

impl Serialize for Errors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (field, codes) in &self.entries {
            map.serialize_entry(field, codes)?;
        }
        map.end()
    }
}

/// Attribute source for repository writes.
///
/// Inputs without an error holder (`errors_mut` returns `None`) receive
/// persistence failures only through the returned `Failure`.
pub trait Input {
    /// Attributes without validation.
    fn raw_attributes(&self) -> Attributes;

    fn validate(&self, _errors: &mut Errors) {}

    fn errors(&self) -> Option<&Errors> {
        None
    }

    fn errors_mut(&mut self) -> Option<&mut Errors> {
        None
    }

    /// Re-runs validations, replacing held errors.
    fn run_validations(&mut self) -> bool {
        let mut found = Errors::new();
        self.validate(&mut found);
        let valid = found.is_empty();
        if let Some(errors) = self.errors_mut() {
            *errors = found;
        }
        valid
    }

    /// Whether the held errors are non-empty. Does not re-validate.
    fn is_invalid(&self) -> bool {
        self.errors().is_some_and(|errors| !errors.is_empty())
    }

    /// Validated attributes; invalid input yields its errors instead.
    fn attributes(&mut self) -> Result<Attributes, Errors> {
        let mut found = Errors::new();
        self.validate(&mut found);
        if let Some(errors) = self.errors_mut() {
            *errors = found.clone();
        }
        if found.is_empty() {
            Ok(self.raw_attributes())
        } else {
            Err(found)
        }
    }

    /// Transplants `errors`; returns false when there is no error holder.
    fn attach_errors(&mut self, errors: &Errors) -> bool {
        match self.errors_mut() {
            Some(holder) => {
                holder.merge(errors);
                true
            }
            None => false,
        }
    }
}

impl Input for Attributes {
    fn raw_attributes(&self) -> Attributes {
        self.clone()
    }
}

/// Input over an arbitrary attribute bag with presence validations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenInput {
    attributes: Attributes,
    required: Vec<String>,
    errors: Errors,
}

impl OpenInput {
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.attributes.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    pub fn with(self, extra: Attributes) -> WithAttributes<Self> {
        WithAttributes::new(self, extra)
    }
}

impl Input for OpenInput {
    fn raw_attributes(&self) -> Attributes {
        self.attributes.clone()
    }

    fn validate(&self, errors: &mut Errors) {
        for field in &self.required {
            let blank = match self.attributes.get(field) {
                None | Some(Value::Null) => true,
                Some(Value::String(text)) => text.trim().is_empty(),
                Some(_) => false,
            };
            if blank {
                errors.add(field.clone(), "blank");
            }
        }
    }

    fn errors(&self) -> Option<&Errors> {
        Some(&self.errors)
    }

    fn errors_mut(&mut self) -> Option<&mut Errors> {
        Some(&mut self.errors)
    }
}

/// Input decorated with extra, non-input attributes (an owner id, a
/// timestamp) for one write.
#[derive(Debug, Clone, PartialEq)]
pub struct WithAttributes<I> {
    input: I,
    extra: Attributes,
}

impl<I: Input> WithAttributes<I> {
    pub fn new(input: I, extra: Attributes) -> Self {
        Self { input, extra }
    }

    pub fn inner(&self) -> &I {
        &self.input
    }

    pub fn into_inner(self) -> I {
        self.input
    }
}

impl<I: Input> Input for WithAttributes<I> {
    fn raw_attributes(&self) -> Attributes {
        let mut attributes = self.input.raw_attributes();
        for (name, value) in &self.extra {
            attributes.insert(name.clone(), value.clone());
        }
        attributes
    }

    fn validate(&self, errors: &mut Errors) {
        self.input.validate(errors);
    }

    fn errors(&self) -> Option<&Errors> {
        self.input.errors()
    }

    fn errors_mut(&mut self) -> Option<&mut Errors> {
        self.input.errors_mut()
    }
}

/// Input paired with the model it edits, so a failed update can re-render
/// the form with both the submitted values and the stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct WithModel<I, M> {
    input: I,
    model: M,
}

impl<I: Input, M> WithModel<I, M> {
    pub fn new(input: I, model: M) -> Self {
        Self { input, model }
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_parts(self) -> (I, M) {
        (self.input, self.model)
    }
}

impl<I: Input, M> Input for WithModel<I, M> {
    fn raw_attributes(&self) -> Attributes {
        self.input.raw_attributes()
    }

    fn validate(&self, errors: &mut Errors) {
        self.input.validate(errors);
    }

    fn errors(&self) -> Option<&Errors> {
        self.input.errors()
    }

    fn errors_mut(&mut self) -> Option<&mut Errors> {
        self.input.errors_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::{Errors, Input, OpenInput, WithModel};
    use crate::model::Attributes;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn with_model_delegates_to_its_input() {
        let mut edit = WithModel::new(
            OpenInput::new(attrs(json!({ "name": "" }))).require("name"),
            json!({ "id": 7, "name": "Ann" }),
        );

        assert_eq!(edit.attributes().unwrap_err().get("name"), ["blank"]);
        assert_eq!(edit.input().errors().unwrap().get("name"), ["blank"]);
        assert_eq!(edit.model()["name"], json!("Ann"));
    }

    #[test]
    fn invalid_input_refuses_attribute_access() {
        let mut input = OpenInput::new(attrs(json!({ "email": "  " }))).require("email");
        let errors = input.attributes().unwrap_err();
        assert_eq!(errors.get("email"), ["blank"]);
        assert!(input.is_invalid());
    }

    #[test]
    fn transplanted_errors_make_input_invalid() {
        let mut input = OpenInput::new(attrs(json!({ "email": "a@b" })));
        assert!(input.run_validations());
        assert!(input.attach_errors(&Errors::on("email", "taken")));
        assert!(input.is_invalid());
        assert_eq!(
            input.errors().unwrap().full_messages(),
            ["email has already been taken"]
        );
    }

    #[test]
    fn plain_maps_have_no_error_holder() {
        let mut map = attrs(json!({ "name": "x" }));
        assert!(!map.attach_errors(&Errors::on("name", "blank")));
        assert_eq!(map.attributes().unwrap(), attrs(json!({ "name": "x" })));
    }

    #[test]
    fn decorated_input_merges_extra_attributes() {
        let input = OpenInput::new(attrs(json!({ "content": "hi" })))
            .with(attrs(json!({ "user_id": 7 })));
        assert_eq!(
            input.raw_attributes(),
            attrs(json!({ "content": "hi", "user_id": 7 }))
        );
    }
}
