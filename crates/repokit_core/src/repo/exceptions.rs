//! Error-kind to failure-details mapping.
//!
//! # Invariants
//! - Lookup walks the error's kind lineage, most specific first, and never
//!   consults handlers registered for `ErrorKind::Exception`.
//! - Within one kind, the newest registration is consulted first; a handler
//!   returning `None` defers to the next.
//! - An error no handler claims stays an error (fail loud).

use super::{ErrorKind, RepoError};
use crate::logging::sanitize_message;
use crate::model::input::BASE;
use crate::model::Errors;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static SQLITE_TAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"constraint failed: (.+)$").expect("valid regex"));
static QUALIFIED_COLUMN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+\.(\w+)$").expect("valid regex"));
static PG_COLUMN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"column "(\w+)""#).expect("valid regex"));
static PG_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Key \((.*?)\)=").expect("valid regex"));

/// What a handler maps an error to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetails {
    Fields(Errors),
    /// Reported on the `base` field.
    Message(String),
}

impl ErrorDetails {
    pub fn into_errors(self) -> Errors {
        match self {
            Self::Fields(errors) => errors,
            Self::Message(message) => Errors::on(BASE, message),
        }
    }
}

impl From<Errors> for ErrorDetails {
    fn from(value: Errors) -> Self {
        Self::Fields(value)
    }
}

impl From<&str> for ErrorDetails {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<String> for ErrorDetails {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

type HandlerFn = Arc<dyn Fn(&RepoError) -> Option<ErrorDetails> + Send + Sync>;

#[derive(Clone)]
pub struct ExceptionHandler(HandlerFn);

impl ExceptionHandler {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RepoError) -> Option<ErrorDetails> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Ignores the error and always maps to `details`.
    pub fn constant(details: impl Into<ErrorDetails>) -> Self {
        let details = details.into();
        Self(Arc::new(move |_| Some(details.clone())))
    }

    pub fn call(&self, error: &RepoError) -> Option<ErrorDetails> {
        (self.0)(error)
    }
}

impl std::fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExceptionHandler(..)")
    }
}

/// Ordered `(kind, handler)` registrations.
#[derive(Debug, Clone)]
pub struct ExceptionTable {
    entries: Vec<(ErrorKind, ExceptionHandler)>,
}

impl Default for ExceptionTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ExceptionTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Not-found, not-null, uniqueness and invalid-input mappings.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        table
            .register(ErrorKind::RecordNotFound, ExceptionHandler::constant("not found"))
            .register(
                ErrorKind::NotNullViolation,
                ExceptionHandler::from_fn(|error| Some(presence_details(&error.to_string()))),
            )
            .register(
                ErrorKind::RecordNotUnique,
                ExceptionHandler::from_fn(|error| Some(uniqueness_details(&error.to_string()))),
            )
            .register(
                ErrorKind::RecordInvalid,
                ExceptionHandler::from_fn(|error| match error {
                    RepoError::Invalid(errors) => Some(ErrorDetails::Fields(errors.clone())),
                    _ => None,
                }),
            );
        table
    }

    /// Registers ahead of every existing handler.
    pub fn register(&mut self, kind: ErrorKind, handler: ExceptionHandler) -> &mut Self {
        self.entries.insert(0, (kind, handler));
        self
    }

    pub fn kinds(&self) -> Vec<&ErrorKind> {
        self.entries.iter().map(|(kind, _)| kind).collect()
    }

    /// Field errors for `error`, or `None` when nothing claims it.
    pub fn handle(&self, error: &RepoError) -> Option<Errors> {
        for kind in error.kind().lineage() {
            if kind == ErrorKind::Exception {
                break;
            }
            let details = self
                .entries
                .iter()
                .filter(|(registered, _)| *registered == kind)
                .find_map(|(_, handler)| handler.call(error));
            if let Some(details) = details {
                return Some(details.into_errors());
            }
        }
        None
    }
}

/// Columns named by a constraint message, in message order.
///
/// SQLite lists `table.column` pairs after `constraint failed:`; Postgres
/// names them in a `Key (...)=` detail or a `column "..."` phrase.
pub fn constraint_columns(message: &str) -> Vec<String> {
    if let Some(tail) = SQLITE_TAIL_RE.captures(message).and_then(|c| c.get(1)) {
        let qualified: Vec<String> = tail
            .as_str()
            .split(',')
            .filter_map(|part| QUALIFIED_COLUMN_RE.captures(part.trim()))
            .filter_map(|captures| captures.get(1))
            .map(|column| column.as_str().to_string())
            .collect();
        if !qualified.is_empty() {
            return qualified;
        }
    }
    if let Some(key) = PG_KEY_RE.captures(message).and_then(|c| c.get(1)) {
        return key
            .as_str()
            .split(',')
            .map(|column| column.trim().to_string())
            .filter(|column| !column.is_empty())
            .collect();
    }
    if let Some(column) = PG_COLUMN_RE.captures(message).and_then(|c| c.get(1)) {
        return vec![column.as_str().to_string()];
    }
    Vec::new()
}

fn presence_details(message: &str) -> ErrorDetails {
    match constraint_columns(message).into_iter().next() {
        Some(column) => ErrorDetails::Fields(Errors::on(column, "blank")),
        None => ErrorDetails::Message(sanitize_message(message)),
    }
}

fn uniqueness_details(message: &str) -> ErrorDetails {
    let mut columns = constraint_columns(message);
    let Some(column) = columns.pop() else {
        return ErrorDetails::Message(sanitize_message(message));
    };
    let code = if columns.is_empty() {
        "taken".to_string()
    } else {
        format!("taken in scope {}", columns.join(", "))
    };
    ErrorDetails::Fields(Errors::on(column, code))
}
