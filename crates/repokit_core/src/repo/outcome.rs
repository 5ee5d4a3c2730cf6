//! Success/failure values returned by repository operations.

use super::{ErrorKind, RepoError};
use crate::model::Errors;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Expected failure: the mapped error plus field-attributed details.
#[derive(Debug)]
pub struct Failure {
    pub error: RepoError,
    pub errors: Errors,
}

impl Failure {
    pub fn new(error: RepoError, errors: Errors) -> Self {
        Self { error, errors }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// `email can't be blank, base not found`.
    pub fn message(&self) -> String {
        self.errors.full_messages().join(", ")
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.error)
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug)]
#[must_use]
pub enum Outcome<T> {
    Success(T),
    Failure(Failure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    pub fn errors(&self) -> Option<&Errors> {
        self.failure().map(|failure| &failure.errors)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Self::Success(value) => f(value),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }

    /// Runs `f` for its outcome only; keeps the value unless `f` fails.
    pub fn and_tap<U>(self, f: impl FnOnce(&T) -> Outcome<U>) -> Outcome<T> {
        match self {
            Self::Success(value) => match f(&value) {
                Outcome::Success(_) => Self::Success(value),
                Outcome::Failure(failure) => Self::Failure(failure),
            },
            failure => failure,
        }
    }

    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl<T> From<Result<T, Failure>> for Outcome<T> {
    fn from(value: Result<T, Failure>) -> Self {
        match value {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure(failure),
        }
    }
}
