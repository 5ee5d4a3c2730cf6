//! Errors raised by units of work and by repository configuration.
//!
//! `RepoError` is what a unit of work "raises". The exception table turns
//! the declared kinds into `Outcome::Failure`; everything else is returned
//! as `Err` to the caller.

use crate::db::DbError;
use crate::dependencies::DependencyError;
use crate::lookup::LookupError;
use crate::model::{Errors, ModelError};
use rusqlite::ffi;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error category; kinds form an explicit hierarchy rooted at `Exception`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Exception,
    RecordNotFound,
    StatementInvalid,
    NotNullViolation,
    RecordNotUnique,
    InvalidForeignKey,
    CheckViolation,
    RecordInvalid,
    Rollback,
    Configuration,
    Model,
    Custom(String),
}

impl ErrorKind {
    pub fn parent(&self) -> Option<ErrorKind> {
        match self {
            Self::Exception => None,
            Self::NotNullViolation
            | Self::RecordNotUnique
            | Self::InvalidForeignKey
            | Self::CheckViolation => Some(Self::StatementInvalid),
            _ => Some(Self::Exception),
        }
    }

    /// `self`, its parent, ... up to and including `Exception`.
    pub fn lineage(&self) -> Vec<ErrorKind> {
        let mut lineage = vec![self.clone()];
        while let Some(parent) = lineage.last().and_then(ErrorKind::parent) {
            lineage.push(parent);
        }
        lineage
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Custom(name) => f.write_str(name),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug)]
pub enum RepoError {
    NotFound { table: String, key: String },
    NotNullViolation { message: String },
    NotUnique { message: String },
    ForeignKeyViolation { message: String },
    CheckViolation { message: String },
    /// Input failed validation before reaching storage.
    Invalid(Errors),
    /// Signal to roll back the innermost transaction quietly.
    Rollback,
    Lookup(LookupError),
    Dependency(DependencyError),
    Config(ConfigError),
    Model(ModelError),
    Db(DbError),
    /// Application-declared error kind.
    Custom { kind: String, message: String },
}

impl RepoError {
    pub fn custom(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Custom {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::RecordNotFound,
            Self::NotNullViolation { .. } => ErrorKind::NotNullViolation,
            Self::NotUnique { .. } => ErrorKind::RecordNotUnique,
            Self::ForeignKeyViolation { .. } => ErrorKind::InvalidForeignKey,
            Self::CheckViolation { .. } => ErrorKind::CheckViolation,
            Self::Invalid(_) => ErrorKind::RecordInvalid,
            Self::Rollback => ErrorKind::Rollback,
            Self::Lookup(_) | Self::Dependency(_) | Self::Config(_) => ErrorKind::Configuration,
            Self::Model(_) => ErrorKind::Model,
            Self::Db(_) => ErrorKind::StatementInvalid,
            Self::Custom { kind, .. } => ErrorKind::Custom(kind.clone()),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { table, key } => write!(f, "couldn't find record in {table} with {key}"),
            Self::NotNullViolation { message }
            | Self::NotUnique { message }
            | Self::ForeignKeyViolation { message }
            | Self::CheckViolation { message } => f.write_str(message),
            Self::Invalid(errors) => {
                write!(f, "validation failed: {}", errors.full_messages().join(", "))
            }
            Self::Rollback => f.write_str("transaction rolled back"),
            Self::Lookup(err) => write!(f, "{err}"),
            Self::Dependency(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Model(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Custom { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lookup(err) => Some(err),
            Self::Dependency(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Model(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &value {
            let message = message.clone().unwrap_or_else(|| value.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_NOTNULL => return Self::NotNullViolation { message },
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return Self::NotUnique { message }
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return Self::ForeignKeyViolation { message },
                ffi::SQLITE_CONSTRAINT_CHECK => return Self::CheckViolation { message },
                _ => {}
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

impl From<LookupError> for RepoError {
    fn from(value: LookupError) -> Self {
        Self::Lookup(value)
    }
}

impl From<DependencyError> for RepoError {
    fn from(value: DependencyError) -> Self {
        Self::Dependency(value)
    }
}

impl From<ConfigError> for RepoError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ModelError> for RepoError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

/// Mistakes in how a repository, list or query is set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    OnlyAndExcept,
    UnknownOptional {
        unknown: Vec<String>,
        known: Vec<String>,
    },
    UnknownNamedScope(String),
    InvalidColumn(String),
    InvalidOrder(String),
    EmptyFinder,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnlyAndExcept => f.write_str("can't set both only and except attributes"),
            Self::UnknownOptional { unknown, known } => write!(
                f,
                "unknown option(s): {} (not in: [{}])",
                unknown.join(", "),
                known.join(", ")
            ),
            Self::UnknownNamedScope(name) => write!(f, "unknown named scope `{name}`"),
            Self::InvalidColumn(column) => write!(f, "invalid column name `{column}`"),
            Self::InvalidOrder(order) => write!(f, "invalid order clause `{order}`"),
            Self::EmptyFinder => f.write_str("find requires a primary key or a non-empty filter"),
        }
    }
}

impl Error for ConfigError {}
