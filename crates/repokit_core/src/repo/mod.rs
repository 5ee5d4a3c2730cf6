//! Repositories: configuration, projection, outcomes and error mapping.
//!
//! # Responsibility
//! - Configure what a repository projects and which bundles it can load.
//! - Turn expected persistence failures into `Outcome::Failure`.
//! - Run writes inside nestable savepoints.
//!
//! # Invariants
//! - Errors no exception handler claims propagate as `Err`.
//! - A repository instance never changes after construction.

mod config;
mod error;
mod exceptions;
mod outcome;
mod projector;
mod repository;

pub use config::{AttributeLoader, Config, OptionalBundle, ScopeModifier, WithSpec};
pub use error::{ConfigError, ErrorKind, RepoError, RepoResult};
pub use exceptions::{constraint_columns, ErrorDetails, ExceptionHandler, ExceptionTable};
pub use outcome::{Failure, Outcome};
pub use projector::{LoadContext, RecordToHash};
pub use repository::{
    AnyRepository, Finder, Repository, RepositoryBuilder, RepositoryClass, RepositoryHandle,
    RepositoryMeta, RECORD_CLASS,
};
