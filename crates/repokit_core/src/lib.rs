//! Repository-pattern data access over SQLite.
//!
//! Records are rows, models are the immutable values callers see, and
//! repositories map one to the other. Expected persistence failures come
//! back as `Outcome::Failure` carrying field errors; everything else is an
//! `Err`.

pub mod db;
pub mod dependencies;
pub mod list;
pub mod logging;
pub mod lookup;
pub mod model;
pub mod record;
pub mod repo;

pub use db::{open_db, open_db_in_memory, DbError, Migration, Savepoint};
pub use dependencies::{DependencyDefault, DependencyError, DependencyOverrides};
pub use list::{Direction, List, OrderSpec};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use lookup::{ClassEntry, ClassKind, ClassLookup, ClassRef, ClassRegistry, LookupError};
pub use model::{
    Attribute, AttributeSet, Attributes, Errors, Input, Loadable, Model, ModelError, OpenInput,
    Persisted, Unloaded, WithAttributes, WithModel,
};
pub use record::{Record, RecordClass, RecordId, Scope};
pub use repo::{
    Config, ConfigError, ErrorKind, ExceptionHandler, Failure, Finder, OptionalBundle, Outcome,
    RepoError, RepoResult, Repository, RepositoryClass, WithSpec,
};
