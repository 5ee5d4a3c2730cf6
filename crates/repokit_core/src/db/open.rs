//! Connection bootstrap utilities for SQLite.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have the supplied migrations fully applied.

use super::migrations::{apply_migrations, Migration};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and applies pending `migrations`.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, migrations: &[Migration]) -> DbResult<Connection> {
    open_with("file", migrations, || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies pending `migrations`.
pub fn open_db_in_memory(migrations: &[Migration]) -> DbResult<Connection> {
    open_with("memory", migrations, Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    migrations: &[Migration],
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = connect().map_err(|err| {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={err}",
            started_at.elapsed().as_millis()
        );
        err
    })?;

    if let Err(err) = bootstrap_connection(&mut conn, migrations) {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={err}",
            started_at.elapsed().as_millis()
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok mode={mode} duration_ms={} migrations={}",
        started_at.elapsed().as_millis(),
        migrations.len()
    );
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn, migrations)?;
    Ok(())
}
