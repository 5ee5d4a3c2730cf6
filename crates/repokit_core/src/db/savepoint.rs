//! Nestable savepoint guard over a shared connection.
//!
//! # Invariants
//! - Each guard owns one uniquely named savepoint.
//! - A guard dropped without `commit` rolls its savepoint back.

use log::debug;
use rusqlite::Connection;
use uuid::Uuid;

/// Savepoint that rolls back on drop unless committed.
///
/// Unlike `rusqlite::Savepoint`, this works through `&Connection`, so a
/// repository can open savepoints while callers keep borrowing the same
/// connection.
pub struct Savepoint<'conn> {
    conn: &'conn Connection,
    name: String,
    finished: bool,
}

impl<'conn> Savepoint<'conn> {
    pub fn begin(conn: &'conn Connection) -> rusqlite::Result<Self> {
        let name = format!("sp_{}", Uuid::new_v4().simple());
        conn.execute_batch(&format!("SAVEPOINT {name};"))?;
        debug!("event=tx module=db status=start savepoint={name}");
        Ok(Self {
            conn,
            name,
            finished: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit(mut self) -> rusqlite::Result<()> {
        self.finished = true;
        self.conn.execute_batch(&format!("RELEASE {};", self.name))?;
        debug!("event=tx module=db status=ok savepoint={}", self.name);
        Ok(())
    }

    pub fn rollback(mut self) -> rusqlite::Result<()> {
        self.finished = true;
        self.rollback_inner()
    }

    fn rollback_inner(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(&format!(
            "ROLLBACK TO {name}; RELEASE {name};",
            name = self.name
        ))?;
        debug!("event=tx module=db status=rollback savepoint={}", self.name);
        Ok(())
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.rollback_inner();
        }
    }
}
