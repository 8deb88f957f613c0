// =============================================================================
// Module: Operation Context
// =============================================================================
//
//! Every store call carries an `OpContext`: a correlation id for log
//! correlation, a caller tag for audit, and a handle onto the single SQLite
//! connection — either auto-commit or inside an explicit transaction. The
//! transaction is driven with plain `BEGIN`/`COMMIT`/`ROLLBACK` rather than
//! `rusqlite::Transaction` so that the context can hold the mutex guard
//! directly without a self-referential borrow.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::Connection;

use crate::error::AppError;

/// Boot-scoped correlation id generator: a random seed drawn once at
/// startup plus a monotonic counter, so ids are unique within the process
/// lifetime without needing a clock or external coordination.
pub struct CorrelationIdGenerator {
    boot_id: u64,
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    pub fn new() -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self {
            boot_id: u64::from_be_bytes(bytes),
            counter: AtomicU64::new(1),
        }
    }

    pub fn issue(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{:016x}-{:016x}", self.boot_id, seq)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// A live operation: a correlation id, a caller tag for logging, and a
/// handle onto the database connection.
pub struct OpContext<'a> {
    pub correlation_id: String,
    pub caller: String,
    conn: MutexGuard<'a, Connection>,
    in_transaction: bool,
}

impl<'a> OpContext<'a> {
    /// Opens an auto-commit context: every statement run through it
    /// commits immediately.
    pub fn new(
        db: &'a Mutex<Connection>,
        generator: &CorrelationIdGenerator,
        caller: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: generator.issue(),
            caller: caller.into(),
            conn: db.lock(),
            in_transaction: false,
        }
    }

    /// Opens a context inside an explicit transaction. The caller must
    /// call `commit()` to persist the work; dropping the context without
    /// committing leaves the transaction open on the connection, so
    /// callers always pair this with `rollback()` on the error path.
    pub fn new_transaction(
        db: &'a Mutex<Connection>,
        generator: &CorrelationIdGenerator,
        caller: impl Into<String>,
    ) -> Result<Self, AppError> {
        let conn = db.lock();
        conn.execute_batch("BEGIN")?;
        Ok(Self {
            correlation_id: generator.issue(),
            caller: caller.into(),
            conn,
            in_transaction: true,
        })
    }

    pub fn commit(&self) -> Result<(), AppError> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), AppError> {
        if !self.in_transaction {
            return Err(AppError::Calculation(
                "rollback called on a non-transactional operation context".into(),
            ));
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Formats a log prefix matching `[correlation_id:caller]`, mirroring
    /// the `opid:rhost` tag used on every log line in the original service.
    pub fn log_prefix(&self) -> String {
        format!("[{}:{}]", self.correlation_id, self.caller)
    }
}

impl<'a> std::ops::Deref for OpContext<'a> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

/// Shared handle to the single SQLite connection, wrapped so that both
/// auto-commit and transactional contexts can be opened against it.
pub type Db = Arc<Mutex<Connection>>;
