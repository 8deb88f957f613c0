// =============================================================================
// Central Application State
// =============================================================================
//
// The single source of truth shared by every HTTP handler and background
// worker: the database connection, the loaded config, and the boot-scoped
// correlation id generator.
//
// Thread safety:
//   - parking_lot::Mutex guards the one SQLite connection; SQLite
//     serializes writers anyway, so a single connection behind a mutex is
//     simpler than a pool and no less concurrent in practice.
//   - AtomicU64 tracks how many risk-cache sweeps have run, for logging.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::config::Config;
use crate::op_context::{CorrelationIdGenerator, OpContext};

pub struct AppState {
    pub config: Config,
    pub db: Arc<Mutex<Connection>>,
    pub correlation: CorrelationIdGenerator,
    risk_cache_sweeps: AtomicU64,
}

impl AppState {
    pub fn new(config: Config, db: Connection) -> Self {
        Self {
            config,
            db: Arc::new(Mutex::new(db)),
            correlation: CorrelationIdGenerator::new(),
            risk_cache_sweeps: AtomicU64::new(0),
        }
    }

    /// Opens an auto-commit operation context against the shared
    /// connection.
    pub fn op(&self, caller: impl Into<String>) -> OpContext<'_> {
        OpContext::new(&self.db, &self.correlation, caller)
    }

    /// Opens a transactional operation context against the shared
    /// connection.
    pub fn op_transaction(&self, caller: impl Into<String>) -> Result<OpContext<'_>, crate::error::AppError> {
        OpContext::new_transaction(&self.db, &self.correlation, caller)
    }

    pub fn record_risk_cache_sweep(&self) -> u64 {
        self.risk_cache_sweeps.fetch_add(1, Ordering::Relaxed) + 1
    }
}
