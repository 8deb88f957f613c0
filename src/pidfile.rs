// =============================================================================
// Module: PID file
// =============================================================================

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Holds an exclusively-created PID file for the process lifetime and
/// removes it on drop, so a crash leaves no PID file but a graceful
/// shutdown always cleans up after itself.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates the PID file at `path`, failing if one already exists —
    /// an existing file means another instance is (or recently was)
    /// running against the same path.
    pub fn create(path: &Path) -> Result<Self, AppError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                AppError::Config(format!(
                    "pid file {} already exists or is not writable: {e}",
                    path.display()
                ))
            })?;
        write!(file, "{}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
