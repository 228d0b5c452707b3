//! Persistence: save and load a run to a file.
//! The whole [`Market`] is one serializable value, random stream included, so a
//! reloaded run continues the exact same sequence.

use crate::engine::Market;
use crate::error::SimResult;
use crate::types::Day;
use log::info;
use std::path::Path;

/// Persisted run plus the day it was saved on.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PersistedRun {
    pub market: Market,
    pub saved_at_day: Day,
}

impl PersistedRun {
    pub fn new(market: Market) -> Self {
        Self {
            saved_at_day: market.day(),
            market,
        }
    }
}

/// File-based persistence: one JSON file. Save after state changes; load on startup.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    path: std::path::PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Save state to file. Overwrites existing file.
    pub fn save(&self, market: &Market) -> SimResult<()> {
        let json = serde_json::to_string_pretty(&PersistedRun::new(market.clone()))?;
        std::fs::write(&self.path, json)?;
        info!("run saved path={} day={}", self.path.display(), market.day());
        Ok(())
    }

    /// Load state from file. Returns None if the file does not exist.
    pub fn load(&self) -> SimResult<Option<PersistedRun>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let run: PersistedRun = serde_json::from_str(&data)?;
        info!("run loaded path={} day={}", self.path.display(), run.saved_at_day);
        Ok(Some(run))
    }
}
