//! Write buffer shared by the storage backends.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use ctxmesh_config::StorageConfig;

use super::{StorageError, StoredRow};

/// When a [`WriteBuffer`] empties itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Flush once this many rows are pending.
    pub max_pending: usize,
    /// Flush once this long has passed since the last flush.
    pub max_age: Duration,
}

impl FlushPolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_pending: config.flush_count.max(1),
            max_age: Duration::from_millis(config.flush_interval_ms),
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

#[derive(Debug)]
struct BufferState {
    pending: Vec<(String, StoredRow)>,
    last_flush: Instant,
}

/// Rows waiting to be written, keyed by table.
#[derive(Debug)]
pub struct WriteBuffer {
    policy: FlushPolicy,
    state: Mutex<BufferState>,
}

impl WriteBuffer {
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(BufferState {
                pending: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Queue a row. Returns every pending row if a threshold is now
    /// exceeded, leaving the buffer empty.
    pub fn push(
        &self,
        table: String,
        row: StoredRow,
    ) -> Result<Option<Vec<(String, StoredRow)>>, StorageError> {
        let mut state = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        state.pending.push((table, row));
        let due = state.pending.len() >= self.policy.max_pending
            || state.last_flush.elapsed() >= self.policy.max_age;
        if !due {
            return Ok(None);
        }
        state.last_flush = Instant::now();
        Ok(Some(std::mem::take(&mut state.pending)))
    }

    /// Take every pending row regardless of thresholds.
    pub fn drain(&self) -> Result<Vec<(String, StoredRow)>, StorageError> {
        let mut state = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        state.last_flush = Instant::now();
        Ok(std::mem::take(&mut state.pending))
    }

    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }
}
