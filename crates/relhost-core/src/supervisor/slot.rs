use std::sync::Arc;

use tokio::sync::watch;

use super::WorkerHandle;
use crate::error::SupervisorError;

/// Result of one creation attempt, shared by all of its waiters.
pub(crate) type Outcome = Result<Arc<WorkerHandle>, SupervisorError>;

/// Registry entry. An absent key means no worker and no attempt in flight.
pub(crate) enum Slot {
    /// A creation attempt is running; `done` turns `Some` when it finishes.
    Starting {
        generation: u64,
        release_id: String,
        done: watch::Receiver<Option<Outcome>>,
    },
    Ready(Arc<WorkerHandle>),
}

impl Slot {
    pub(crate) fn generation(&self) -> u64 {
        match self {
            Slot::Starting { generation, .. } => *generation,
            Slot::Ready(handle) => handle.generation(),
        }
    }

    pub(crate) fn release_id(&self) -> &str {
        match self {
            Slot::Starting { release_id, .. } => release_id,
            Slot::Ready(handle) => handle.release_id(),
        }
    }
}
