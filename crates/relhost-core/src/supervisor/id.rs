use std::sync::atomic::{AtomicU64, Ordering};

use relhost_model::WorkerKey;

/// Per-process sequence for worker ids.
static WORKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Build a worker id: `{launcher}-{key}-{seq:x}`.
///
/// Unique within the host process; two workers for the same key started one after the
/// other get different ids.
pub fn make_worker_id(launcher: &str, key: &WorkerKey) -> String {
    let seq = WORKER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{launcher}-{key}-{seq:x}")
}
