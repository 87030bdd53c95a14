//! Queue client contract.
//!
//! The external batch scheduler is reached only through this trait: submit a
//! script, list what is currently queued for a managed root, cancel by id.
//! Alternate schedulers plug in here without touching reconciliation logic.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::JobDirResult;

/// One live queue entry belonging to a managed root, re-derived on every
/// listing and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Opaque scheduler-assigned id.
    pub id: String,
    /// File name of the submitted script, e.g. `T_3.sh`.
    pub script: String,
}

/// Command-invocation contract for an external batch scheduler.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Submit a script, returning the scheduler's opaque queue id.
    ///
    /// `options` are extra flag/value pairs appended to the submission
    /// command; a pair with an empty value is passed as a bare flag.
    async fn submit(&self, script: &Path, options: &[(String, String)]) -> JobDirResult<String>;

    /// List queue entries that belong to `root`.
    ///
    /// Listing output is not inherently scoped to one managed directory, so
    /// implementations must keep only entries whose script exists under
    /// `root` and whose output path resolves into a directory named like
    /// `root` itself.
    async fn list_running(&self, root: &Path) -> JobDirResult<Vec<QueueEntry>>;

    /// Cancel a queued entry by id. Fire-and-forget, output discarded.
    async fn cancel(&self, queue_id: &str) -> JobDirResult<()>;
}
