//! Outcome model: what happened when a worker handled one notification.
//!
//! Every path through the processor ends in exactly one of these, so a failure
//! that is swallowed for isolation is still visible to whoever is watching.

use serde::{Deserialize, Serialize};

use super::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessOutcome {
    /// Engine succeeded and the COMPLETED record was persisted.
    Completed,

    /// The task ended FAILED and that was persisted.
    Failed { error: String },

    /// No record for this id (stale or bogus notification). Nothing written.
    UnknownTask,

    /// The record was not PENDING (duplicate delivery). Nothing written.
    Skipped { status: TaskStatus },

    /// The record could not be read or decoded. Nothing written.
    Unreadable { error: String },

    /// The FAILED write itself failed; the record may stay PROCESSING.
    Stuck { error: String },
}
