use ulid::Ulid;

use crate::model::Ms;

#[derive(Debug)]
pub enum SchedulerError {
    /// Unknown item or reservation id.
    NotFound(Ulid),
    /// Item is retired from the pool and cannot take new reservations.
    Retired(Ulid),
    /// Someone already holds this item for an overlapping range.
    /// Expected and user-facing; never retried automatically.
    Conflict {
        item_id: Ulid,
        reservation_id: Ulid,
    },
    /// Transfer referencing a holder/slot with nothing to move.
    NothingToTransfer {
        holder: String,
        task_id: String,
    },
    /// Malformed range, rejected before any ledger access.
    InvalidInterval {
        start: Ms,
        end: Ms,
    },
    LimitExceeded(&'static str),
    JournalError(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::NotFound(id) => write!(f, "not found: {id}"),
            SchedulerError::Retired(id) => write!(f, "item retired: {id}"),
            SchedulerError::Conflict {
                item_id,
                reservation_id,
            } => write!(
                f,
                "item {item_id} already reserved for an overlapping range (reservation {reservation_id})"
            ),
            SchedulerError::NothingToTransfer { holder, task_id } => {
                write!(f, "nothing to transfer for holder {holder} on task {task_id}")
            }
            SchedulerError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            SchedulerError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            SchedulerError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for SchedulerError {}
