use ulid::Ulid;

use crate::model::{ItemState, Ms, TimeRange};

use super::SchedulerError;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Reject malformed or absurd ranges before any ledger access.
pub(crate) fn validate_range(range: &TimeRange) -> Result<(), SchedulerError> {
    use crate::limits::*;
    if range.start >= range.end {
        return Err(SchedulerError::InvalidInterval {
            start: range.start,
            end: range.end,
        });
    }
    if range.start < MIN_VALID_TIMESTAMP_MS || range.end > MAX_VALID_TIMESTAMP_MS {
        return Err(SchedulerError::LimitExceeded("timestamp out of range"));
    }
    if range.duration_ms() > MAX_RANGE_DURATION_MS {
        return Err(SchedulerError::LimitExceeded("range too wide"));
    }
    Ok(())
}

/// The single double-booking authority for the write path: fails if any
/// non-ended reservation on the item overlaps `range`.
///
/// `exclude` carries reservation ids the caller is about to remove (or is
/// re-checking on its own behalf) — replace_kit validates its new kit with
/// the outgoing kit excluded, so validation happens before any journal write.
pub(crate) fn check_no_conflict(
    state: &ItemState,
    range: &TimeRange,
    now: Ms,
    exclude: &[Ulid],
) -> Result<(), SchedulerError> {
    for reservation in state.overlapping(range) {
        if reservation.range.ended_by(now) {
            continue;
        }
        if exclude.contains(&reservation.id) {
            continue;
        }
        return Err(SchedulerError::Conflict {
            item_id: state.item.id,
            reservation_id: reservation.id,
        });
    }
    Ok(())
}
