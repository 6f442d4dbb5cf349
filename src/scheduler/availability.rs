use ulid::Ulid;

use crate::model::{ItemState, Ms, TimeRange};

// ── Availability math (pure functions) ───────────────────────────

/// True iff no non-ended reservation on the item overlaps `range`.
///
/// `exclude` is the reservation id a caller already holds on this item and
/// is re-checking (the availability query's excludeReservationId).
pub fn item_is_free(state: &ItemState, range: &TimeRange, now: Ms, exclude: &[Ulid]) -> bool {
    state
        .overlapping(range)
        .all(|r| r.range.ended_by(now) || exclude.contains(&r.id))
}

/// Free gaps on a single item within a query window: the window minus its
/// non-ended reservations.
pub fn free_windows(state: &ItemState, query: &TimeRange, now: Ms) -> Vec<TimeRange> {
    let mut busy: Vec<TimeRange> = state
        .overlapping(query)
        .filter(|r| !r.range.ended_by(now))
        .map(|r| {
            TimeRange::new(
                r.range.start.max(query.start),
                r.range.end.min(query.end),
            )
        })
        .collect();
    busy.sort_by_key(|r| r.start);
    let busy = merge_overlapping(&busy);
    subtract_ranges(&[*query], &busy)
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_overlapping(sorted: &[TimeRange]) -> Vec<TimeRange> {
    let mut merged: Vec<TimeRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end
        {
            last.end = last.end.max(range.end);
            continue;
        }
        merged.push(range);
    }
    merged
}

/// Subtract sorted disjoint `to_remove` ranges from sorted `base` ranges.
pub fn subtract_ranges(base: &[TimeRange], to_remove: &[TimeRange]) -> Vec<TimeRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeRange::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimeRange::new(current_start, current_end));
        }
    }

    result
}
