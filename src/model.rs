use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Ms,
    pub end: Ms,
}

impl TimeRange {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// The one overlap predicate every conflict check routes through.
    /// Half-open semantics: back-to-back ranges do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// A reservation with `end <= now` has ended and no longer
    /// participates in conflict checks or projections.
    pub fn ended_by(&self, now: Ms) -> bool {
        self.end <= now
    }
}

/// Fixed closed set of equipment categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Camera,
    Lens,
    Adapter,
    StorageCard,
}

/// One of the two daily work windows a task may request equipment for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftKind {
    Morning,
    Afternoon,
}

/// Why a reservation exists: the (task, shift) slot it serves.
///
/// `task_id` is opaque to the scheduler — stored and returned verbatim,
/// never validated against the task collaborator. `task_title` is carried
/// for display only; all matching keys on `task_id` + `shift`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub task_id: String,
    pub task_title: String,
    pub shift: ShiftKind,
}

impl Origin {
    /// Structural slot equality: task id + shift, never title text.
    pub fn same_slot(&self, other: &Origin) -> bool {
        self.task_id == other.task_id && self.shift == other.shift
    }
}

/// A physical item in the pool. Reference data owned by the inventory
/// collaborator; the scheduler only reads it.
///
/// Ids are ulids from the scheduler's monotonic mint, so ascending id order
/// is catalog insertion order even for same-millisecond registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentItem {
    pub id: Ulid,
    pub category: Category,
    pub name: String,
    pub serial: Option<String>,
    pub active: bool,
}

/// One ledger record: an item held by a person for a range, on behalf of a
/// task/shift slot. Holder is an opaque directory id and is never empty —
/// "unassigned" is the absence of a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub item_id: Ulid,
    pub holder: String,
    pub range: TimeRange,
    pub origin: Origin,
}

/// Per-item ledger shard: the item plus its reservations sorted by start.
#[derive(Debug, Clone)]
pub struct ItemState {
    pub item: EquipmentItem,
    /// Sorted by `range.start`.
    pub reservations: Vec<Reservation>,
}

impl ItemState {
    pub fn new(item: EquipmentItem) -> Self {
        Self {
            item,
            reservations: Vec::new(),
        }
    }

    /// Insert preserving sort order by range.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.range.start, |r| r.range.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get_reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Reservations whose range overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.end > query.start)
    }

    /// Reservations that have not yet ended at `now`.
    pub fn non_ended(&self, now: Ms) -> impl Iterator<Item = &Reservation> {
        self.reservations
            .iter()
            .filter(move |r| !r.range.ended_by(now))
    }
}

/// Journal record format — flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    ItemRegistered {
        id: Ulid,
        category: Category,
        name: String,
        serial: Option<String>,
    },
    ItemUpdated {
        id: Ulid,
        name: String,
        serial: Option<String>,
    },
    ItemRetired {
        id: Ulid,
    },
    Reserved {
        id: Ulid,
        item_id: Ulid,
        holder: String,
        range: TimeRange,
        origin: Origin,
    },
    Released {
        id: Ulid,
        item_id: Ulid,
    },
    Transferred {
        id: Ulid,
        item_id: Ulid,
        to_holder: String,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Equipment grouped by shift for one holder — the task/shift projection row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftAssignments {
    pub morning: Vec<EquipmentItem>,
    pub afternoon: Vec<EquipmentItem>,
}
