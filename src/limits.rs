use crate::model::Ms;

pub const MAX_ITEMS: usize = 10_000;
pub const MAX_RESERVATIONS_PER_ITEM: usize = 50_000;

/// Largest reserve/replace batch — a kit is one item per category, so this
/// is generous headroom, not a real kit size.
pub const MAX_BATCH_SIZE: usize = 64;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_SERIAL_LEN: usize = 128;
pub const MAX_HOLDER_LEN: usize = 128;
pub const MAX_TASK_ID_LEN: usize = 128;
pub const MAX_TASK_TITLE_LEN: usize = 512;

pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single reservation may span multi-day tasks, but not months.
pub const MAX_RANGE_DURATION_MS: Ms = 90 * 24 * 3_600_000;

/// Widest availability / free-window query.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
