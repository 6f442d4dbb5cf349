//! kitbook — an equipment reservation scheduler.
//!
//! An append-only ledger of equipment mutations (register/reserve/release/
//! transfer/retire) behind a concurrent in-memory catalog, exposed over a
//! newline-delimited JSON protocol. Reservations are exclusive half-open
//! time ranges; the conflict detector is the single authority that keeps
//! them from overlapping.

pub mod journal;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod scheduler;
pub mod wire;
