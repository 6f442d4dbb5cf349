mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{free_windows, item_is_free, merge_overlapping, subtract_ranges};
pub use conflict::now_ms;
pub use error::SchedulerError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedItemState = Arc<RwLock<ItemState>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    /// One atomic journal entry: all events of a multi-item operation, or a
    /// single event. Framed as one checksummed record so replay keeps or
    /// drops them together.
    Append {
        events: Vec<LedgerEvent>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<LedgerEvent>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group
/// commit: block for the first append, drain whatever else is immediately
/// available, then one flush_sync for the whole batch.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { events, response } => {
                let mut batch = vec![(events, response)];

                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { events, response }) => {
                            batch.push((events, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then the non-append command.
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

type PendingAppend = (Vec<LedgerEvent>, oneshot::Sender<io::Result<()>>);

fn flush_and_respond(journal: &mut Journal, batch: &mut Vec<PendingAppend>) {
    let event_count: usize = batch.iter().map(|(events, _)| events.len()).sum();
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(event_count as f64);
    let flush_start = std::time::Instant::now();

    let mut append_err: Option<io::Error> = None;
    for (events, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(events) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    let result = match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    };

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// The reservation scheduler: the single mutation surface over the ledger.
///
/// Per-item shards behind RwLocks; every write path takes the write locks
/// of the items it touches in sorted id order, validates through the
/// conflict detector, then journals and applies — so concurrent readers
/// never observe a half-committed batch.
pub struct Scheduler {
    pub items: DashMap<Ulid, SharedItemState>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → item id.
    pub(super) reservation_to_item: DashMap<Ulid, Ulid>,
    /// Monotonic id mint for registrations, so catalog order holds even when
    /// several items are registered within the same millisecond.
    pub(super) item_id_gen: std::sync::Mutex<ulid::Generator>,
}

/// Apply an event directly to an ItemState (no locking — caller holds the lock).
fn apply_to_item(state: &mut ItemState, event: &LedgerEvent, index: &DashMap<Ulid, Ulid>) {
    match event {
        LedgerEvent::Reserved {
            id,
            item_id,
            holder,
            range,
            origin,
        } => {
            state.insert_reservation(Reservation {
                id: *id,
                item_id: *item_id,
                holder: holder.clone(),
                range: *range,
                origin: origin.clone(),
            });
            index.insert(*id, *item_id);
        }
        LedgerEvent::Released { id, .. } => {
            state.remove_reservation(*id);
            index.remove(id);
        }
        LedgerEvent::Transferred { id, to_holder, .. } => {
            if let Some(r) = state.reservations.iter_mut().find(|r| r.id == *id) {
                r.holder = to_holder.clone();
            }
        }
        LedgerEvent::ItemUpdated { name, serial, .. } => {
            state.item.name = name.clone();
            state.item.serial = serial.clone();
        }
        LedgerEvent::ItemRetired { .. } => {
            state.item.active = false;
        }
        // ItemRegistered is handled at the DashMap level, not here.
        LedgerEvent::ItemRegistered { .. } => {}
    }
}

/// Extract the item id from an event (for non-registration events).
fn event_item_id(event: &LedgerEvent) -> Option<Ulid> {
    match event {
        LedgerEvent::Reserved { item_id, .. }
        | LedgerEvent::Released { item_id, .. }
        | LedgerEvent::Transferred { item_id, .. } => Some(*item_id),
        LedgerEvent::ItemUpdated { id, .. } | LedgerEvent::ItemRetired { id } => Some(*id),
        LedgerEvent::ItemRegistered { .. } => None,
    }
}

impl Scheduler {
    pub fn new(journal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let scheduler = Self {
            items: DashMap::new(),
            journal_tx,
            notify,
            reservation_to_item: DashMap::new(),
            item_id_gen: std::sync::Mutex::new(ulid::Generator::new()),
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never blocking_write here: this may run inside
        // an async context.
        for event in &events {
            match event {
                LedgerEvent::ItemRegistered {
                    id,
                    category,
                    name,
                    serial,
                } => {
                    let state = ItemState::new(EquipmentItem {
                        id: *id,
                        category: *category,
                        name: name.clone(),
                        serial: serial.clone(),
                        active: true,
                    });
                    scheduler.items.insert(*id, Arc::new(RwLock::new(state)));
                }
                other => {
                    if let Some(item_id) = event_item_id(other)
                        && let Some(entry) = scheduler.items.get(&item_id)
                    {
                        let state_arc = entry.clone();
                        let mut guard =
                            state_arc.try_write().expect("replay: uncontended write");
                        apply_to_item(&mut guard, other, &scheduler.reservation_to_item);
                    }
                }
            }
        }

        Ok(scheduler)
    }

    /// Write events to the journal as one atomic entry via the group-commit
    /// writer. A multi-item operation passes all of its events here at once —
    /// they become durable together or not at all.
    pub(super) async fn journal_append(
        &self,
        events: &[LedgerEvent],
    ) -> Result<(), SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                events: events.to_vec(),
                response: tx,
            })
            .await
            .map_err(|_| SchedulerError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| SchedulerError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| SchedulerError::JournalError(e.to_string()))
    }

    /// Mint a registration id. Monotonic within a process, so ascending id
    /// order is registration order even for same-millisecond mints; falls
    /// back to a fresh random ulid on the (astronomically rare) per-ms
    /// overflow.
    pub(super) fn mint_item_id(&self) -> Ulid {
        let mut generator = self
            .item_id_gen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        generator.generate().unwrap_or_else(|_| Ulid::new())
    }

    pub fn get_item(&self, id: &Ulid) -> Option<SharedItemState> {
        self.items.get(id).map(|e| e.value().clone())
    }

    pub fn item_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_item
            .get(reservation_id)
            .map(|e| *e.value())
    }

    /// Catalog ids in registration order (ids come from the monotonic mint,
    /// so ascending order is mint order even within one millisecond; DashMap
    /// iteration order would not be deterministic).
    pub(super) fn sorted_item_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.items.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Journal-append + apply + notify for a single-event operation.
    pub(super) async fn persist_and_apply(
        &self,
        item_id: Ulid,
        state: &mut ItemState,
        event: &LedgerEvent,
    ) -> Result<(), SchedulerError> {
        self.journal_append(std::slice::from_ref(event)).await?;
        apply_to_item(state, event, &self.reservation_to_item);
        self.notify.send(item_id, event);
        Ok(())
    }

    /// Acquire write guards for the given items in sorted id order.
    /// One consistent global order across all write paths prevents deadlock.
    pub(super) async fn lock_items_write(
        &self,
        ids: &[Ulid],
    ) -> Result<Vec<(Ulid, OwnedRwLockWriteGuard<ItemState>)>, SchedulerError> {
        let mut sorted: Vec<Ulid> = ids.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            let state = self.get_item(&id).ok_or(SchedulerError::NotFound(id))?;
            guards.push((id, state.write_owned().await));
        }
        Ok(guards)
    }

    /// Lock every item shard, in sorted order, for operations whose match
    /// set is unknown up front (release/transfer/replace).
    pub(super) async fn lock_all_write(
        &self,
    ) -> Vec<(Ulid, OwnedRwLockWriteGuard<ItemState>)> {
        let mut guards = Vec::new();
        for id in self.sorted_item_ids() {
            if let Some(state) = self.get_item(&id) {
                guards.push((id, state.write_owned().await));
            }
        }
        guards
    }
}
