use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_range};
use super::{JournalCommand, Scheduler, SchedulerError, apply_to_item};

fn validate_holder(holder: &str) -> Result<(), SchedulerError> {
    if holder.is_empty() {
        return Err(SchedulerError::LimitExceeded("holder must not be empty"));
    }
    if holder.len() > MAX_HOLDER_LEN {
        return Err(SchedulerError::LimitExceeded("holder id too long"));
    }
    Ok(())
}

fn validate_origin(origin: &Origin) -> Result<(), SchedulerError> {
    if origin.task_id.is_empty() {
        return Err(SchedulerError::LimitExceeded("task id must not be empty"));
    }
    if origin.task_id.len() > MAX_TASK_ID_LEN {
        return Err(SchedulerError::LimitExceeded("task id too long"));
    }
    if origin.task_title.len() > MAX_TASK_TITLE_LEN {
        return Err(SchedulerError::LimitExceeded("task title too long"));
    }
    Ok(())
}

fn validate_batch(item_ids: &[Ulid]) -> Result<(), SchedulerError> {
    if item_ids.len() > MAX_BATCH_SIZE {
        return Err(SchedulerError::LimitExceeded("batch too large"));
    }
    let mut sorted = item_ids.to_vec();
    sorted.sort();
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(SchedulerError::LimitExceeded("duplicate item in batch"));
    }
    Ok(())
}

impl Scheduler {
    // ── Catalog maintenance (inventory collaborator's inbound calls) ──

    pub async fn register_item(
        &self,
        category: Category,
        name: String,
        serial: Option<String>,
    ) -> Result<EquipmentItem, SchedulerError> {
        if self.items.len() >= MAX_ITEMS {
            return Err(SchedulerError::LimitExceeded("too many items"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(SchedulerError::LimitExceeded("bad item name length"));
        }
        if let Some(ref s) = serial
            && s.len() > MAX_SERIAL_LEN
        {
            return Err(SchedulerError::LimitExceeded("serial too long"));
        }

        let id = self.mint_item_id();
        let event = LedgerEvent::ItemRegistered {
            id,
            category,
            name: name.clone(),
            serial: serial.clone(),
        };
        self.journal_append(std::slice::from_ref(&event)).await?;
        let item = EquipmentItem {
            id,
            category,
            name,
            serial,
            active: true,
        };
        self.items
            .insert(id, Arc::new(RwLock::new(ItemState::new(item.clone()))));
        self.notify.send(id, &event);
        Ok(item)
    }

    pub async fn update_item(
        &self,
        id: Ulid,
        name: String,
        serial: Option<String>,
    ) -> Result<(), SchedulerError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(SchedulerError::LimitExceeded("bad item name length"));
        }
        let state = self.get_item(&id).ok_or(SchedulerError::NotFound(id))?;
        let mut guard = state.write().await;
        let event = LedgerEvent::ItemUpdated { id, name, serial };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Retired items keep their reservation history but never show up as
    /// available and take no new reservations.
    pub async fn retire_item(&self, id: Ulid) -> Result<(), SchedulerError> {
        let state = self.get_item(&id).ok_or(SchedulerError::NotFound(id))?;
        let mut guard = state.write().await;
        if !guard.item.active {
            return Err(SchedulerError::Retired(id));
        }
        let event = LedgerEvent::ItemRetired { id };
        self.persist_and_apply(id, &mut guard, &event).await?;
        // Per-item subscribers get the retirement event, then the channel
        // closes; later events (reaper prunes) still reach the firehose.
        self.notify.remove(&id);
        Ok(())
    }

    // ── Allocation coordinator ────────────────────────────────────

    /// Atomically reserve a kit: every item for the same holder/range/origin,
    /// or nothing. Availability is re-validated here under the write locks,
    /// not trusted from an earlier query — that closes the check-then-act gap
    /// between a caller reading availability and committing.
    pub async fn reserve(
        &self,
        item_ids: &[Ulid],
        holder: &str,
        range: TimeRange,
        origin: &Origin,
    ) -> Result<Vec<Reservation>, SchedulerError> {
        validate_range(&range)?;
        validate_holder(holder)?;
        validate_origin(origin)?;
        validate_batch(item_ids)?;
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut guards = self.lock_items_write(item_ids).await?;
        let index: HashMap<Ulid, usize> = guards
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (*id, i))
            .collect();

        // Phase 1: validate every item against current state.
        let now = now_ms();
        for (id, guard) in &guards {
            if !guard.item.active {
                return Err(SchedulerError::Retired(*id));
            }
            if guard.reservations.len() >= MAX_RESERVATIONS_PER_ITEM {
                return Err(SchedulerError::LimitExceeded("too many reservations on item"));
            }
            check_no_conflict(guard, &range, now, &[])?;
        }

        // Phase 2: all validated — journal the whole kit as one entry, so a
        // crash can never leave a durable partial kit, then apply.
        let mut events = Vec::with_capacity(item_ids.len());
        let mut created = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let id = Ulid::new();
            events.push(LedgerEvent::Reserved {
                id,
                item_id: *item_id,
                holder: holder.to_string(),
                range,
                origin: origin.clone(),
            });
            created.push(Reservation {
                id,
                item_id: *item_id,
                holder: holder.to_string(),
                range,
                origin: origin.clone(),
            });
        }
        self.journal_append(&events).await?;
        for (event, item_id) in events.iter().zip(item_ids) {
            let guard = &mut guards[index[item_id]].1;
            apply_to_item(guard, event, &self.reservation_to_item);
            self.notify.send(*item_id, event);
        }

        Ok(created)
    }

    /// Release everything the holder has for this task/shift slot.
    /// Idempotent: nothing matching returns 0, not an error.
    pub async fn release(&self, holder: &str, origin: &Origin) -> Result<usize, SchedulerError> {
        validate_holder(holder)?;
        validate_origin(origin)?;

        let mut guards = self.lock_all_write().await;
        let now = now_ms();
        let mut events: Vec<(usize, LedgerEvent)> = Vec::new();
        for (idx, (item_id, guard)) in guards.iter().enumerate() {
            for r in guard.non_ended(now) {
                if r.holder == holder && r.origin.same_slot(origin) {
                    events.push((idx, LedgerEvent::Released { id: r.id, item_id: *item_id }));
                }
            }
        }
        if events.is_empty() {
            return Ok(0);
        }

        let batch: Vec<LedgerEvent> = events.iter().map(|(_, e)| e.clone()).collect();
        self.journal_append(&batch).await?;
        for (idx, event) in &events {
            let (item_id, guard) = &mut guards[*idx];
            apply_to_item(guard, event, &self.reservation_to_item);
            self.notify.send(*item_id, event);
        }
        Ok(events.len())
    }

    /// Move every reservation matching (from_holder, slot) to to_holder,
    /// preserving item, range, and origin — the "assignee replaced, new
    /// assignee inherits the equipment" path. Rejected atomically if the
    /// target would end up double-holding any of the items.
    pub async fn transfer(
        &self,
        from_holder: &str,
        to_holder: &str,
        origin: &Origin,
    ) -> Result<Vec<Reservation>, SchedulerError> {
        validate_holder(from_holder)?;
        validate_holder(to_holder)?;
        validate_origin(origin)?;

        let mut guards = self.lock_all_write().await;
        let now = now_ms();

        let mut moves: Vec<(usize, Reservation)> = Vec::new();
        for (idx, (_, guard)) in guards.iter().enumerate() {
            for r in guard.non_ended(now) {
                if r.holder == from_holder && r.origin.same_slot(origin) {
                    moves.push((idx, r.clone()));
                }
            }
        }
        if moves.is_empty() {
            return Err(SchedulerError::NothingToTransfer {
                holder: from_holder.to_string(),
                task_id: origin.task_id.clone(),
            });
        }

        // Target must not already hold the same item for an overlapping
        // range under any origin — a person cannot hold two of the same
        // borrowed item at once.
        for (idx, r) in &moves {
            let guard = &guards[*idx].1;
            for other in guard.overlapping(&r.range) {
                if other.id != r.id && !other.range.ended_by(now) && other.holder == to_holder {
                    return Err(SchedulerError::Conflict {
                        item_id: r.item_id,
                        reservation_id: other.id,
                    });
                }
            }
        }

        // All moves journal as one entry, so replay never sees a slot whose
        // reservations are split between the two holders.
        let events: Vec<LedgerEvent> = moves
            .iter()
            .map(|(_, r)| LedgerEvent::Transferred {
                id: r.id,
                item_id: r.item_id,
                to_holder: to_holder.to_string(),
            })
            .collect();
        self.journal_append(&events).await?;

        let mut moved = Vec::with_capacity(moves.len());
        for ((idx, r), event) in moves.into_iter().zip(&events) {
            let (item_id, guard) = &mut guards[idx];
            apply_to_item(guard, event, &self.reservation_to_item);
            self.notify.send(*item_id, event);
            moved.push(Reservation {
                holder: to_holder.to_string(),
                ..r
            });
        }
        Ok(moved)
    }

    /// Ad-hoc handoff of a single reservation to another person, independent
    /// of task-assignee changes.
    pub async fn transfer_reservation(
        &self,
        reservation_id: Ulid,
        to_holder: &str,
    ) -> Result<Reservation, SchedulerError> {
        validate_holder(to_holder)?;
        let item_id = self
            .item_for_reservation(&reservation_id)
            .ok_or(SchedulerError::NotFound(reservation_id))?;
        let state = self
            .get_item(&item_id)
            .ok_or(SchedulerError::NotFound(item_id))?;
        let mut guard = state.write_owned().await;

        let now = now_ms();
        let reservation = guard
            .get_reservation(reservation_id)
            .ok_or(SchedulerError::NotFound(reservation_id))?
            .clone();
        if reservation.range.ended_by(now) {
            // Ended reservations have nothing left to hand over.
            return Err(SchedulerError::NotFound(reservation_id));
        }
        for other in guard.overlapping(&reservation.range) {
            if other.id != reservation_id
                && !other.range.ended_by(now)
                && other.holder == to_holder
            {
                return Err(SchedulerError::Conflict {
                    item_id,
                    reservation_id: other.id,
                });
            }
        }

        let event = LedgerEvent::Transferred {
            id: reservation_id,
            item_id,
            to_holder: to_holder.to_string(),
        };
        self.persist_and_apply(item_id, &mut guard, &event).await?;
        Ok(Reservation {
            holder: to_holder.to_string(),
            ..reservation
        })
    }

    /// Atomically swap a holder's kit for a slot: release whatever they hold
    /// for (holder, slot) and reserve `new_items` for `range`, inside one
    /// critical section. The new kit is validated with the outgoing
    /// reservations excluded *before* anything is journaled, so a conflict
    /// leaves the old kit untouched.
    pub async fn replace_kit(
        &self,
        holder: &str,
        origin: &Origin,
        new_items: &[Ulid],
        range: TimeRange,
    ) -> Result<Vec<Reservation>, SchedulerError> {
        validate_range(&range)?;
        validate_holder(holder)?;
        validate_origin(origin)?;
        validate_batch(new_items)?;

        let mut guards = self.lock_all_write().await;
        let index: HashMap<Ulid, usize> = guards
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (*id, i))
            .collect();
        for item_id in new_items {
            if !index.contains_key(item_id) {
                return Err(SchedulerError::NotFound(*item_id));
            }
        }

        let now = now_ms();

        // Outgoing kit: everything the holder has for this slot.
        let mut outgoing: Vec<(usize, Ulid, Ulid)> = Vec::new(); // (guard idx, reservation, item)
        for (idx, (item_id, guard)) in guards.iter().enumerate() {
            for r in guard.non_ended(now) {
                if r.holder == holder && r.origin.same_slot(origin) {
                    outgoing.push((idx, r.id, *item_id));
                }
            }
        }
        let excluded: Vec<Ulid> = outgoing.iter().map(|(_, id, _)| *id).collect();

        // Phase 1: validate the incoming kit as if the outgoing one is gone.
        for item_id in new_items {
            let (_, guard) = &guards[index[item_id]];
            if !guard.item.active {
                return Err(SchedulerError::Retired(*item_id));
            }
            if guard.reservations.len() >= MAX_RESERVATIONS_PER_ITEM {
                return Err(SchedulerError::LimitExceeded("too many reservations on item"));
            }
            check_no_conflict(guard, &range, now, &excluded)?;
        }

        // Phase 2: commit. Releases and the new kit go into one journal
        // entry — replay recovers either the full swap or the old kit, never
        // a holder stripped of both.
        let mut events = Vec::with_capacity(outgoing.len() + new_items.len());
        let mut targets = Vec::with_capacity(outgoing.len() + new_items.len());
        for (idx, reservation_id, item_id) in &outgoing {
            events.push(LedgerEvent::Released {
                id: *reservation_id,
                item_id: *item_id,
            });
            targets.push(*idx);
        }
        let mut created = Vec::with_capacity(new_items.len());
        for item_id in new_items {
            let id = Ulid::new();
            events.push(LedgerEvent::Reserved {
                id,
                item_id: *item_id,
                holder: holder.to_string(),
                range,
                origin: origin.clone(),
            });
            targets.push(index[item_id]);
            created.push(Reservation {
                id,
                item_id: *item_id,
                holder: holder.to_string(),
                range,
                origin: origin.clone(),
            });
        }
        self.journal_append(&events).await?;
        for (event, idx) in events.iter().zip(targets) {
            let (item_id, guard) = &mut guards[idx];
            apply_to_item(guard, event, &self.reservation_to_item);
            self.notify.send(*item_id, event);
        }
        Ok(created)
    }

    /// Remove a single reservation by id. Maintenance path (the reaper) —
    /// callers releasing a kit go through `release`.
    pub async fn drop_reservation(&self, id: Ulid) -> Result<Ulid, SchedulerError> {
        let item_id = self
            .item_for_reservation(&id)
            .ok_or(SchedulerError::NotFound(id))?;
        let state = self
            .get_item(&item_id)
            .ok_or(SchedulerError::NotFound(item_id))?;
        let mut guard = state.write_owned().await;
        if guard.get_reservation(id).is_none() {
            return Err(SchedulerError::NotFound(id));
        }
        let event = LedgerEvent::Released { id, item_id };
        self.persist_and_apply(item_id, &mut guard, &event).await?;
        Ok(item_id)
    }

    /// Reservations ended at or before `cutoff`, for the reaper to prune.
    pub fn collect_prunable(&self, cutoff: Ms) -> Vec<(Ulid, Ulid)> {
        let mut prunable = Vec::new();
        for entry in self.items.iter() {
            let state = entry.value().clone();
            if let Ok(guard) = state.try_read() {
                for r in &guard.reservations {
                    if r.range.ended_by(cutoff) {
                        prunable.push((r.id, guard.item.id));
                    }
                }
            }
        }
        prunable
    }

    /// Rewrite the journal with only the events needed to recreate the
    /// current ledger.
    pub async fn compact_journal(&self) -> Result<(), SchedulerError> {
        let mut events = Vec::new();
        for id in self.sorted_item_ids() {
            let Some(state) = self.get_item(&id) else { continue };
            let guard = state.read().await;
            events.push(LedgerEvent::ItemRegistered {
                id: guard.item.id,
                category: guard.item.category,
                name: guard.item.name.clone(),
                serial: guard.item.serial.clone(),
            });
            if !guard.item.active {
                events.push(LedgerEvent::ItemRetired { id: guard.item.id });
            }
            for r in &guard.reservations {
                events.push(LedgerEvent::Reserved {
                    id: r.id,
                    item_id: r.item_id,
                    holder: r.holder.clone(),
                    range: r.range,
                    origin: r.origin.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| SchedulerError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| SchedulerError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| SchedulerError::JournalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
