use std::collections::BTreeMap;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{free_windows, item_is_free};
use super::conflict::{now_ms, validate_range};
use super::{Scheduler, SchedulerError};

impl Scheduler {
    /// Free items of a category for a requested range, in catalog
    /// registration order. Empty is a normal answer, not an error.
    ///
    /// `exclude_reservation` lets a caller re-check an item whose
    /// reservation they already hold (and intend to move or replace).
    pub async fn available(
        &self,
        category: Category,
        range: TimeRange,
        exclude_reservation: Option<Ulid>,
    ) -> Result<Vec<EquipmentItem>, SchedulerError> {
        validate_range(&range)?;
        if range.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(SchedulerError::LimitExceeded("query window too wide"));
        }

        let exclude: Vec<Ulid> = exclude_reservation.into_iter().collect();
        let now = now_ms();
        let mut free = Vec::new();
        for id in self.sorted_item_ids() {
            let Some(state) = self.get_item(&id) else { continue };
            let guard = state.read().await;
            if !guard.item.active || guard.item.category != category {
                continue;
            }
            if item_is_free(&guard, &range, now, &exclude) {
                free.push(guard.item.clone());
            }
        }
        Ok(free)
    }

    /// Whole catalog (or one category), registration order, retired included.
    pub async fn list_items(&self, category: Option<Category>) -> Vec<EquipmentItem> {
        let mut items = Vec::new();
        for id in self.sorted_item_ids() {
            let Some(state) = self.get_item(&id) else { continue };
            let guard = state.read().await;
            if category.is_none_or(|c| guard.item.category == c) {
                items.push(guard.item.clone());
            }
        }
        items
    }

    pub async fn reservations_for_item(
        &self,
        item_id: Ulid,
    ) -> Result<Vec<Reservation>, SchedulerError> {
        let state = self
            .get_item(&item_id)
            .ok_or(SchedulerError::NotFound(item_id))?;
        let guard = state.read().await;
        Ok(guard.reservations.clone())
    }

    /// Free gaps on one item within a query window.
    pub async fn item_free_windows(
        &self,
        item_id: Ulid,
        range: TimeRange,
    ) -> Result<Vec<TimeRange>, SchedulerError> {
        validate_range(&range)?;
        if range.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(SchedulerError::LimitExceeded("query window too wide"));
        }
        let state = self
            .get_item(&item_id)
            .ok_or(SchedulerError::NotFound(item_id))?;
        let guard = state.read().await;
        Ok(free_windows(&guard, &range, now_ms()))
    }

    /// The task/shift projection: who currently holds what for this task,
    /// split by shift. Derived fresh from the ledger on every call — never
    /// cached here, so it cannot drift.
    ///
    /// Matching keys on the origin's task id alone (titles are display-only).
    /// Items within a shift come out in catalog registration order; holders
    /// come out sorted (BTreeMap), so the projection is deterministic.
    pub async fn holder_view(&self, task_id: &str) -> BTreeMap<String, ShiftAssignments> {
        let now = now_ms();
        let mut view: BTreeMap<String, ShiftAssignments> = BTreeMap::new();
        for id in self.sorted_item_ids() {
            let Some(state) = self.get_item(&id) else { continue };
            let guard = state.read().await;
            for r in guard.non_ended(now) {
                if r.origin.task_id != task_id {
                    continue;
                }
                let row = view.entry(r.holder.clone()).or_default();
                let shelf = match r.origin.shift {
                    ShiftKind::Morning => &mut row.morning,
                    ShiftKind::Afternoon => &mut row.afternoon,
                };
                // Multi-day tasks can hold one item across several ranges
                // for the same shift; list the item once.
                if !shelf.iter().any(|i| i.id == guard.item.id) {
                    shelf.push(guard.item.clone());
                }
            }
        }
        view
    }
}
