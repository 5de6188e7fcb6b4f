use dashmap::mapref::entry::Entry;
use tracing::{info, warn};

use super::{Engine, EngineError};
use crate::limits::MAX_GRID_LIST;
use crate::model::*;
use crate::observability;

impl Engine {
    /// Live reservations for `date`. Reads `by_date` and then `reservations`,
    /// never both at once.
    pub(super) fn live_count(&self, date: Day) -> u32 {
        let ids: Vec<_> = match self.by_date.get(&date) {
            Some(ids) => ids.iter().copied().collect(),
            None => return 0,
        };
        let live = ids
            .iter()
            .filter(|id| self.reservations.get(id).is_some_and(|r| r.holds_slot()))
            .count();
        u32::try_from(live).unwrap_or(u32::MAX)
    }

    pub fn get_grid_date(&self, date: Day) -> Option<GridDate> {
        self.grid_dates.get(&date).map(|g| g.value().clone())
    }

    /// The record for `date`, inserting a fresh zero-count one if absent.
    pub async fn find_or_create_grid_date(&self, date: Day) -> Result<GridDate, EngineError> {
        let now = self.now();
        let _gate = self.commit_gate.read().await;
        let created = match self.grid_dates.entry(date) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let mut grid = GridDate::new(date, now);
                grid.revision = 1;
                slot.insert(grid.clone());
                grid
            }
        };
        if let Err(e) = self.commit(Event::GridDateUpdated { grid: created.clone() }).await {
            self.grid_dates
                .remove_if(&date, |_, g| g.revision == created.revision);
            return Err(e);
        }
        Ok(created)
    }

    /// Recount live reservations for `date` while holding its grid entry.
    /// The date is active exactly while the count is positive.
    pub async fn refresh_count(&self, date: Day) -> Result<GridDate, EngineError> {
        let now = self.now();
        let _gate = self.commit_gate.read().await;
        let (previous, updated) = {
            let mut grid = self
                .grid_dates
                .entry(date)
                .or_insert_with(|| GridDate::new(date, now));
            let count = self.live_count(date);
            let active = count > 0;
            if grid.revision > 0 && grid.total_reservations == count && grid.is_active == active {
                return Ok(grid.clone());
            }
            let previous = grid.clone();
            grid.total_reservations = count;
            grid.is_active = active;
            grid.updated_at = now;
            grid.revision += 1;
            (previous, grid.clone())
        };
        if let Err(e) = self.commit(Event::GridDateUpdated { grid: updated.clone() }).await {
            self.restore_grid(previous, updated.revision);
            return Err(e);
        }
        Ok(updated)
    }

    /// Put back `previous` unless someone has written past `failed_revision`.
    /// A record that was never persisted is dropped instead.
    fn restore_grid(&self, previous: GridDate, failed_revision: u64) {
        if previous.revision == 0 {
            self.grid_dates
                .remove_if(&previous.date, |_, g| g.revision == failed_revision);
        } else if let Some(mut grid) = self.grid_dates.get_mut(&previous.date)
            && grid.revision == failed_revision
        {
            *grid = previous;
        }
    }

    /// Grid counts are derived data; a failed refresh must not fail the
    /// booking mutation that triggered it.
    pub(super) async fn refresh_grid_logged(&self, date: Day) {
        if let Err(e) = self.refresh_count(date).await {
            warn!(%date, "grid refresh failed: {e}");
        }
    }

    /// Active dates, most recent first. `limit` is clamped to [`MAX_GRID_LIST`].
    pub fn list_active_grid_dates(&self, limit: usize) -> Vec<GridDate> {
        let mut active: Vec<GridDate> = self
            .grid_dates
            .iter()
            .filter(|g| g.is_active)
            .map(|g| g.value().clone())
            .collect();
        active.sort_by(|a, b| b.date.cmp(&a.date));
        active.truncate(limit.min(MAX_GRID_LIST));
        active
    }

    /// Deactivate active dates whose stored count is zero, after confirming
    /// the live count is still zero. Privileged. Returns the deactivated dates.
    pub async fn cleanup_empty_grids(&self, actor: &Principal) -> Result<Vec<Day>, EngineError> {
        self.require_privileged(actor, "only privileged users may clean up grid dates")?;
        Ok(self.sweep_empty_grids().await)
    }

    /// [`Engine::cleanup_empty_grids`] for the scheduled sweep.
    pub async fn sweep_empty_grids(&self) -> Vec<Day> {
        let mut candidates: Vec<Day> = self
            .grid_dates
            .iter()
            .filter(|g| g.is_active && g.total_reservations == 0)
            .map(|g| g.date)
            .collect();
        candidates.sort();

        let mut deactivated = Vec::new();
        for date in candidates {
            match self.deactivate_if_empty(date).await {
                Ok(true) => deactivated.push(date),
                Ok(false) => {}
                Err(e) => {
                    warn!(%date, "grid cleanup failed: {e}");
                    metrics::counter!(observability::SWEEP_FAILURES_TOTAL, "sweep" => "grid").increment(1);
                }
            }
        }
        if !deactivated.is_empty() {
            metrics::counter!(observability::GRID_DEACTIVATIONS_TOTAL).increment(deactivated.len() as u64);
            info!(count = deactivated.len(), "deactivated empty grid dates");
        }
        deactivated
    }

    async fn deactivate_if_empty(&self, date: Day) -> Result<bool, EngineError> {
        let now = self.now();
        let _gate = self.commit_gate.read().await;
        let (previous, updated) = {
            let Some(mut grid) = self.grid_dates.get_mut(&date) else {
                return Ok(false);
            };
            if !grid.is_active {
                return Ok(false);
            }
            // A booking may have landed since the candidates were listed.
            let count = self.live_count(date);
            if count == grid.total_reservations && count > 0 {
                return Ok(false);
            }
            let previous = grid.clone();
            grid.total_reservations = count;
            grid.is_active = count > 0;
            grid.updated_at = now;
            grid.revision += 1;
            (previous, grid.clone())
        };
        let deactivated = !updated.is_active;
        if let Err(e) = self.commit(Event::GridDateUpdated { grid: updated.clone() }).await {
            self.restore_grid(previous, updated.revision);
            return Err(e);
        }
        Ok(deactivated)
    }
}
