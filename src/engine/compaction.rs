use tokio::sync::oneshot;
use tracing::info;

use super::{Engine, EngineError, WalCommand};
use crate::model::Event;
use crate::observability;

impl Engine {
    /// Rewrite the WAL as one snapshot event per live entity.
    ///
    /// Holds the commit gate exclusively, so no mutation can sit between its
    /// in-memory write and its append while the snapshot is taken.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut events = Vec::with_capacity(
            self.resources.len() + self.reservations.len() + self.grid_dates.len() + self.reports.len(),
        );
        let mut resources: Vec<_> = self.resources.iter().map(|r| r.value().clone()).collect();
        resources.sort_by_key(|r| r.position);
        events.extend(resources.into_iter().map(|resource| Event::ResourceCreated { resource }));

        let mut reservations: Vec<_> = self.reservations.iter().map(|r| r.value().clone()).collect();
        reservations.sort_by_key(|r| (r.date, r.id));
        events.extend(
            reservations
                .into_iter()
                .map(|reservation| Event::ReservationBooked { reservation }),
        );

        let mut grids: Vec<_> = self.grid_dates.iter().map(|g| g.value().clone()).collect();
        grids.sort_by_key(|g| g.date);
        events.extend(grids.into_iter().map(|grid| Event::GridDateUpdated { grid }));

        let mut reports: Vec<_> = self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by_key(|r| (r.start, r.end));
        events.extend(reports.into_iter().map(|report| Event::ReportStored {
            report: Box::new(report),
        }));

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = count, "compacted WAL");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
