use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// What one pass of the periodic sweeps changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub expired: usize,
    pub grids_deactivated: usize,
    pub reports_purged: usize,
}

/// One pass: expire overdue reservations, deactivate empty grid dates, purge
/// reports past retention. Never fails; per-record problems are logged by
/// the engine.
pub async fn sweep_once(engine: &Engine) -> SweepSummary {
    let grace_hours = engine.settings().expiry_grace_hours;
    SweepSummary {
        expired: engine.expire_overdue(grace_hours).await,
        grids_deactivated: engine.sweep_empty_grids().await.len(),
        reports_purged: engine.purge_expired_reports().await,
    }
}

/// Run [`sweep_once`] every `interval`, forever.
pub async fn run_reaper(engine: Arc<Engine>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let summary = sweep_once(&engine).await;
        if summary == SweepSummary::default() {
            debug!("sweep: nothing to do");
        } else {
            info!(
                expired = summary.expired,
                grids_deactivated = summary.grids_deactivated,
                reports_purged = summary.reports_purged,
                "sweep finished"
            );
        }
    }
}

/// Compact the WAL whenever more than `threshold` appends have accumulated.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends <= threshold {
            continue;
        }
        if let Err(e) = engine.compact_wal().await {
            warn!(appends, "WAL compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::{GridPosition, Principal};
    use crate::notify::NotifyHub;
    use chrono::{DateTime, Local, NaiveDate, Utc};
    use mockable::Clock;
    use std::path::PathBuf;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn local(&self) -> DateTime<Local> {
            self.0.with_timezone(&Local)
        }

        fn utc(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("cubicled_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[tokio::test]
    async fn sweep_expires_then_settles() {
        let path = test_wal_path("sweep.wal");
        let admin = Principal::new("admin", "admin@example.com").privileged();
        let user = Principal::new("u1", "u1@example.com");

        // Book on the day itself, then sweep two days later.
        let booking_engine = Engine::new(path.clone(), Settings::default(), Arc::new(NotifyHub::new()))
            .unwrap()
            .with_clock(Arc::new(FixedClock(at(2024, 5, 6, 8))));
        let resource = booking_engine
            .create_resource(GridPosition::new('A', 1, 1), "A1", &admin)
            .await
            .unwrap();
        booking_engine
            .book(resource.id, NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(), &user)
            .await
            .unwrap();
        drop(booking_engine);

        let engine = Engine::new(path, Settings::default(), Arc::new(NotifyHub::new()))
            .unwrap()
            .with_clock(Arc::new(FixedClock(at(2024, 5, 8, 8))));
        let first = sweep_once(&engine).await;
        assert_eq!(first.expired, 1);
        assert_eq!(sweep_once(&engine).await, SweepSummary::default());
    }
}
