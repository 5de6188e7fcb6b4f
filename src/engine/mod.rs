mod compaction;
mod error;
mod grid;
mod ledger;
mod queries;
mod registry;
mod reports;
mod window;

pub use error::EngineError;
pub use window::{validate_booking_date, validate_business_hours};

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use dashmap::DashMap;
use mockable::{Clock, DefaultClock};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::config::Settings;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::policy::{AuthorizationPolicy, PrivilegedEmailsPolicy};
use crate::report::UtilizationReport;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Blocks for one append, drains whatever else is already
/// queued, then pays for a single fsync and answers every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        flush_and_respond(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    debug!("WAL writer stopped");
}

fn flush_and_respond(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after a failed append so a half-written batch does not bleed
    // into the next one.
    let flushed = wal.flush_sync();
    let result = result.and(flushed);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, response) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = response.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => flush_and_respond(wal, vec![(event, response)]),
    }
}

/// In-memory state of one site: the resource registry, the reservation
/// ledger, the grid date index and stored reports.
///
/// Every mutation updates memory first, then goes through [`Engine::commit`]
/// (WAL append, then change-feed broadcast) and rolls memory back if the
/// append fails.
pub struct Engine {
    pub(super) resources: DashMap<Ulid, Resource>,
    pub(super) positions: DashMap<GridPosition, Ulid>,
    pub(super) codes: DashMap<String, Ulid>,
    pub(super) reservations: DashMap<Ulid, Reservation>,
    /// Live holder per (resource, date). The only booking mutual exclusion.
    pub(super) slots: DashMap<SlotKey, SlotHolder>,
    pub(super) by_date: DashMap<Day, HashSet<Ulid>>,
    pub(super) grid_dates: DashMap<Day, GridDate>,
    pub(super) reports: DashMap<Ulid, UtilizationReport>,
    pub(super) report_ranges: DashMap<(Day, Day), Ulid>,
    /// Mutations hold it shared from their in-memory write until their WAL
    /// append lands; compaction holds it exclusively. Never acquired nested.
    pub(super) commit_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) settings: Settings,
    pub(super) policy: Arc<dyn AuthorizationPolicy>,
    pub(super) clock: Arc<dyn Clock + Send + Sync>,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must be called
    /// from within a tokio runtime.
    pub fn new(wal_path: PathBuf, settings: Settings, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let policy = Arc::new(PrivilegedEmailsPolicy::new(&settings.privileged_emails));
        let engine = Self {
            resources: DashMap::new(),
            positions: DashMap::new(),
            codes: DashMap::new(),
            reservations: DashMap::new(),
            slots: DashMap::new(),
            by_date: DashMap::new(),
            grid_dates: DashMap::new(),
            reports: DashMap::new(),
            report_ranges: DashMap::new(),
            commit_gate: RwLock::new(()),
            wal_tx,
            notify,
            settings,
            policy,
            clock: Arc::new(DefaultClock),
        };

        let mut tombstones = HashSet::new();
        for event in events.iter().cloned() {
            engine.apply_replayed(event, &mut tombstones);
        }
        if !events.is_empty() {
            info!(
                events = events.len(),
                resources = engine.resources.len(),
                reservations = engine.reservations.len(),
                "replayed WAL {}",
                wal_path.display()
            );
        }
        Ok(engine)
    }

    pub fn with_policy(mut self, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply one logged snapshot. Snapshots older than what is already in
    /// memory are skipped, so records that reached the log out of order
    /// still converge on the newest revision.
    fn apply_replayed(&self, event: Event, tombstones: &mut HashSet<Ulid>) {
        match event {
            Event::ResourceCreated { resource } | Event::ResourceUpdated { resource } => {
                if let Some(existing) = self.resources.get(&resource.id)
                    && existing.revision >= resource.revision
                {
                    return;
                }
                self.positions.insert(resource.position, resource.id);
                self.codes.insert(resource.code.clone(), resource.id);
                self.resources.insert(resource.id, resource);
            }
            Event::ReservationBooked { reservation } | Event::ReservationUpdated { reservation } => {
                if tombstones.contains(&reservation.id) {
                    return;
                }
                if let Some(existing) = self.reservations.get(&reservation.id)
                    && existing.revision >= reservation.revision
                {
                    return;
                }
                let slot = reservation.slot();
                if reservation.holds_slot() {
                    self.slots.insert(slot, reservation.holder());
                } else {
                    self.slots.remove_if(&slot, |_, h| h.reservation_id == reservation.id);
                }
                self.by_date.entry(reservation.date).or_default().insert(reservation.id);
                self.reservations.insert(reservation.id, reservation);
            }
            Event::ReservationReleased { id, resource_id, date } => {
                tombstones.insert(id);
                self.reservations.remove(&id);
                self.slots
                    .remove_if(&SlotKey { resource_id, date }, |_, h| h.reservation_id == id);
                self.unindex_date(date, id);
            }
            Event::GridDateUpdated { grid } => {
                if let Some(existing) = self.grid_dates.get(&grid.date)
                    && existing.revision >= grid.revision
                {
                    return;
                }
                self.grid_dates.insert(grid.date, grid);
            }
            Event::ReportStored { report } => {
                if tombstones.contains(&report.id) {
                    return;
                }
                if let Some(existing) = self.reports.get(&report.id)
                    && existing.revision >= report.revision
                {
                    return;
                }
                self.report_ranges.insert((report.start, report.end), report.id);
                self.reports.insert(report.id, *report);
            }
            Event::ReportPurged { id } => {
                tombstones.insert(id);
                if let Some((_, report)) = self.reports.remove(&id) {
                    self.report_ranges
                        .remove_if(&(report.start, report.end), |_, current| *current == id);
                }
            }
        }
    }

    pub(super) fn unindex_date(&self, date: Day, id: Ulid) {
        if let Some(mut ids) = self.by_date.get_mut(&date) {
            ids.remove(&id);
        }
    }

    async fn wal_append(&self, event: Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Make a change durable, then broadcast it.
    pub(super) async fn commit(&self, event: Event) -> Result<(), EngineError> {
        self.wal_append(event.clone()).await?;
        self.notify.send(&event);
        Ok(())
    }

    // ── Time ─────────────────────────────────────────────

    pub(super) fn now(&self) -> Timestamp {
        self.clock.utc()
    }

    /// Wall-clock reading at the site for an instant.
    pub(super) fn site_time(&self, at: Timestamp) -> NaiveDateTime {
        at.with_timezone(&self.settings.site_offset).naive_local()
    }

    /// Current calendar date at the site.
    pub fn today(&self) -> Day {
        self.site_time(self.now()).date()
    }

    /// The instant a site calendar day begins.
    pub fn site_midnight_utc(&self, date: Day) -> Timestamp {
        let offset = Duration::seconds(i64::from(self.settings.site_offset.local_minus_utc()));
        (date.and_time(NaiveTime::MIN) - offset).and_utc()
    }
}
