use std::time::Instant;

use chrono::{Days, Duration};
use tracing::{info, warn};
use ulid::Ulid;

use super::{window, Engine, EngineError};
use crate::aggregate::{aggregate, AggregationInput};
use crate::model::*;
use crate::observability;
use crate::report::UtilizationReport;

/// CRC32 over everything a report for `[start, end]` is computed from.
/// Any booking, transition or status change in range changes it, and so does
/// the prior-period report the trend is measured against appearing or being
/// regenerated.
fn fingerprint(
    start: Day,
    end: Day,
    resources: &[Resource],
    reservations: &[Reservation],
    prior: Option<&UtilizationReport>,
) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(start.to_string().as_bytes());
    hasher.update(end.to_string().as_bytes());
    for r in resources {
        hasher.update(&r.id.to_bytes());
        hasher.update(r.code.as_bytes());
        hasher.update(r.operational_status.as_str().as_bytes());
        hasher.update(&r.revision.to_le_bytes());
    }
    for r in reservations {
        hasher.update(&r.id.to_bytes());
        hasher.update(r.status.as_str().as_bytes());
        hasher.update(&r.revision.to_le_bytes());
    }
    match prior {
        Some(p) => {
            hasher.update(&[1u8]);
            hasher.update(&p.id.to_bytes());
            hasher.update(&p.revision.to_le_bytes());
        }
        None => hasher.update(&[0u8]),
    }
    hasher.finalize()
}

impl Engine {
    /// Build (or reuse) the utilization report for `[start, end]`.
    ///
    /// If the stored report for the range was built from identical data and
    /// has not expired, it is returned as is and nothing is written.
    /// Otherwise the report is recomputed and stored under the range's id
    /// with the next revision.
    pub async fn generate_report(&self, start: Day, end: Day) -> Result<UtilizationReport, EngineError> {
        window::validate_report_range(start, end)?;
        let started = Instant::now();
        let now = self.now();

        let resources = self.list_resources();
        let reservations = self.reservations_in_range(start, end);
        let prior = self.prior_report(start, end);
        let fingerprint = fingerprint(start, end, &resources, &reservations, prior.as_ref());

        let previous = self
            .report_ranges
            .get(&(start, end))
            .map(|id| *id.value())
            .and_then(|id| self.reports.get(&id).map(|r| r.value().clone()));
        if let Some(previous) = &previous
            && previous.fingerprint == fingerprint
            && !previous.is_expired(now)
        {
            metrics::counter!(observability::REPORTS_REUSED_TOTAL).increment(1);
            return Ok(previous.clone());
        }

        let content = aggregate(&AggregationInput {
            start,
            end,
            resources: &resources,
            reservations: &reservations,
            prior: prior.as_ref().map(|p| &p.content.summary),
        });

        let id = *self
            .report_ranges
            .entry((start, end))
            .or_insert_with(Ulid::new)
            .value();
        let report = UtilizationReport {
            id,
            start,
            end,
            generated_at: now,
            expires_at: now + Duration::days(i64::from(self.settings.report_retention_days)),
            fingerprint,
            revision: previous.as_ref().map_or(1, |p| p.revision + 1),
            content,
        };

        {
            let _gate = self.commit_gate.read().await;
            self.reports.insert(id, report.clone());
            if let Err(e) = self
                .commit(Event::ReportStored { report: Box::new(report.clone()) })
                .await
            {
                match previous {
                    Some(previous) => {
                        self.reports.insert(id, previous);
                    }
                    None => {
                        self.reports.remove(&id);
                        self.report_ranges.remove_if(&(start, end), |_, current| *current == id);
                    }
                }
                return Err(e);
            }
        }

        metrics::counter!(observability::REPORTS_GENERATED_TOTAL).increment(1);
        metrics::histogram!(observability::REPORT_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!(
            report = %id,
            %start,
            %end,
            revision = report.revision,
            bookings = report.content.summary.total_bookings,
            "generated utilization report"
        );
        Ok(report)
    }

    /// The stored report covering the equal-length period that ends the day
    /// before `start`.
    fn prior_report(&self, start: Day, end: Day) -> Option<UtilizationReport> {
        let span = u64::try_from((end - start).num_days()).ok()?;
        let prior_end = start.pred_opt()?;
        let prior_start = prior_end.checked_sub_days(Days::new(span))?;
        let id = *self.report_ranges.get(&(prior_start, prior_end))?.value();
        self.reports.get(&id).map(|r| r.value().clone())
    }

    pub fn get_report(&self, id: &Ulid) -> Result<UtilizationReport, EngineError> {
        self.reports
            .get(id)
            .map(|r| r.value().clone())
            .ok_or(EngineError::ReportNotFound(*id))
    }

    /// Stored reports ordered by range.
    pub fn list_reports(&self) -> Vec<UtilizationReport> {
        let mut reports: Vec<UtilizationReport> = self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by_key(|r| (r.start, r.end));
        reports
    }

    /// Drop reports past their retention horizon. Returns how many went.
    pub async fn purge_expired_reports(&self) -> usize {
        let now = self.now();
        let expired: Vec<Ulid> = self
            .reports
            .iter()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id)
            .collect();

        let mut purged = 0;
        for id in expired {
            let _gate = self.commit_gate.read().await;
            let Some((_, report)) = self.reports.remove_if(&id, |_, r| r.is_expired(now)) else {
                continue;
            };
            if let Err(e) = self.commit(Event::ReportPurged { id }).await {
                warn!(report = %id, "report purge failed: {e}");
                metrics::counter!(observability::SWEEP_FAILURES_TOTAL, "sweep" => "reports").increment(1);
                self.reports.insert(id, report);
                continue;
            }
            self.report_ranges
                .remove_if(&(report.start, report.end), |_, current| *current == id);
            purged += 1;
        }
        if purged > 0 {
            metrics::counter!(observability::REPORTS_PURGED_TOTAL).increment(purged as u64);
            info!(purged, "purged expired reports");
        }
        purged
    }
}
