use chrono::Weekday;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{Day, Timestamp};

/// Point-in-time utilization snapshot over `[start, end]`.
///
/// Stored once per date range. Regenerating over unchanged data returns the
/// stored copy; regenerating over changed data overwrites it under the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReport {
    pub id: Ulid,
    pub start: Day,
    pub end: Day,
    pub generated_at: Timestamp,
    /// Retention horizon. The reaper purges the report after this.
    pub expires_at: Timestamp,
    /// CRC32 over the resources and reservations the report was built from.
    pub fingerprint: u32,
    pub revision: u64,
    pub content: ReportContent,
}

impl UtilizationReport {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// JSON rendering handed to export collaborators.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportContent {
    pub summary: ReportSummary,
    pub daily: Vec<DailyUtilization>,
    pub sections: Vec<SectionUtilization>,
    pub users: Vec<UserActivity>,
    pub advanced: AdvancedMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_resources: u32,
    pub days: u32,
    pub average_utilization: f64,
    pub peak_utilization: u32,
    pub peak_date: Option<Day>,
    pub lowest_utilization: u32,
    pub lowest_date: Option<Day>,
    /// Non-cancelled reservations in range.
    pub total_bookings: u32,
    pub unique_users: u32,
    /// Resources currently flagged out of service.
    pub error_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUtilization {
    pub date: Day,
    pub reserved: u32,
    pub available: u32,
    pub error: u32,
    pub utilization: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionUtilization {
    pub section: char,
    pub total_resources: u32,
    pub total_bookings: u32,
    pub average_utilization: f64,
    pub peak_utilization: u32,
    pub error_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub total_reservations: u32,
    pub days_active: u32,
    pub favorite_section: Option<char>,
    pub avg_daily_reservations: f64,
    /// Compressed resource codes, e.g. `A1-A3, B5`.
    pub resource_sequence: String,
    pub first_date: Option<Day>,
    pub last_date: Option<Day>,
}

/// Derived analytics. `peak_hours` is an estimate from fixed multipliers on
/// the average utilization, not hourly telemetry; `heuristic` says so to
/// every consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedMetrics {
    pub heuristic: bool,
    pub peak_hours: Vec<PeakHourEstimate>,
    pub trend: Trend,
    pub check_in_rate: f64,
    pub no_show_rate: f64,
    pub cancellation_rate: f64,
    pub average_session_minutes: Option<f64>,
    pub busiest_weekday: Option<Weekday>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakHourEstimate {
    pub window: String,
    pub estimated_utilization: u32,
}

/// Period-over-period change. Placeholder (`Unknown`, no deltas) unless the
/// preceding period has a stored report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub utilization_delta: Option<f64>,
    pub bookings_delta: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
    Unknown,
}
