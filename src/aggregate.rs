use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, Weekday};
use ulid::Ulid;

use crate::lifecycle::LifecycleStatus;
use crate::model::*;
use crate::report::*;

// ── Utilization Aggregation ───────────────────────────────────────

/// Fixed multipliers applied to the average utilization to estimate busy
/// windows. Estimates only; there is no hourly telemetry behind them.
const PEAK_HOUR_MULTIPLIERS: [(&str, f64); 5] = [
    ("08:00-10:00", 0.85),
    ("10:00-12:00", 1.20),
    ("12:00-14:00", 0.70),
    ("14:00-16:00", 1.10),
    ("16:00-18:00", 0.60),
];

/// Utilization changes smaller than this (percentage points) read as stable.
const STABLE_TREND_BAND: f64 = 1.0;

/// Everything one report is computed from. Reservations outside
/// `[start, end]` or on unknown resources are ignored.
pub struct AggregationInput<'a> {
    pub start: Day,
    pub end: Day,
    pub resources: &'a [Resource],
    pub reservations: &'a [Reservation],
    /// Summary of the preceding period, enabling trend figures.
    pub prior: Option<&'a ReportSummary>,
}

pub fn aggregate(input: &AggregationInput<'_>) -> ReportContent {
    let days = days_in_range(input.start, input.end);
    let by_id: HashMap<Ulid, &Resource> = input.resources.iter().map(|r| (r.id, r)).collect();

    let in_range: Vec<&Reservation> = input
        .reservations
        .iter()
        .filter(|r| r.date >= input.start && r.date <= input.end && by_id.contains_key(&r.resource_id))
        .collect();
    let live: Vec<&Reservation> = in_range.iter().copied().filter(|r| r.holds_slot()).collect();

    let mut reserved_by_day: HashMap<Day, HashSet<Ulid>> = HashMap::new();
    for r in &live {
        reserved_by_day.entry(r.date).or_default().insert(r.resource_id);
    }

    let all: Vec<&Resource> = input.resources.iter().collect();
    let daily: Vec<DailyUtilization> = days
        .iter()
        .map(|day| day_utilization(*day, &all, reserved_by_day.get(day)))
        .collect();

    let summary = summarize(&daily, input.resources, &live);
    let sections = section_breakdown(&days, input.resources, &reserved_by_day, &live);
    let users = user_activity(&by_id, &live);
    let advanced = advanced_metrics(&summary, &in_range, &live, input.prior);

    ReportContent {
        summary,
        daily,
        sections,
        users,
        advanced,
    }
}

pub fn days_in_range(start: Day, end: Day) -> Vec<Day> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// `round(reserved / total * 100)`, half rounding up. Zero for an empty inventory.
pub fn utilization_percent(reserved: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let (reserved, total) = (u64::from(reserved), u64::from(total));
    ((reserved * 200 + total) / (total * 2)) as u32
}

fn day_utilization(date: Day, resources: &[&Resource], reserved: Option<&HashSet<Ulid>>) -> DailyUtilization {
    let mut booked = 0u32;
    let mut error = 0u32;
    for resource in resources {
        if reserved.is_some_and(|set| set.contains(&resource.id)) {
            booked += 1;
        } else if resource.is_out_of_service() {
            error += 1;
        }
    }
    let total = resources.len() as u32;
    DailyUtilization {
        date,
        reserved: booked,
        available: total - booked - error,
        error,
        utilization: utilization_percent(booked, total),
    }
}

fn summarize(daily: &[DailyUtilization], resources: &[Resource], live: &[&Reservation]) -> ReportSummary {
    let mut peak: Option<&DailyUtilization> = None;
    let mut lowest: Option<&DailyUtilization> = None;
    for day in daily {
        if peak.is_none_or(|p| day.utilization > p.utilization) {
            peak = Some(day);
        }
        if lowest.is_none_or(|l| day.utilization < l.utilization) {
            lowest = Some(day);
        }
    }
    let users: HashSet<&str> = live.iter().map(|r| r.user.uid.as_str()).collect();

    ReportSummary {
        total_resources: resources.len() as u32,
        days: daily.len() as u32,
        average_utilization: mean(daily.iter().map(|d| d.utilization)),
        peak_utilization: peak.map_or(0, |d| d.utilization),
        peak_date: peak.map(|d| d.date),
        lowest_utilization: lowest.map_or(0, |d| d.utilization),
        lowest_date: lowest.map(|d| d.date),
        total_bookings: live.len() as u32,
        unique_users: users.len() as u32,
        error_count: resources.iter().filter(|r| r.is_out_of_service()).count() as u32,
    }
}

fn section_breakdown(
    days: &[Day],
    resources: &[Resource],
    reserved_by_day: &HashMap<Day, HashSet<Ulid>>,
    live: &[&Reservation],
) -> Vec<SectionUtilization> {
    let mut sections: BTreeMap<char, Vec<&Resource>> = BTreeMap::new();
    for resource in resources {
        sections.entry(resource.section()).or_default().push(resource);
    }

    sections
        .into_iter()
        .map(|(section, members)| {
            let ids: HashSet<Ulid> = members.iter().map(|r| r.id).collect();
            let per_day: Vec<u32> = days
                .iter()
                .map(|day| day_utilization(*day, &members, reserved_by_day.get(day)).utilization)
                .collect();
            SectionUtilization {
                section,
                total_resources: members.len() as u32,
                total_bookings: live.iter().filter(|r| ids.contains(&r.resource_id)).count() as u32,
                average_utilization: mean(per_day.iter().copied()),
                peak_utilization: per_day.iter().copied().max().unwrap_or(0),
                error_count: members.iter().filter(|r| r.is_out_of_service()).count() as u32,
            }
        })
        .collect()
}

fn user_activity(by_id: &HashMap<Ulid, &Resource>, live: &[&Reservation]) -> Vec<UserActivity> {
    let mut per_user: HashMap<&str, Vec<(&Reservation, &Resource)>> = HashMap::new();
    for r in live {
        if let Some(resource) = by_id.get(&r.resource_id) {
            per_user.entry(r.user.uid.as_str()).or_default().push((r, resource));
        }
    }

    let mut users: Vec<UserActivity> = per_user
        .into_values()
        .map(|mut bookings| {
            bookings.sort_by(|a, b| a.0.date.cmp(&b.0.date).then_with(|| a.1.code.cmp(&b.1.code)));
            summarize_user(&bookings)
        })
        .collect();

    users.sort_by(|a, b| {
        b.total_reservations
            .cmp(&a.total_reservations)
            .then_with(|| a.email.cmp(&b.email))
    });
    users
}

/// `bookings` must be non-empty and sorted by `(date, code)`.
fn summarize_user(bookings: &[(&Reservation, &Resource)]) -> UserActivity {
    // Latest snapshot names the user; older ones may predate a rename.
    let latest = &bookings[bookings.len() - 1].0.user;

    let dates: HashSet<Day> = bookings.iter().map(|(r, _)| r.date).collect();
    let total = bookings.len() as u32;
    let days_active = dates.len() as u32;

    // Insertion-ordered so ties go to the first section encountered.
    let mut section_counts: Vec<(char, u32)> = Vec::new();
    for (_, resource) in bookings {
        match section_counts.iter_mut().find(|(s, _)| *s == resource.section()) {
            Some((_, count)) => *count += 1,
            None => section_counts.push((resource.section(), 1)),
        }
    }
    let mut favorite: Option<(char, u32)> = None;
    for &(section, count) in &section_counts {
        if favorite.is_none_or(|(_, best)| count > best) {
            favorite = Some((section, count));
        }
    }

    UserActivity {
        uid: latest.uid.clone(),
        email: latest.email.clone(),
        display_name: latest.display_name.clone(),
        total_reservations: total,
        days_active,
        favorite_section: favorite.map(|(s, _)| s),
        avg_daily_reservations: if days_active == 0 {
            0.0
        } else {
            round2(f64::from(total) / f64::from(days_active))
        },
        resource_sequence: compress_sequence(bookings.iter().map(|(r, res)| (r.date, res.code.as_str()))),
        first_date: bookings.first().map(|(r, _)| r.date),
        last_date: bookings.last().map(|(r, _)| r.date),
    }
}

fn advanced_metrics(
    summary: &ReportSummary,
    in_range: &[&Reservation],
    live: &[&Reservation],
    prior: Option<&ReportSummary>,
) -> AdvancedMetrics {
    let peak_hours = PEAK_HOUR_MULTIPLIERS
        .iter()
        .map(|(window, multiplier)| PeakHourEstimate {
            window: (*window).to_string(),
            estimated_utilization: (summary.average_utilization * multiplier).round().clamp(0.0, 100.0) as u32,
        })
        .collect();

    let checked_in = live.iter().filter(|r| r.checked_in_at.is_some()).count();
    let no_shows = live.iter().filter(|r| r.status == LifecycleStatus::NoShow).count();
    let cancelled = in_range
        .iter()
        .filter(|r| r.status == LifecycleStatus::Cancelled)
        .count();
    let sessions: Vec<u32> = live
        .iter()
        .filter_map(|r| r.metadata.actual_duration_minutes)
        .collect();

    AdvancedMetrics {
        heuristic: true,
        peak_hours,
        trend: trend(summary, prior),
        check_in_rate: ratio_percent(checked_in, live.len()),
        no_show_rate: ratio_percent(no_shows, live.len()),
        cancellation_rate: ratio_percent(cancelled, in_range.len()),
        average_session_minutes: if sessions.is_empty() {
            None
        } else {
            Some(mean(sessions.iter().copied()))
        },
        busiest_weekday: busiest_weekday(live),
    }
}

fn trend(current: &ReportSummary, prior: Option<&ReportSummary>) -> Trend {
    let Some(prior) = prior else {
        return Trend {
            direction: TrendDirection::Unknown,
            utilization_delta: None,
            bookings_delta: None,
        };
    };
    let delta = round2(current.average_utilization - prior.average_utilization);
    let direction = if delta.abs() < STABLE_TREND_BAND {
        TrendDirection::Stable
    } else if delta > 0.0 {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };
    Trend {
        direction,
        utilization_delta: Some(delta),
        bookings_delta: Some(i64::from(current.total_bookings) - i64::from(prior.total_bookings)),
    }
}

/// Ties go to the earlier weekday, Monday first.
fn busiest_weekday(live: &[&Reservation]) -> Option<Weekday> {
    let mut counts = [0u32; 7];
    for r in live {
        counts[r.date.weekday().num_days_from_monday() as usize] += 1;
    }
    let mut best: Option<(usize, u32)> = None;
    for (idx, &count) in counts.iter().enumerate() {
        if count > 0 && best.is_none_or(|(_, c)| count > c) {
            best = Some((idx, count));
        }
    }
    best.and_then(|(idx, _)| Weekday::try_from(idx as u8).ok())
}

// ── Sequence compression ──────────────────────────────────────────

/// Compress `(date, code)` pairs into a display string.
///
/// Codes are grouped by date and sorted lexicographically within a date;
/// neighbours in the same section whose numbers step by exactly one collapse
/// into `first-last`. Dates are emitted in ascending order and everything is
/// joined with `", "`.
pub fn compress_sequence<'a>(entries: impl IntoIterator<Item = (Day, &'a str)>) -> String {
    let mut by_date: BTreeMap<Day, Vec<&str>> = BTreeMap::new();
    for (date, code) in entries {
        by_date.entry(date).or_default().push(code);
    }
    let mut parts = Vec::new();
    for codes in by_date.values_mut() {
        codes.sort_unstable();
        parts.extend(compress_codes(codes));
    }
    parts.join(", ")
}

/// Greedy run merge over already sorted codes.
pub fn compress_codes(sorted: &[&str]) -> Vec<String> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let first = sorted[i];
        let mut last = first;
        let mut j = i + 1;
        while j < sorted.len() && is_successor(last, sorted[j]) {
            last = sorted[j];
            j += 1;
        }
        if j - i == 1 {
            runs.push(first.to_string());
        } else {
            runs.push(format!("{first}-{last}"));
        }
        i = j;
    }
    runs
}

/// `A12` → `('A', 12)`. `None` for codes without a numeric suffix.
fn split_code(code: &str) -> Option<(char, u32)> {
    let mut chars = code.chars();
    let section = chars.next()?;
    let number = chars.as_str().parse().ok()?;
    Some((section, number))
}

fn is_successor(prev: &str, next: &str) -> bool {
    match (split_code(prev), split_code(next)) {
        (Some((ps, pn)), Some((ns, nn))) => ps == ns && pn.checked_add(1) == Some(nn),
        _ => false,
    }
}

// ── Numeric helpers ───────────────────────────────────────────────

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: impl Iterator<Item = u32>) -> f64 {
    let (sum, n) = values.fold((0u64, 0u64), |(s, n), v| (s + u64::from(v), n + 1));
    if n == 0 { 0.0 } else { round2(sum as f64 / n as f64) }
}

fn ratio_percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / whole as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};

    fn day(d: u32) -> Day {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn ts() -> Timestamp {
        DateTime::from_timestamp(1_712_000_000, 0).unwrap()
    }

    fn resource(code: &str) -> Resource {
        let section = code.chars().next().unwrap();
        let number: u16 = code[1..].parse().unwrap();
        Resource {
            id: Ulid::new(),
            code: code.to_string(),
            position: GridPosition::new(section, 1, number),
            operational_status: OperationalStatus::Available,
            created_by: "seed".into(),
            modified_by: None,
            created_at: ts(),
            updated_at: ts(),
            revision: 0,
        }
    }

    fn booking(resource: &Resource, uid: &str, date: Day, status: LifecycleStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            resource_id: resource.id,
            user: UserSnapshot {
                uid: uid.to_string(),
                email: format!("{uid}@example.com"),
                display_name: None,
            },
            date,
            status,
            reserved_at: ts(),
            checked_in_at: None,
            checked_out_at: None,
            cancelled_at: None,
            metadata: ReservationMetadata::default(),
            revision: 0,
        }
    }

    fn run(start: Day, end: Day, resources: &[Resource], reservations: &[Reservation]) -> ReportContent {
        aggregate(&AggregationInput {
            start,
            end,
            resources,
            reservations,
            prior: None,
        })
    }

    // ── compress_sequence ─────────────────────────────────

    #[test]
    fn compress_merges_consecutive_codes() {
        let d = day(1);
        let out = compress_sequence([(d, "A3"), (d, "B5"), (d, "A1"), (d, "A2")]);
        assert_eq!(out, "A1-A3, B5");
    }

    #[test]
    fn compress_keeps_gaps_as_singletons() {
        let d = day(1);
        assert_eq!(compress_sequence([(d, "A1"), (d, "A3")]), "A1, A3");
    }

    #[test]
    fn compress_does_not_cross_sections() {
        let d = day(1);
        assert_eq!(compress_sequence([(d, "A1"), (d, "B2")]), "A1, B2");
    }

    #[test]
    fn compress_orders_dates_and_never_merges_across_them() {
        let out = compress_sequence([(day(2), "A2"), (day(1), "A1"), (day(2), "A3")]);
        assert_eq!(out, "A1, A2-A3");
    }

    #[test]
    fn compress_sorts_lexicographically() {
        // "A10" sorts before "A9", so the pair is not a run.
        let d = day(1);
        assert_eq!(compress_sequence([(d, "A9"), (d, "A10")]), "A10, A9");
        assert_eq!(compress_sequence([(d, "A10"), (d, "A11"), (d, "A12")]), "A10-A12");
    }

    #[test]
    fn compress_handles_codes_without_numbers() {
        assert_eq!(compress_codes(&["X", "Y1", "Y2"]), vec!["X", "Y1-Y2"]);
        assert_eq!(compress_sequence(std::iter::empty()), "");
    }

    // ── daily / summary ───────────────────────────────────

    #[test]
    fn utilization_rounds_half_up() {
        assert_eq!(utilization_percent(3, 10), 30);
        assert_eq!(utilization_percent(1, 8), 13);
        assert_eq!(utilization_percent(1, 3), 33);
        assert_eq!(utilization_percent(2, 3), 67);
        assert_eq!(utilization_percent(0, 0), 0);
    }

    #[test]
    fn three_of_ten_reserved_is_thirty_percent() {
        let resources: Vec<Resource> = (1..=10).map(|n| resource(&format!("A{n}"))).collect();
        let reservations: Vec<Reservation> = resources[..3]
            .iter()
            .enumerate()
            .map(|(i, r)| booking(r, &format!("u{i}"), day(5), LifecycleStatus::Active))
            .collect();
        let content = run(day(5), day(5), &resources, &reservations);
        assert_eq!(content.daily.len(), 1);
        assert_eq!(content.daily[0].utilization, 30);
        assert_eq!(content.daily[0].reserved, 3);
        assert_eq!(content.daily[0].available, 7);
        assert_eq!(content.summary.unique_users, 3);
    }

    #[test]
    fn cancelled_bookings_do_not_count_as_reserved() {
        let resources = vec![resource("A1"), resource("A2")];
        let reservations = vec![
            booking(&resources[0], "u1", day(1), LifecycleStatus::Cancelled),
            booking(&resources[1], "u2", day(1), LifecycleStatus::CheckedOut),
        ];
        let content = run(day(1), day(1), &resources, &reservations);
        assert_eq!(content.daily[0].reserved, 1);
        assert_eq!(content.summary.total_bookings, 1);
        assert_eq!(content.advanced.cancellation_rate, 50.0);
    }

    #[test]
    fn error_resources_only_count_when_unbooked() {
        let mut resources = vec![resource("A1"), resource("A2"), resource("A3")];
        resources[0].operational_status = OperationalStatus::Error;
        resources[1].operational_status = OperationalStatus::Error;
        let reservations = vec![booking(&resources[0], "u1", day(1), LifecycleStatus::Active)];
        let content = run(day(1), day(1), &resources, &reservations);
        let d = &content.daily[0];
        assert_eq!((d.reserved, d.error, d.available), (1, 1, 1));
        assert_eq!(content.summary.error_count, 2);
    }

    #[test]
    fn summary_tracks_peak_and_lowest_with_earliest_tie() {
        let resources = vec![resource("A1"), resource("A2")];
        let reservations = vec![
            booking(&resources[0], "u1", day(1), LifecycleStatus::Active),
            booking(&resources[0], "u1", day(2), LifecycleStatus::Active),
            booking(&resources[1], "u2", day(2), LifecycleStatus::Active),
            booking(&resources[0], "u1", day(3), LifecycleStatus::Active),
            booking(&resources[1], "u2", day(3), LifecycleStatus::Active),
        ];
        let content = run(day(1), day(4), &resources, &reservations);
        let s = &content.summary;
        assert_eq!(s.days, 4);
        assert_eq!(s.peak_utilization, 100);
        assert_eq!(s.peak_date, Some(day(2)));
        assert_eq!(s.lowest_utilization, 0);
        assert_eq!(s.lowest_date, Some(day(4)));
        assert_eq!(s.average_utilization, 62.5);
        assert_eq!(s.total_bookings, 5);
    }

    #[test]
    fn reservations_outside_range_are_ignored() {
        let resources = vec![resource("A1")];
        let reservations = vec![
            booking(&resources[0], "u1", day(1), LifecycleStatus::Active),
            booking(&resources[0], "u1", day(9), LifecycleStatus::Active),
        ];
        let content = run(day(2), day(8), &resources, &reservations);
        assert_eq!(content.summary.total_bookings, 0);
        assert!(content.users.is_empty());
        assert!(content.daily.iter().all(|d| d.utilization == 0));
    }

    // ── sections ──────────────────────────────────────────

    #[test]
    fn sections_mirror_daily_computation() {
        let resources = vec![resource("A1"), resource("A2"), resource("B1"), resource("B2")];
        let reservations = vec![
            booking(&resources[0], "u1", day(1), LifecycleStatus::Active),
            booking(&resources[1], "u2", day(1), LifecycleStatus::Active),
            booking(&resources[2], "u3", day(2), LifecycleStatus::Active),
        ];
        let content = run(day(1), day(2), &resources, &reservations);
        let letters: Vec<char> = content.sections.iter().map(|s| s.section).collect();
        assert_eq!(letters, vec!['A', 'B']);

        let a = &content.sections[0];
        assert_eq!(a.total_bookings, 2);
        assert_eq!(a.peak_utilization, 100);
        assert_eq!(a.average_utilization, 50.0);

        let b = &content.sections[1];
        assert_eq!(b.total_bookings, 1);
        assert_eq!(b.peak_utilization, 50);
        assert_eq!(b.average_utilization, 25.0);
    }

    // ── users ─────────────────────────────────────────────

    #[test]
    fn user_activity_compresses_and_averages() {
        let resources: Vec<Resource> = ["A1", "A2", "A3", "B5"].iter().map(|c| resource(c)).collect();
        let reservations: Vec<Reservation> = resources
            .iter()
            .map(|r| booking(r, "u1", day(3), LifecycleStatus::Active))
            .chain(std::iter::once(booking(&resources[3], "u1", day(4), LifecycleStatus::Active)))
            .collect();
        let content = run(day(1), day(7), &resources, &reservations);
        assert_eq!(content.users.len(), 1);
        let u = &content.users[0];
        assert_eq!(u.total_reservations, 5);
        assert_eq!(u.days_active, 2);
        assert_eq!(u.avg_daily_reservations, 2.5);
        assert_eq!(u.resource_sequence, "A1-A3, B5, B5");
        assert_eq!(u.favorite_section, Some('A'));
        assert_eq!(u.first_date, Some(day(3)));
        assert_eq!(u.last_date, Some(day(4)));
    }

    #[test]
    fn favorite_section_tie_goes_to_first_encountered() {
        let resources = vec![resource("B1"), resource("A1")];
        let reservations = vec![
            booking(&resources[0], "u1", day(1), LifecycleStatus::Active),
            booking(&resources[1], "u1", day(2), LifecycleStatus::Active),
        ];
        let content = run(day(1), day(2), &resources, &reservations);
        // B1 is booked on the earlier date, so B is met first.
        assert_eq!(content.users[0].favorite_section, Some('B'));
    }

    #[test]
    fn users_sorted_by_volume_then_email() {
        let resources = vec![resource("A1"), resource("A2")];
        let reservations = vec![
            booking(&resources[0], "zed", day(1), LifecycleStatus::Active),
            booking(&resources[0], "amy", day(2), LifecycleStatus::Active),
            booking(&resources[1], "bob", day(1), LifecycleStatus::Active),
            booking(&resources[1], "bob", day(2), LifecycleStatus::Active),
        ];
        let content = run(day(1), day(2), &resources, &reservations);
        let order: Vec<&str> = content.users.iter().map(|u| u.uid.as_str()).collect();
        assert_eq!(order, vec!["bob", "amy", "zed"]);
    }

    #[test]
    fn user_named_by_latest_snapshot() {
        let resources = vec![resource("A1")];
        let mut old = booking(&resources[0], "u1", day(1), LifecycleStatus::Active);
        old.user.email = "old@example.com".into();
        let mut new = booking(&resources[0], "u1", day(2), LifecycleStatus::Active);
        new.user.email = "new@example.com".into();
        let content = run(day(1), day(2), &resources, &[new, old]);
        assert_eq!(content.users[0].email, "new@example.com");
    }

    // ── advanced ──────────────────────────────────────────

    #[test]
    fn trend_is_placeholder_without_prior() {
        let resources = vec![resource("A1")];
        let content = run(day(1), day(1), &resources, &[]);
        let trend = &content.advanced.trend;
        assert_eq!(trend.direction, TrendDirection::Unknown);
        assert!(trend.utilization_delta.is_none());
        assert!(trend.bookings_delta.is_none());
        assert!(content.advanced.heuristic);
    }

    #[test]
    fn trend_compares_against_prior_summary() {
        let resources = vec![resource("A1"), resource("A2")];
        let reservations = vec![booking(&resources[0], "u1", day(8), LifecycleStatus::Active)];
        let prior = run(day(1), day(1), &resources, &[]).summary;
        let content = aggregate(&AggregationInput {
            start: day(8),
            end: day(8),
            resources: &resources,
            reservations: &reservations,
            prior: Some(&prior),
        });
        let trend = &content.advanced.trend;
        assert_eq!(trend.direction, TrendDirection::Up);
        assert_eq!(trend.utilization_delta, Some(50.0));
        assert_eq!(trend.bookings_delta, Some(1));
    }

    #[test]
    fn peak_hours_scale_the_average() {
        let resources = vec![resource("A1"), resource("A2")];
        let reservations = vec![booking(&resources[0], "u1", day(1), LifecycleStatus::Active)];
        let content = run(day(1), day(1), &resources, &reservations);
        let estimates: Vec<u32> = content
            .advanced
            .peak_hours
            .iter()
            .map(|p| p.estimated_utilization)
            .collect();
        assert_eq!(estimates, vec![43, 60, 35, 55, 30]);
    }

    #[test]
    fn measured_rates() {
        let resources: Vec<Resource> = (1..=4).map(|n| resource(&format!("A{n}"))).collect();
        let mut checked_out = booking(&resources[0], "u1", day(1), LifecycleStatus::CheckedOut);
        checked_out.checked_in_at = Some(ts());
        checked_out.metadata.actual_duration_minutes = Some(120);
        let mut checked_in = booking(&resources[1], "u2", day(1), LifecycleStatus::CheckedIn);
        checked_in.checked_in_at = Some(ts());
        let no_show = booking(&resources[2], "u3", day(1), LifecycleStatus::NoShow);
        let active = booking(&resources[3], "u4", day(1), LifecycleStatus::Active);

        let content = run(day(1), day(1), &resources, &[checked_out, checked_in, no_show, active]);
        let adv = &content.advanced;
        assert_eq!(adv.check_in_rate, 50.0);
        assert_eq!(adv.no_show_rate, 25.0);
        assert_eq!(adv.cancellation_rate, 0.0);
        assert_eq!(adv.average_session_minutes, Some(120.0));
        // 2024-04-01 is a Monday.
        assert_eq!(adv.busiest_weekday, Some(Weekday::Mon));
    }
}
