//! Time-window and input validation shared by the ledger operations.

use chrono::{Days, Months, NaiveDateTime, NaiveTime};

use super::EngineError;
use crate::config::Settings;
use crate::limits::*;
use crate::model::{BookingRequest, Day, Principal};

/// A booking date must lie within `[today - max_past_months, today +
/// max_advance_days]` at the site, and same-day bookings close at the cutoff.
pub fn validate_booking_date(settings: &Settings, date: Day, now_local: NaiveDateTime) -> Result<(), EngineError> {
    let today = now_local.date();
    let earliest = today
        .checked_sub_months(Months::new(settings.max_past_months))
        .unwrap_or(Day::MIN);
    if date < earliest {
        return Err(EngineError::validation(
            "date",
            format!("{date} is more than {} months in the past", settings.max_past_months),
        ));
    }
    let latest = today
        .checked_add_days(Days::new(u64::from(settings.max_advance_days)))
        .unwrap_or(Day::MAX);
    if date > latest {
        return Err(EngineError::validation(
            "date",
            format!("{date} is beyond the {}-day booking horizon", settings.max_advance_days),
        ));
    }
    if date == today && now_local.time() >= settings.same_day_cutoff {
        return Err(EngineError::validation(
            "date",
            format!("same-day bookings close at {}", settings.same_day_cutoff.format("%H:%M")),
        ));
    }
    Ok(())
}

/// Business hours are the half-open window `[open, close)`.
pub fn validate_business_hours(settings: &Settings, time: NaiveTime, field: &'static str) -> Result<(), EngineError> {
    if time < settings.business_open || time >= settings.business_close {
        return Err(EngineError::validation(
            field,
            format!(
                "{} is outside business hours [{}, {})",
                time.format("%H:%M"),
                settings.business_open.format("%H:%M"),
                settings.business_close.format("%H:%M"),
            ),
        ));
    }
    Ok(())
}

pub(super) fn validate_principal(principal: &Principal) -> Result<(), EngineError> {
    let uid = principal.uid.trim();
    if uid.is_empty() {
        return Err(EngineError::validation("uid", "must not be empty"));
    }
    if uid.len() > MAX_UID_LEN {
        return Err(EngineError::LimitExceeded("uid too long"));
    }
    let email = principal.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(EngineError::validation("email", "must be an email address"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email too long"));
    }
    Ok(())
}

pub(super) fn validate_request(request: &BookingRequest) -> Result<(), EngineError> {
    if let Some(notes) = &request.notes
        && notes.chars().count() > MAX_NOTES_LEN
    {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    if request.tags.len() > MAX_TAGS {
        return Err(EngineError::LimitExceeded("too many tags"));
    }
    for tag in &request.tags {
        if tag.trim().is_empty() {
            return Err(EngineError::validation("tags", "tags must not be blank"));
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(EngineError::LimitExceeded("tag too long"));
        }
    }
    match request.planned_duration_minutes {
        Some(0) => Err(EngineError::validation("planned_duration_minutes", "must be positive")),
        Some(m) if m > MAX_PLANNED_DURATION_MINUTES => Err(EngineError::validation(
            "planned_duration_minutes",
            format!("{m} exceeds {MAX_PLANNED_DURATION_MINUTES}"),
        )),
        _ => Ok(()),
    }
}

pub(super) fn validate_reason(reason: Option<&str>) -> Result<(), EngineError> {
    match reason {
        Some(r) if r.chars().count() > MAX_REASON_LEN => Err(EngineError::LimitExceeded("reason too long")),
        _ => Ok(()),
    }
}

pub(super) fn validate_report_range(start: Day, end: Day) -> Result<(), EngineError> {
    if end < start {
        return Err(EngineError::validation("range", format!("end {end} precedes start {start}")));
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_REPORT_RANGE_DAYS {
        return Err(EngineError::validation(
            "range",
            format!("{days} days exceeds the {MAX_REPORT_RANGE_DAYS}-day maximum"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: Day, h: u32, m: u32) -> NaiveDateTime {
        date.and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_bounds() {
        let settings = Settings::default();
        let today = day(2024, 6, 15);
        let now = at(today, 9, 0);
        assert!(validate_booking_date(&settings, day(2024, 3, 15), now).is_ok());
        assert!(validate_booking_date(&settings, day(2024, 3, 14), now).is_err());
        assert!(validate_booking_date(&settings, day(2024, 9, 13), now).is_ok());
        assert!(validate_booking_date(&settings, day(2024, 9, 14), now).is_err());
    }

    #[test]
    fn same_day_cutoff_is_inclusive() {
        let settings = Settings::default();
        let today = day(2024, 6, 15);
        assert!(validate_booking_date(&settings, today, at(today, 21, 59)).is_ok());
        let err = validate_booking_date(&settings, today, at(today, 22, 0)).unwrap_err();
        assert_eq!(err.to_string(), "invalid date: same-day bookings close at 22:00");
        // Tomorrow is unaffected by today's cutoff.
        assert!(validate_booking_date(&settings, day(2024, 6, 16), at(today, 23, 0)).is_ok());
    }

    #[test]
    fn business_hours_half_open() {
        let settings = Settings::default();
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(validate_business_hours(&settings, t(6, 0), "at").is_ok());
        assert!(validate_business_hours(&settings, t(21, 59), "at").is_ok());
        assert!(validate_business_hours(&settings, t(5, 59), "at").is_err());
        assert!(validate_business_hours(&settings, t(22, 0), "at").is_err());
    }

    #[test]
    fn principal_needs_uid_and_email() {
        assert!(validate_principal(&Principal::new("u1", "u1@example.com")).is_ok());
        assert!(matches!(
            validate_principal(&Principal::new(" ", "u1@example.com")),
            Err(EngineError::Validation { field: "uid", .. })
        ));
        assert!(matches!(
            validate_principal(&Principal::new("u1", "nobody")),
            Err(EngineError::Validation { field: "email", .. })
        ));
    }

    #[test]
    fn request_metadata_limits() {
        let base = BookingRequest::new(ulid::Ulid::new(), day(2024, 6, 15));
        assert!(validate_request(&base.clone().with_tag("focus").with_planned_duration(480)).is_ok());
        assert!(validate_request(&base.clone().with_planned_duration(0)).is_err());
        assert!(validate_request(&base.clone().with_planned_duration(24 * 60 + 1)).is_err());
        assert!(validate_request(&base.clone().with_tag("  ")).is_err());
        assert!(validate_request(&base.clone().with_notes("x".repeat(MAX_NOTES_LEN + 1))).is_err());
        let mut many = base;
        many.tags = (0..=MAX_TAGS).map(|i| format!("t{i}")).collect();
        assert!(matches!(validate_request(&many), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn report_range_checks() {
        assert!(validate_report_range(day(2024, 1, 1), day(2024, 1, 1)).is_ok());
        assert!(validate_report_range(day(2024, 1, 2), day(2024, 1, 1)).is_err());
        assert!(validate_report_range(day(2024, 1, 1), day(2024, 12, 31)).is_ok());
        assert!(validate_report_range(day(2024, 1, 1), day(2025, 1, 1)).is_err());
    }
}
