//! Environment-driven settings.
//!
//! Every knob has a default; a variable that is set but unparsable is an
//! error rather than silently falling back.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime, Offset, Utc};

use crate::limits::{MAX_GRID_COLUMNS, MAX_GRID_ROWS};
use crate::model::{GridLayout, SectionLayout};

const DATA_DIR_ENV: &str = "CUBICLED_DATA_DIR";
const METRICS_PORT_ENV: &str = "CUBICLED_METRICS_PORT";
const UTC_OFFSET_ENV: &str = "CUBICLED_UTC_OFFSET_MINUTES";
const MAX_PAST_MONTHS_ENV: &str = "CUBICLED_MAX_PAST_MONTHS";
const MAX_ADVANCE_DAYS_ENV: &str = "CUBICLED_MAX_ADVANCE_DAYS";
const SAME_DAY_CUTOFF_ENV: &str = "CUBICLED_SAME_DAY_CUTOFF";
const BUSINESS_OPEN_ENV: &str = "CUBICLED_BUSINESS_OPEN";
const BUSINESS_CLOSE_ENV: &str = "CUBICLED_BUSINESS_CLOSE";
const GRACE_HOURS_ENV: &str = "CUBICLED_EXPIRY_GRACE_HOURS";
const RETENTION_DAYS_ENV: &str = "CUBICLED_REPORT_RETENTION_DAYS";
const SWEEP_INTERVAL_ENV: &str = "CUBICLED_SWEEP_INTERVAL_SECS";
const COMPACT_THRESHOLD_ENV: &str = "CUBICLED_COMPACT_THRESHOLD";
const PRIVILEGED_EMAILS_ENV: &str = "CUBICLED_PRIVILEGED_EMAILS";
const LAYOUT_ENV: &str = "CUBICLED_LAYOUT";

const TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}='{value}'; expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("business hours must open before they close ({open} >= {close})")]
    BusinessHours { open: NaiveTime, close: NaiveTime },
    #[error("invalid layout section '{0}'; expected LETTER:ROWSxCOLUMNS")]
    Layout(String),
    #[error("layout section {0} listed twice")]
    DuplicateSection(char),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Offset of the site's wall clock from UTC. Dates, cutoffs and
    /// business hours are all evaluated in it.
    pub site_offset: FixedOffset,
    pub max_past_months: u32,
    pub max_advance_days: u32,
    /// Same-day bookings are refused from this time on.
    pub same_day_cutoff: NaiveTime,
    pub business_open: NaiveTime,
    pub business_close: NaiveTime,
    pub expiry_grace_hours: u32,
    pub report_retention_days: u32,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub privileged_emails: Vec<String>,
    pub layout: Option<GridLayout>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            site_offset: Utc.fix(),
            max_past_months: 3,
            max_advance_days: 90,
            same_day_cutoff: hm(22, 0),
            business_open: hm(6, 0),
            business_close: hm(22, 0),
            expiry_grace_hours: 24,
            report_retention_days: 180,
            sweep_interval: Duration::from_secs(300),
            compact_threshold: 1000,
            privileged_emails: Vec::new(),
            layout: None,
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let offset_minutes: i32 = parsed(&lookup, UTC_OFFSET_ENV, "minutes east of UTC")?.unwrap_or(0);
        let site_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| ConfigError::Invalid {
            name: UTC_OFFSET_ENV,
            value: offset_minutes.to_string(),
            expected: "an offset within ±24h",
        })?;

        let settings = Self {
            data_dir: lookup(DATA_DIR_ENV).map(PathBuf::from).unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, METRICS_PORT_ENV, "a TCP port")?,
            site_offset,
            max_past_months: parsed(&lookup, MAX_PAST_MONTHS_ENV, "a month count")?
                .unwrap_or(defaults.max_past_months),
            max_advance_days: parsed(&lookup, MAX_ADVANCE_DAYS_ENV, "a day count")?
                .unwrap_or(defaults.max_advance_days),
            same_day_cutoff: time(&lookup, SAME_DAY_CUTOFF_ENV)?.unwrap_or(defaults.same_day_cutoff),
            business_open: time(&lookup, BUSINESS_OPEN_ENV)?.unwrap_or(defaults.business_open),
            business_close: time(&lookup, BUSINESS_CLOSE_ENV)?.unwrap_or(defaults.business_close),
            expiry_grace_hours: parsed(&lookup, GRACE_HOURS_ENV, "an hour count")?
                .unwrap_or(defaults.expiry_grace_hours),
            report_retention_days: parsed(&lookup, RETENTION_DAYS_ENV, "a day count")?
                .unwrap_or(defaults.report_retention_days),
            sweep_interval: parsed(&lookup, SWEEP_INTERVAL_ENV, "seconds")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            compact_threshold: parsed(&lookup, COMPACT_THRESHOLD_ENV, "an append count")?
                .unwrap_or(defaults.compact_threshold),
            privileged_emails: lookup(PRIVILEGED_EMAILS_ENV)
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|e| !e.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            layout: lookup(LAYOUT_ENV).map(|raw| parse_layout(&raw)).transpose()?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.business_open >= self.business_close {
            return Err(ConfigError::BusinessHours {
                open: self.business_open,
                close: self.business_close,
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: SWEEP_INTERVAL_ENV,
                value: "0".into(),
                expected: "a positive number of seconds",
            });
        }
        Ok(())
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("cubicled.wal")
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(name) else { return Ok(None) };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { name, value, expected })
}

fn time(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<NaiveTime>, ConfigError> {
    let Some(value) = lookup(name) else { return Ok(None) };
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT)
        .map(Some)
        .map_err(|_| ConfigError::Invalid {
            name,
            value,
            expected: "HH:MM",
        })
}

/// Parse `A:4x10,B:3x8` into a layout. Section letters are ASCII uppercase.
pub fn parse_layout(raw: &str) -> Result<GridLayout, ConfigError> {
    let mut sections: Vec<SectionLayout> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let section = parse_section(part).ok_or_else(|| ConfigError::Layout(part.to_string()))?;
        if sections.iter().any(|s| s.letter == section.letter) {
            return Err(ConfigError::DuplicateSection(section.letter));
        }
        sections.push(section);
    }
    if sections.is_empty() {
        return Err(ConfigError::Layout(raw.to_string()));
    }
    Ok(GridLayout { sections })
}

fn parse_section(part: &str) -> Option<SectionLayout> {
    let (letter, dims) = part.split_once(':')?;
    let mut letters = letter.trim().chars();
    let letter = letters.next().filter(|c| c.is_ascii_uppercase())?;
    if letters.next().is_some() {
        return None;
    }
    let (rows, columns) = dims.trim().split_once(['x', 'X'])?;
    let rows: u16 = rows.trim().parse().ok()?;
    let columns: u16 = columns.trim().parse().ok()?;
    if rows == 0 || columns == 0 || rows > MAX_GRID_ROWS || columns > MAX_GRID_COLUMNS {
        return None;
    }
    Some(SectionLayout { letter, rows, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.max_past_months, 3);
        assert_eq!(settings.max_advance_days, 90);
        assert_eq!(settings.business_open, hm(6, 0));
        assert_eq!(settings.business_close, hm(22, 0));
        assert_eq!(settings.report_retention_days, 180);
        assert_eq!(settings.site_offset.local_minus_utc(), 0);
        assert!(settings.layout.is_none());
        assert_eq!(settings.wal_path(), PathBuf::from("./data/cubicled.wal"));
    }

    #[test]
    fn overrides_are_applied() {
        let settings = Settings::from_lookup(lookup(&[
            (UTC_OFFSET_ENV, "120"),
            (SAME_DAY_CUTOFF_ENV, "20:30"),
            (GRACE_HOURS_ENV, "6"),
            (PRIVILEGED_EMAILS_ENV, "a@x.io, b@x.io,,"),
            (LAYOUT_ENV, "A:2x3,B:1x4"),
        ]))
        .unwrap();
        assert_eq!(settings.site_offset.local_minus_utc(), 7200);
        assert_eq!(settings.same_day_cutoff, hm(20, 30));
        assert_eq!(settings.expiry_grace_hours, 6);
        assert_eq!(settings.privileged_emails, vec!["a@x.io", "b@x.io"]);
        let layout = settings.layout.unwrap();
        assert_eq!(layout.sections.len(), 2);
        assert_eq!(layout.sections[1], SectionLayout { letter: 'B', rows: 1, columns: 4 });
    }

    #[test]
    fn unparsable_value_is_an_error() {
        let err = Settings::from_lookup(lookup(&[(MAX_ADVANCE_DAYS_ENV, "soon")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for CUBICLED_MAX_ADVANCE_DAYS='soon'; expected a day count"
        );
    }

    #[test]
    fn inverted_business_hours_rejected() {
        let err = Settings::from_lookup(lookup(&[
            (BUSINESS_OPEN_ENV, "18:00"),
            (BUSINESS_CLOSE_ENV, "08:00"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::BusinessHours { .. }));
    }

    #[test]
    fn layout_rejects_bad_sections() {
        assert!(parse_layout("a:2x2").is_err());
        assert!(parse_layout("AB:2x2").is_err());
        assert!(parse_layout("A:0x2").is_err());
        assert!(parse_layout("A:2").is_err());
        assert!(parse_layout("").is_err());
        assert!(matches!(parse_layout("A:1x1,A:2x2"), Err(ConfigError::DuplicateSection('A'))));
    }
}
