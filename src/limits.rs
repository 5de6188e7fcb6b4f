// Hard limits. Anything a client can grow without bound is capped here.

pub const MAX_RESOURCES: usize = 10_000;
pub const MAX_CODE_LEN: usize = 16;
pub const MAX_GRID_ROWS: u16 = 500;
pub const MAX_GRID_COLUMNS: u16 = 500;

pub const MAX_NOTES_LEN: usize = 1_000;
pub const MAX_TAGS: usize = 16;
pub const MAX_TAG_LEN: usize = 64;
pub const MAX_REASON_LEN: usize = 500;

/// Checkout durations above this are recorded as exactly this.
pub const MAX_SESSION_MINUTES: i64 = 24 * 60;
pub const MAX_PLANNED_DURATION_MINUTES: u32 = 24 * 60;

pub const MAX_GRID_LIST: usize = 366;
pub const MAX_REPORT_RANGE_DAYS: i64 = 366;

pub const MAX_UID_LEN: usize = 128;
pub const MAX_EMAIL_LEN: usize = 320;
