use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::lifecycle::LifecycleStatus;
use crate::report::UtilizationReport;

/// Calendar day. The only booking granularity.
pub type Day = NaiveDate;

pub type Timestamp = DateTime<Utc>;

/// Global maintenance flag on a resource. Not date scoped: occupancy for a
/// given day lives in the ledger, never here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationalStatus {
    Available,
    /// Legacy global flag, kept for compatibility with older inventories.
    Reserved,
    Error,
}

impl OperationalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationalStatus::Available => "available",
            OperationalStatus::Reserved => "reserved",
            OperationalStatus::Error => "error",
        }
    }
}

/// Location of a cubicle on the floor. Ordered section, then row, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub section: char,
    pub row: u16,
    pub column: u16,
}

impl GridPosition {
    pub fn new(section: char, row: u16, column: u16) -> Self {
        Self { section, row, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    /// Serial code, e.g. `A12`. Unique, derived from the position.
    pub code: String,
    pub position: GridPosition,
    pub operational_status: OperationalStatus,
    pub created_by: String,
    pub modified_by: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub revision: u64,
}

impl Resource {
    pub fn section(&self) -> char {
        self.position.section
    }

    pub fn is_out_of_service(&self) -> bool {
        self.operational_status == OperationalStatus::Error
    }
}

/// Identity attached to every mutating call by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub is_privileged: bool,
}

impl Principal {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: None,
            is_privileged: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.is_privileged = true;
        self
    }

    /// Freeze the identity as it is right now.
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Who booked, captured at booking time and never re-resolved. Reports over
/// old periods stay stable when the user record changes later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationMetadata {
    pub planned_duration_minutes: Option<u32>,
    /// Filled at checkout, capped at 24h.
    pub actual_duration_minutes: Option<u32>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub user: UserSnapshot,
    pub date: Day,
    pub status: LifecycleStatus,
    pub reserved_at: Timestamp,
    pub checked_in_at: Option<Timestamp>,
    pub checked_out_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub metadata: ReservationMetadata,
    /// Bumped on every lifecycle write; writers compare-and-swap on it.
    pub revision: u64,
}

impl Reservation {
    pub fn slot(&self) -> SlotKey {
        SlotKey {
            resource_id: self.resource_id,
            date: self.date,
        }
    }

    pub fn holds_slot(&self) -> bool {
        self.status.holds_slot()
    }

    pub fn holder(&self) -> SlotHolder {
        SlotHolder {
            reservation_id: self.id,
            email: self.user.email.clone(),
        }
    }
}

/// Uniqueness key of the ledger: at most one live booking per resource per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub resource_id: Ulid,
    pub date: Day,
}

/// What a conflicting booker is allowed to learn about the current holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHolder {
    pub reservation_id: Ulid,
    pub email: String,
}

/// Input of a booking. `book` builds the plain form of this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub resource_id: Ulid,
    pub date: Day,
    pub planned_duration_minutes: Option<u32>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl BookingRequest {
    pub fn new(resource_id: Ulid, date: Day) -> Self {
        Self {
            resource_id,
            date,
            planned_duration_minutes: None,
            notes: None,
            tags: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_planned_duration(mut self, minutes: u32) -> Self {
        self.planned_duration_minutes = Some(minutes);
        self
    }

    pub(crate) fn metadata(&self) -> ReservationMetadata {
        ReservationMetadata {
            planned_duration_minutes: self.planned_duration_minutes,
            actual_duration_minutes: None,
            notes: self.notes.clone(),
            tags: self.tags.clone(),
            cancel_reason: None,
        }
    }
}

/// One record per calendar date that has ever had bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDate {
    pub date: Day,
    pub total_reservations: u32,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub revision: u64,
}

impl GridDate {
    pub fn new(date: Day, now: Timestamp) -> Self {
        Self {
            date,
            total_reservations: 0,
            is_active: false,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }
}

/// Floor plan used to seed the registry: every section is a rows × columns block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridLayout {
    pub sections: Vec<SectionLayout>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLayout {
    pub letter: char,
    pub rows: u16,
    pub columns: u16,
}

impl SectionLayout {
    /// Serial code of a position: the section letter and a 1-based running
    /// number in row-major order.
    pub fn code_for(&self, row: u16, column: u16) -> String {
        let number = u32::from(row - 1) * u32::from(self.columns) + u32::from(column);
        format!("{}{number}", self.letter)
    }

    pub fn positions(&self) -> impl Iterator<Item = GridPosition> + '_ {
        (1..=self.rows).flat_map(move |row| {
            (1..=self.columns).map(move |column| GridPosition::new(self.letter, row, column))
        })
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occupancy {
    Available,
    Reserved {
        reservation_id: Ulid,
        holder: UserSnapshot,
        status: LifecycleStatus,
    },
    /// Out of service and not booked for the day.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceWithStatus {
    pub resource: Resource,
    pub occupancy: Occupancy,
}

/// WAL record format. Every record carries a full snapshot of what changed, so
/// replay is a last-revision-wins overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated { resource: Resource },
    ResourceUpdated { resource: Resource },
    ReservationBooked { reservation: Reservation },
    ReservationUpdated { reservation: Reservation },
    ReservationReleased { id: Ulid, resource_id: Ulid, date: Day },
    GridDateUpdated { grid: GridDate },
    ReportStored { report: Box<UtilizationReport> },
    ReportPurged { id: Ulid },
}

impl Event {
    /// The resource a change belongs to, for per-resource subscribers.
    pub fn resource_id(&self) -> Option<Ulid> {
        match self {
            Event::ResourceCreated { resource } | Event::ResourceUpdated { resource } => {
                Some(resource.id)
            }
            Event::ReservationBooked { reservation } | Event::ReservationUpdated { reservation } => {
                Some(reservation.resource_id)
            }
            Event::ReservationReleased { resource_id, .. } => Some(*resource_id),
            Event::GridDateUpdated { .. } | Event::ReportStored { .. } | Event::ReportPurged { .. } => {
                None
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Event::ResourceCreated { .. } => "resource_created",
            Event::ResourceUpdated { .. } => "resource_updated",
            Event::ReservationBooked { .. } => "reservation_booked",
            Event::ReservationUpdated { .. } => "reservation_updated",
            Event::ReservationReleased { .. } => "reservation_released",
            Event::GridDateUpdated { .. } => "grid_date_updated",
            Event::ReportStored { .. } => "report_stored",
            Event::ReportPurged { .. } => "report_purged",
        }
    }
}
