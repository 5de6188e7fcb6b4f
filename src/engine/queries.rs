use ulid::Ulid;

use super::{Engine, EngineError};
use crate::aggregate::days_in_range;
use crate::model::*;

impl Engine {
    pub fn get_reservation(&self, id: &Ulid) -> Result<Reservation, EngineError> {
        self.reservations
            .get(id)
            .map(|r| r.value().clone())
            .ok_or(EngineError::ReservationNotFound(*id))
    }

    /// Everything `uid` has booked, oldest date first.
    pub fn reservations_for_user(&self, uid: &str) -> Vec<Reservation> {
        let mut mine: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|r| r.user.uid == uid)
            .map(|r| r.value().clone())
            .collect();
        mine.sort_by_key(|r| (r.date, r.reserved_at, r.id));
        mine
    }

    /// Every reservation dated within `[start, end]`, cancelled ones included,
    /// ordered by date then id.
    pub fn reservations_in_range(&self, start: Day, end: Day) -> Vec<Reservation> {
        let mut found = Vec::new();
        for date in days_in_range(start, end) {
            let ids: Vec<Ulid> = match self.by_date.get(&date) {
                Some(ids) => ids.iter().copied().collect(),
                None => continue,
            };
            let mut day: Vec<Reservation> = ids
                .iter()
                .filter_map(|id| self.reservations.get(id).map(|r| r.value().clone()))
                .collect();
            day.sort_by_key(|r| r.id);
            found.extend(day);
        }
        found
    }

    /// The grid for one day: every resource in floor order with its occupancy.
    pub fn query_by_date(&self, date: Day) -> Vec<ResourceWithStatus> {
        self.list_resources()
            .into_iter()
            .map(|resource| {
                let occupancy = self.occupancy(&resource, date);
                ResourceWithStatus { resource, occupancy }
            })
            .collect()
    }

    fn occupancy(&self, resource: &Resource, date: Day) -> Occupancy {
        let key = SlotKey {
            resource_id: resource.id,
            date,
        };
        let holder = self.slots.get(&key).map(|h| h.reservation_id);
        if let Some(reservation) = holder.and_then(|id| self.reservations.get(&id).map(|r| r.value().clone())) {
            return Occupancy::Reserved {
                reservation_id: reservation.id,
                holder: reservation.user,
                status: reservation.status,
            };
        }
        if resource.is_out_of_service() {
            Occupancy::Error
        } else {
            Occupancy::Available
        }
    }
}
