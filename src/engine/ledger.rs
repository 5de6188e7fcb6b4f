use chrono::Duration;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::{window, Engine, EngineError};
use crate::lifecycle::LifecycleStatus;
use crate::limits::MAX_SESSION_MINUTES;
use crate::model::*;
use crate::observability;

/// Who is driving a lifecycle write, and what they must be allowed to do.
#[derive(Clone, Copy)]
enum Actor<'a> {
    /// The reservation's owner, or anyone privileged.
    Manager(&'a Principal),
    Privileged(&'a Principal),
    /// Scheduled sweeps.
    System,
}

impl Engine {
    pub async fn book(&self, resource_id: Ulid, date: Day, principal: &Principal) -> Result<Reservation, EngineError> {
        self.book_with(BookingRequest::new(resource_id, date), principal).await
    }

    pub async fn book_with(&self, request: BookingRequest, principal: &Principal) -> Result<Reservation, EngineError> {
        let result = self.try_book(request, principal).await;
        let outcome = match &result {
            Ok(_) => "booked",
            Err(e) => e.label(),
        };
        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn try_book(&self, request: BookingRequest, principal: &Principal) -> Result<Reservation, EngineError> {
        window::validate_principal(principal)?;
        window::validate_request(&request)?;
        let resource = self.get_resource(&request.resource_id)?;
        if resource.is_out_of_service() {
            return Err(EngineError::validation(
                "resource",
                format!("{} is out of service", resource.code),
            ));
        }
        let now = self.now();
        window::validate_booking_date(&self.settings, request.date, self.site_time(now))?;

        let reservation = Reservation {
            id: Ulid::new(),
            resource_id: request.resource_id,
            user: principal.snapshot(),
            date: request.date,
            status: LifecycleStatus::Active,
            reserved_at: now,
            checked_in_at: None,
            checked_out_at: None,
            cancelled_at: None,
            metadata: request.metadata(),
            revision: 1,
        };

        {
            let _gate = self.commit_gate.read().await;
            self.claim_slot(&reservation)?;
            self.reservations.insert(reservation.id, reservation.clone());
            self.by_date
                .entry(reservation.date)
                .or_default()
                .insert(reservation.id);

            if let Err(e) = self
                .commit(Event::ReservationBooked { reservation: reservation.clone() })
                .await
            {
                self.slots
                    .remove_if(&reservation.slot(), |_, h| h.reservation_id == reservation.id);
                self.reservations.remove(&reservation.id);
                self.unindex_date(reservation.date, reservation.id);
                return Err(e);
            }
        }

        info!(
            reservation = %reservation.id,
            resource = %resource.code,
            date = %reservation.date,
            user = %reservation.user.email,
            "booked"
        );
        self.refresh_grid_logged(reservation.date).await;
        Ok(reservation)
    }

    /// Atomic insert-if-absent on the (resource, date) slot. The occupied
    /// branch is the conflict signal; nothing checks availability beforehand.
    fn claim_slot(&self, reservation: &Reservation) -> Result<(), EngineError> {
        match self.slots.entry(reservation.slot()) {
            Entry::Occupied(held) => Err(EngineError::Conflict {
                resource_id: reservation.resource_id,
                date: reservation.date,
                holder_email: held.get().email.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(reservation.holder());
                Ok(())
            }
        }
    }

    /// Move `id` to `at` (default: now) as checked in. The instant must fall
    /// on the reservation date, inside business hours.
    pub async fn check_in(&self, id: Ulid, actor: &Principal, at: Option<Timestamp>) -> Result<Reservation, EngineError> {
        let at = at.unwrap_or_else(|| self.now());
        let local = self.site_time(at);
        self.transition(id, Actor::Manager(actor), LifecycleStatus::CheckedIn, |r| {
            if local.date() != r.date {
                return Err(EngineError::validation(
                    "checked_in_at",
                    format!("check-in must happen on {}", r.date),
                ));
            }
            window::validate_business_hours(&self.settings, local.time(), "checked_in_at")?;
            r.checked_in_at = Some(at);
            Ok(())
        })
        .await
    }

    /// Records the session length, capped at 24h. Same-day check-outs must be
    /// inside business hours.
    pub async fn check_out(&self, id: Ulid, actor: &Principal, at: Option<Timestamp>) -> Result<Reservation, EngineError> {
        let at = at.unwrap_or_else(|| self.now());
        let local = self.site_time(at);
        self.transition(id, Actor::Manager(actor), LifecycleStatus::CheckedOut, |r| {
            let checked_in_at = r
                .checked_in_at
                .ok_or_else(|| EngineError::validation("checked_in_at", "missing"))?;
            if at < checked_in_at {
                return Err(EngineError::validation("checked_out_at", "precedes check-in"));
            }
            if local.date() == r.date {
                window::validate_business_hours(&self.settings, local.time(), "checked_out_at")?;
            }
            let minutes = (at - checked_in_at).num_minutes().clamp(0, MAX_SESSION_MINUTES);
            r.checked_out_at = Some(at);
            r.metadata.actual_duration_minutes = u32::try_from(minutes).ok();
            Ok(())
        })
        .await
    }

    /// Cancel and give the slot back. Owner or privileged.
    pub async fn cancel(&self, id: Ulid, actor: &Principal, reason: Option<String>) -> Result<Reservation, EngineError> {
        window::validate_reason(reason.as_deref())?;
        let now = self.now();
        self.transition(id, Actor::Manager(actor), LifecycleStatus::Cancelled, |r| {
            r.cancelled_at = Some(now);
            r.metadata.cancel_reason = reason;
            Ok(())
        })
        .await
    }

    pub async fn mark_no_show(&self, id: Ulid, actor: &Principal) -> Result<Reservation, EngineError> {
        self.transition(id, Actor::Privileged(actor), LifecycleStatus::NoShow, |_| Ok(()))
            .await
    }

    fn authorize(&self, reservation: &Reservation, actor: Actor<'_>) -> Result<(), EngineError> {
        match actor {
            Actor::Manager(p) if !self.policy.can_manage(p, &reservation.user.uid) => Err(EngineError::Forbidden(
                "only the owner or a privileged user may change this reservation",
            )),
            Actor::Privileged(p) if !self.policy.is_privileged(p) => {
                Err(EngineError::Forbidden("only privileged users may do this"))
            }
            _ => Ok(()),
        }
    }

    /// One lifecycle write: authorize, consult the transition table, let
    /// `edit` stamp the new state, then compare-and-swap on the revision the
    /// edit was computed from.
    async fn transition<F>(
        &self,
        id: Ulid,
        actor: Actor<'_>,
        to: LifecycleStatus,
        edit: F,
    ) -> Result<Reservation, EngineError>
    where
        F: FnOnce(&mut Reservation) -> Result<(), EngineError>,
    {
        let current = self.get_reservation(&id)?;
        self.authorize(&current, actor)?;
        let mut next = current.clone();
        next.status = current.status.transition(to)?;
        edit(&mut next)?;
        next.revision = current.revision + 1;

        {
            let _gate = self.commit_gate.read().await;
            self.swap_reservation(&current, next.clone())?;
            if let Err(e) = self
                .commit(Event::ReservationUpdated { reservation: next.clone() })
                .await
            {
                if let Some(mut entry) = self.reservations.get_mut(&id)
                    && entry.revision == next.revision
                {
                    *entry = current;
                }
                return Err(e);
            }
        }

        metrics::counter!(observability::TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
        debug!(reservation = %id, from = %current.status, to = %to, "transition");

        if current.holds_slot() && !next.holds_slot() {
            self.slots
                .remove_if(&next.slot(), |_, h| h.reservation_id == next.id);
            self.refresh_grid_logged(next.date).await;
        }
        Ok(next)
    }

    pub(super) fn swap_reservation(&self, expected: &Reservation, next: Reservation) -> Result<(), EngineError> {
        let mut entry = self
            .reservations
            .get_mut(&expected.id)
            .ok_or(EngineError::ReservationNotFound(expected.id))?;
        if entry.revision != expected.revision {
            return Err(EngineError::StaleRevision {
                id: expected.id,
                expected: expected.revision,
                found: entry.revision,
            });
        }
        *entry = next;
        Ok(())
    }

    /// Remove the reservation entirely so the slot is immediately bookable
    /// again. Same authorization as [`Engine::cancel`].
    pub async fn release(&self, id: Ulid, actor: &Principal) -> Result<(), EngineError> {
        let current = self.get_reservation(&id)?;
        self.authorize(&current, Actor::Manager(actor))?;

        {
            let _gate = self.commit_gate.read().await;
            let Some((_, removed)) = self
                .reservations
                .remove_if(&id, |_, r| r.revision == current.revision)
            else {
                return Err(match self.reservations.get(&id) {
                    Some(r) => EngineError::StaleRevision {
                        id,
                        expected: current.revision,
                        found: r.revision,
                    },
                    None => EngineError::ReservationNotFound(id),
                });
            };
            let event = Event::ReservationReleased {
                id,
                resource_id: removed.resource_id,
                date: removed.date,
            };
            if let Err(e) = self.commit(event).await {
                self.reservations.insert(id, removed);
                return Err(e);
            }
        }

        self.slots
            .remove_if(&current.slot(), |_, h| h.reservation_id == id);
        self.unindex_date(current.date, id);
        metrics::counter!(observability::RELEASES_TOTAL).increment(1);
        info!(reservation = %id, date = %current.date, by = %actor.email, "released");
        self.refresh_grid_logged(current.date).await;
        Ok(())
    }

    /// Expire every `Active` reservation whose day began more than
    /// `grace_hours` ago. Records that moved on underneath the sweep are
    /// skipped; other failures are logged and counted. Returns how many
    /// were expired.
    pub async fn expire_overdue(&self, grace_hours: u32) -> usize {
        let now = self.now();
        let grace = Duration::hours(i64::from(grace_hours));
        let overdue: Vec<Ulid> = self
            .reservations
            .iter()
            .filter(|r| r.status == LifecycleStatus::Active && self.site_midnight_utc(r.date) + grace < now)
            .map(|r| r.id)
            .collect();

        let mut expired = 0;
        for id in overdue {
            match self
                .transition(id, Actor::System, LifecycleStatus::Expired, |_| Ok(()))
                .await
            {
                Ok(_) => expired += 1,
                Err(
                    e @ (EngineError::InvalidTransition { .. }
                    | EngineError::StaleRevision { .. }
                    | EngineError::ReservationNotFound(_)),
                ) => debug!(reservation = %id, "expiry skipped: {e}"),
                Err(e) => {
                    warn!(reservation = %id, "expiry failed: {e}");
                    metrics::counter!(observability::SWEEP_FAILURES_TOTAL, "sweep" => "expiry").increment(1);
                }
            }
        }
        if expired > 0 {
            metrics::counter!(observability::SWEEP_EXPIRED_TOTAL).increment(expired as u64);
            info!(expired, grace_hours, "expired overdue reservations");
        }
        expired
    }
}
