use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Change feed. Every committed [`Event`] goes to the global channel and, when
/// it belongs to a resource, to that resource's channel.
///
/// Slow subscribers lag and miss events rather than holding up commits.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
    all: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Changes to one resource and its reservations. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(resource_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Every change, for notification collaborators.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// No-op when nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(resource_id) = event.resource_id()
            && let Some(sender) = self.channels.get(&resource_id)
        {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};

    use crate::model::GridDate;

    fn released(resource_id: Ulid) -> Event {
        Event::ReservationReleased {
            id: Ulid::new(),
            resource_id,
            date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
        }
    }

    #[tokio::test]
    async fn resource_subscriber_sees_only_its_resource() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(rid);

        hub.send(&released(Ulid::new()));
        let mine = released(rid);
        hub.send(&mine);

        assert_eq!(rx.recv().await.unwrap(), mine);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn global_subscriber_sees_everything() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe_all();
        let grid = Event::GridDateUpdated {
            grid: GridDate::new(
                NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
                DateTime::from_timestamp(1_714_000_000, 0).unwrap(),
            ),
        };
        hub.send(&released(Ulid::new()));
        hub.send(&grid);

        assert_eq!(rx.recv().await.unwrap().label(), "reservation_released");
        assert_eq!(rx.recv().await.unwrap(), grid);
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&released(Ulid::new()));
    }
}
