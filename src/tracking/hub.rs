use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use uuid::Uuid;

use crate::entities::ride::RideStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RideEvent {
    DriverPosition {
        lat: f64,
        lon: f64,
        distance_m: f64,
        at: DateTime<Utc>,
    },
    PickupUpdated {
        booking_id: Uuid,
        lat: f64,
        lon: f64,
    },
    SeatsChanged {
        seats_available: i32,
    },
    StatusChanged {
        status: RideStatus,
    },
}

impl RideEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideEvent::StatusChanged { status } if status.is_terminal())
    }
}

pub struct RideHub {
    capacity: usize,
    channels: Mutex<HashMap<Uuid, broadcast::Sender<RideEvent>>>,
}

impl RideHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(self: &Arc<Self>, ride_id: Uuid) -> Subscription {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let rx = channels
            .entry(ride_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        Subscription {
            hub: Arc::clone(self),
            ride_id,
            rx: Some(rx),
        }
    }

    /// Returns how many subscribers received the event.
    ///
    /// Channels without subscribers are dropped, and a terminal status closes
    /// the channel after delivery.
    pub fn publish(&self, ride_id: Uuid, event: RideEvent) -> usize {
        let terminal = event.is_terminal();
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());

        let Some(sender) = channels.get(&ride_id) else {
            return 0;
        };

        let delivered = sender.send(event).unwrap_or(0);
        if delivered == 0 || terminal {
            channels.remove(&ride_id);
        }

        tracing::trace!(%ride_id, delivered, "Ride event published");
        delivered
    }

    /// Drop the ride's channel if nobody listens any more
    pub fn release(&self, ride_id: Uuid) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if channels
            .get(&ride_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&ride_id);
        }
    }

    pub fn subscriber_count(&self, ride_id: Uuid) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .get(&ride_id)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// A receiver that gives its channel back to the hub when dropped
pub struct Subscription {
    hub: Arc<RideHub>,
    ride_id: Uuid,
    rx: Option<broadcast::Receiver<RideEvent>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<RideEvent, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    pub fn try_recv(&mut self) -> Result<RideEvent, TryRecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.try_recv(),
            None => Err(TryRecvError::Closed),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.rx.take());
        self.hub.release(self.ride_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> Arc<RideHub> {
        Arc::new(RideHub::new(16))
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber_of_the_ride() {
        let hub = hub();
        let ride = Uuid::new_v4();
        let mut driver = hub.subscribe(ride);
        let mut passenger = hub.subscribe(ride);
        let mut other_ride = hub.subscribe(Uuid::new_v4());

        let event = RideEvent::SeatsChanged { seats_available: 1 };
        assert_eq!(hub.publish(ride, event.clone()), 2);

        assert_eq!(driver.recv().await.unwrap(), event);
        assert_eq!(passenger.recv().await.unwrap(), event);
        assert!(other_ride.try_recv().is_err());
    }

    #[tokio::test]
    async fn terminal_status_closes_channel_after_delivery() {
        let hub = hub();
        let ride = Uuid::new_v4();
        let mut rx = hub.subscribe(ride);

        hub.publish(
            ride,
            RideEvent::StatusChanged {
                status: RideStatus::Completed,
            },
        );

        assert!(matches!(
            rx.recv().await,
            Ok(RideEvent::StatusChanged {
                status: RideStatus::Completed
            })
        ));
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        assert_eq!(hub.subscriber_count(ride), 0);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub = hub();
        let ride = Uuid::new_v4();

        assert_eq!(hub.publish(ride, RideEvent::SeatsChanged { seats_available: 3 }), 0);
        assert_eq!(hub.subscriber_count(ride), 0);
    }

    #[test]
    fn dropped_subscriptions_release_their_channel() {
        let hub = hub();

        for _ in 0..1000 {
            let subscription = hub.subscribe(Uuid::new_v4());
            drop(subscription);
        }

        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn channel_survives_while_someone_listens() {
        let hub = hub();
        let ride = Uuid::new_v4();
        let first = hub.subscribe(ride);
        let second = hub.subscribe(ride);

        drop(first);
        assert_eq!(hub.subscriber_count(ride), 1);

        drop(second);
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(RideEvent::StatusChanged {
            status: RideStatus::Completed,
        })
        .unwrap();

        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["status"], "completed");
    }
}
