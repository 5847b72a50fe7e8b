use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::PushConfig;
use crate::entities::{booking, prayer, ride};

#[derive(Debug, Clone, PartialEq)]
pub enum Audience {
    Users(Vec<Uuid>),
    Segment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub heading: String,
    pub body: String,
    pub audience: Audience,
}

impl Notification {
    pub fn booking_created(ride: &ride::Model, booking: &booking::Model) -> Self {
        Self {
            heading: "New booking".to_string(),
            body: format!(
                "{} booked {} seat(s) on your ride of {}",
                booking.passenger_name, booking.seats_booked, ride.ride_date
            ),
            audience: Audience::Users(vec![ride.driver_id]),
        }
    }

    pub fn booking_cancelled(ride: &ride::Model, booking: &booking::Model) -> Self {
        Self {
            heading: "Booking cancelled".to_string(),
            body: format!(
                "{} cancelled {} seat(s) on your ride of {}",
                booking.passenger_name, booking.seats_booked, ride.ride_date
            ),
            audience: Audience::Users(vec![ride.driver_id]),
        }
    }

    pub fn ride_cancelled(ride: &ride::Model, passengers: Vec<Uuid>) -> Self {
        Self {
            heading: "Ride cancelled".to_string(),
            body: format!(
                "{} cancelled the ride of {}. Please look for another ride.",
                ride.driver_name, ride.ride_date
            ),
            audience: Audience::Users(passengers),
        }
    }

    pub fn ride_completed(ride: &ride::Model, passengers: Vec<Uuid>) -> Self {
        Self {
            heading: "You have arrived".to_string(),
            body: format!("Your ride with {} has reached the mosque.", ride.driver_name),
            audience: Audience::Users(passengers),
        }
    }

    pub fn prayer_reminder(prayer: &prayer::Model, date: NaiveDate, lead_minutes: i64) -> Self {
        Self {
            heading: format!("{} in {} minutes", prayer.name, lead_minutes),
            body: format!(
                "{} starts at {} on {}. Offer or book a ride now.",
                prayer.name,
                prayer.prayer_time.format("%H:%M"),
                date
            ),
            audience: Audience::Segment("approved".to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    config: Option<Arc<PushConfig>>,
}

impl Notifier {
    pub fn new(config: Option<PushConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: config.map(Arc::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Request body understood by the provider
    pub fn payload(app_id: &str, notification: &Notification) -> Value {
        let mut payload = json!({
            "app_id": app_id,
            "headings": { "en": notification.heading },
            "contents": { "en": notification.body },
        });

        match &notification.audience {
            Audience::Users(ids) => {
                payload["include_external_user_ids"] =
                    json!(ids.iter().map(Uuid::to_string).collect::<Vec<_>>());
            }
            Audience::Segment(segment) => {
                payload["included_segments"] = json!([segment]);
            }
        }

        payload
    }

    /// Spawn the delivery and return immediately
    pub fn send(&self, notification: Notification) {
        if matches!(&notification.audience, Audience::Users(ids) if ids.is_empty()) {
            return;
        }

        let Some(config) = self.config.clone() else {
            tracing::debug!(heading = %notification.heading, "Push disabled, notification skipped");
            return;
        };

        let client = self.client.clone();
        tokio::spawn(async move {
            let body = Self::payload(&config.app_id, &notification);
            let result = client
                .post(&config.api_url)
                .bearer_auth(&config.api_key)
                .json(&body)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match result {
                Ok(_) => tracing::debug!(heading = %notification.heading, "Notification sent"),
                Err(e) => tracing::warn!(
                    heading = %notification.heading,
                    error = %e,
                    "Failed to send notification"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, Utc};

    use super::*;
    use crate::entities::ride::RideStatus;

    fn ride() -> ride::Model {
        ride::Model {
            id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            driver_name: "Yusuf".to_string(),
            driver_phone: "+49 170 0000000".to_string(),
            prayer_id: 1,
            ride_date: NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
            seats_total: 3,
            start_lat: 49.7,
            start_lon: 8.6,
            current_lat: None,
            current_lon: None,
            status: RideStatus::Open,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn user_audience_payload() {
        let ride = ride();
        let passenger = Uuid::new_v4();
        let payload = Notifier::payload(
            "app",
            &Notification::ride_completed(&ride, vec![passenger]),
        );

        assert_eq!(payload["app_id"], "app");
        assert_eq!(payload["include_external_user_ids"][0], passenger.to_string());
        assert!(payload.get("included_segments").is_none());
    }

    #[test]
    fn reminder_targets_segment() {
        let prayer = prayer::Model {
            id: 2,
            name: "Dhuhr".to_string(),
            prayer_time: NaiveTime::from_hms_opt(13, 15, 0).unwrap(),
            active: true,
        };
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let notification = Notification::prayer_reminder(&prayer, date, 15);
        let payload = Notifier::payload("app", &notification);

        assert_eq!(notification.heading, "Dhuhr in 15 minutes");
        assert!(notification.body.contains("13:15"));
        assert_eq!(payload["included_segments"][0], "approved");
    }

    #[test]
    fn disabled_notifier_skips_silently() {
        let notifier = Notifier::new(None);
        assert!(!notifier.is_enabled());
        // No runtime needed: nothing is spawned
        notifier.send(Notification::ride_cancelled(&ride(), vec![Uuid::new_v4()]));
    }
}
