use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GeofenceConfig;
use crate::utils::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }

    /// Device clocks drift; a fix can never be newer than its arrival
    pub fn received_at(mut self, now: DateTime<Utc>) -> Self {
        self.timestamp = self.timestamp.min(now);
        self
    }
}

/// Error codes reported by the device's geolocation API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeolocationError {
    PermissionDenied,
    Timeout,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GeofenceState {
    Approaching,
    ArrivalPending { consecutive: u32 },
    Arrived,
    /// Geolocation failed; nothing will trigger any more
    Stopped,
}

/// Outcome of feeding one sample to the monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeofenceEvent {
    Outside { distance_m: f64 },
    Pending { distance_m: f64, consecutive: u32 },
    /// Emitted exactly once per monitor
    Arrived { distance_m: f64 },
    /// Sample was dropped: stale, invalid, or the monitor is finished
    Ignored,
}

#[derive(Debug, Clone)]
pub struct GeofenceMonitor {
    center: GeoPoint,
    radius_m: f64,
    confirm_samples: u32,
    state: GeofenceState,
    last_sample_at: Option<DateTime<Utc>>,
}

impl GeofenceMonitor {
    pub fn new(config: &GeofenceConfig) -> Self {
        Self {
            center: GeoPoint::new(config.destination_lat, config.destination_lon),
            radius_m: config.radius_m,
            confirm_samples: config.confirm_samples.max(1),
            state: GeofenceState::Approaching,
            last_sample_at: None,
        }
    }

    pub fn state(&self) -> GeofenceState {
        self.state
    }

    /// Reports arrival once `confirm_samples` consecutive fixes fall inside
    /// the radius, and never again afterwards
    pub fn observe(&mut self, sample: &PositionSample) -> GeofenceEvent {
        if matches!(self.state, GeofenceState::Arrived | GeofenceState::Stopped) {
            return GeofenceEvent::Ignored;
        }

        let point = sample.point();
        if !point.is_valid() {
            return GeofenceEvent::Ignored;
        }

        // Out-of-order deliveries must not count towards confirmation
        if self.last_sample_at.is_some_and(|last| sample.timestamp <= last) {
            return GeofenceEvent::Ignored;
        }
        self.last_sample_at = Some(sample.timestamp);

        let distance_m = point.distance_to(&self.center);
        if distance_m >= self.radius_m {
            self.state = GeofenceState::Approaching;
            return GeofenceEvent::Outside { distance_m };
        }

        let consecutive = match self.state {
            GeofenceState::ArrivalPending { consecutive } => consecutive + 1,
            _ => 1,
        };

        if consecutive >= self.confirm_samples {
            self.state = GeofenceState::Arrived;
            GeofenceEvent::Arrived { distance_m }
        } else {
            self.state = GeofenceState::ArrivalPending { consecutive };
            GeofenceEvent::Pending {
                distance_m,
                consecutive,
            }
        }
    }

    /// Stop silently; a ride with a stopped monitor can only be ended by hand
    pub fn fail(&mut self, error: GeolocationError) {
        if self.state != GeofenceState::Arrived {
            tracing::debug!(?error, "Geofence monitor stopped");
            self.state = GeofenceState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rstest::rstest;

    use super::*;

    fn monitor(confirm_samples: u32) -> GeofenceMonitor {
        GeofenceMonitor::new(&GeofenceConfig {
            confirm_samples,
            ..GeofenceConfig::default()
        })
    }

    fn samples(points: &[(f64, f64)]) -> Vec<PositionSample> {
        let start = Utc::now();
        points
            .iter()
            .enumerate()
            .map(|(i, &(lat, lon))| PositionSample {
                lat,
                lon,
                accuracy: Some(10.0),
                timestamp: start + Duration::seconds(5 * i as i64),
            })
            .collect()
    }

    fn arrivals(monitor: &mut GeofenceMonitor, samples: &[PositionSample]) -> Vec<usize> {
        samples
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(monitor.observe(s), GeofenceEvent::Arrived { .. }))
            .map(|(i, _)| i)
            .collect()
    }

    const FAR: (f64, f64) = (49.700, 8.600);
    const NEAR: (f64, f64) = (49.6857, 8.5936);

    #[test]
    fn single_sample_trigger_fires_once() {
        let mut monitor = monitor(1);
        let stream = samples(&[FAR, NEAR, NEAR, NEAR]);

        assert!(matches!(monitor.observe(&stream[0]), GeofenceEvent::Outside { .. }));
        assert_eq!(arrivals(&mut monitor, &stream[1..]), vec![0]);
        assert_eq!(monitor.state(), GeofenceState::Arrived);
    }

    #[test]
    fn debounced_trigger_needs_consecutive_samples() {
        let mut monitor = monitor(2);
        let stream = samples(&[FAR, NEAR, NEAR, NEAR]);

        assert_eq!(arrivals(&mut monitor, &stream), vec![2]);
    }

    #[test]
    fn glitch_inside_radius_does_not_finish_ride() {
        let mut monitor = monitor(2);
        let stream = samples(&[FAR, NEAR, FAR, FAR]);

        assert!(arrivals(&mut monitor, &stream).is_empty());
        assert_eq!(monitor.state(), GeofenceState::Approaching);
    }

    #[test]
    fn leaving_radius_resets_confirmation() {
        let mut monitor = monitor(3);
        let stream = samples(&[NEAR, NEAR, FAR, NEAR, NEAR, NEAR]);

        assert_eq!(arrivals(&mut monitor, &stream), vec![5]);
    }

    #[rstest]
    #[case(GeolocationError::PermissionDenied)]
    #[case(GeolocationError::Timeout)]
    #[case(GeolocationError::Unavailable)]
    fn failure_stops_monitor_for_good(#[case] error: GeolocationError) {
        let mut monitor = monitor(1);
        monitor.fail(error);

        let stream = samples(&[NEAR, NEAR]);
        assert!(arrivals(&mut monitor, &stream).is_empty());
        assert_eq!(monitor.state(), GeofenceState::Stopped);
    }

    #[test]
    fn failure_after_arrival_keeps_arrived() {
        let mut monitor = monitor(1);
        monitor.observe(&samples(&[NEAR])[0]);
        monitor.fail(GeolocationError::Timeout);

        assert_eq!(monitor.state(), GeofenceState::Arrived);
    }

    #[test]
    fn stale_samples_are_ignored() {
        let mut monitor = monitor(2);
        let stream = samples(&[NEAR, NEAR]);

        monitor.observe(&stream[1]);
        assert_eq!(monitor.observe(&stream[0]), GeofenceEvent::Ignored);
        assert_eq!(monitor.state(), GeofenceState::ArrivalPending { consecutive: 1 });
    }

    #[test]
    fn skewed_clock_cannot_block_arrival() {
        let mut monitor = monitor(1);
        let now = Utc::now();
        let ahead = PositionSample {
            lat: FAR.0,
            lon: FAR.1,
            accuracy: None,
            timestamp: now + Duration::days(365),
        };
        let at_mosque = PositionSample {
            lat: 49.68559,
            lon: 8.59348,
            accuracy: None,
            timestamp: now + Duration::seconds(1),
        };

        monitor.observe(&ahead.received_at(now));
        let event = monitor.observe(&at_mosque.received_at(now + Duration::seconds(5)));

        assert!(matches!(event, GeofenceEvent::Arrived { .. }), "{event:?}");
    }

    #[test]
    fn received_at_keeps_past_timestamps() {
        let now = Utc::now();
        let sample = samples(&[NEAR])[0];
        let later = now + Duration::minutes(1);

        assert_eq!(sample.received_at(later).timestamp, sample.timestamp);
    }

    #[test]
    fn default_config_completes_on_first_fix_inside() {
        let mut monitor = GeofenceMonitor::new(&GeofenceConfig::default());
        let stream = samples(&[FAR, NEAR, NEAR]);

        assert!(matches!(monitor.observe(&stream[0]), GeofenceEvent::Outside { .. }));
        assert!(matches!(monitor.observe(&stream[1]), GeofenceEvent::Arrived { .. }));
        assert_eq!(monitor.observe(&stream[2]), GeofenceEvent::Ignored);
    }

    #[test]
    fn invalid_coordinates_are_ignored() {
        let mut monitor = monitor(1);
        let mut sample = samples(&[NEAR])[0];
        sample.lat = f64::NAN;

        assert_eq!(monitor.observe(&sample), GeofenceEvent::Ignored);
        assert_eq!(monitor.state(), GeofenceState::Approaching);
    }
}
