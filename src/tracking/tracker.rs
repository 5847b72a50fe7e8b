use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::GeofenceConfig;
use crate::tracking::geofence::{
    GeofenceEvent, GeofenceMonitor, GeofenceState, GeolocationError, PositionSample,
};

/// Rides that stop reporting for this long lose their monitor
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct Tracked {
    monitor: GeofenceMonitor,
    touched: Instant,
}

/// One geofence monitor per ride currently being driven
pub struct RideTracker {
    config: GeofenceConfig,
    monitors: Mutex<HashMap<Uuid, Tracked>>,
}

impl RideTracker {
    pub fn new(config: GeofenceConfig) -> Self {
        Self {
            config,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    fn with_monitor<R>(&self, ride_id: Uuid, f: impl FnOnce(&mut GeofenceMonitor) -> R) -> R {
        let now = Instant::now();
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        sweep(&mut monitors, now);

        let tracked = monitors.entry(ride_id).or_insert_with(|| Tracked {
            monitor: GeofenceMonitor::new(&self.config),
            touched: now,
        });
        tracked.touched = now;
        f(&mut tracked.monitor)
    }

    pub fn observe(&self, ride_id: Uuid, sample: &PositionSample) -> GeofenceEvent {
        self.with_monitor(ride_id, |monitor| monitor.observe(sample))
    }

    pub fn fail(&self, ride_id: Uuid, error: GeolocationError) {
        self.with_monitor(ride_id, |monitor| monitor.fail(error));
    }

    pub fn state(&self, ride_id: Uuid) -> Option<GeofenceState> {
        let monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors.get(&ride_id).map(|t| t.monitor.state())
    }

    /// Drop the monitor once the ride is over
    pub fn forget(&self, ride_id: Uuid) {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors.remove(&ride_id);
    }

    /// Returns how many monitors were dropped
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        sweep(&mut monitors, now)
    }

    pub fn len(&self) -> usize {
        self.monitors.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(monitors: &mut HashMap<Uuid, Tracked>, now: Instant) -> usize {
    let before = monitors.len();
    monitors.retain(|_, t| now.saturating_duration_since(t.touched) < IDLE_TIMEOUT);
    let evicted = before - monitors.len();
    if evicted > 0 {
        tracing::debug!(evicted, "Idle geofence monitors dropped");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;

    fn sample(lat: f64, lon: f64, offset_secs: i64) -> PositionSample {
        PositionSample {
            lat,
            lon,
            accuracy: None,
            timestamp: Utc::now() + ChronoDuration::seconds(offset_secs),
        }
    }

    #[test]
    fn monitors_are_isolated_per_ride() {
        let tracker = RideTracker::new(GeofenceConfig::default());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        tracker.fail(b, GeolocationError::PermissionDenied);

        assert!(matches!(
            tracker.observe(a, &sample(49.6857, 8.5936, 0)),
            GeofenceEvent::Arrived { .. }
        ));
        assert_eq!(
            tracker.observe(b, &sample(49.6857, 8.5936, 0)),
            GeofenceEvent::Ignored
        );
        assert_eq!(tracker.state(b), Some(GeofenceState::Stopped));
    }

    #[test]
    fn approach_then_arrival_with_defaults() {
        let tracker = RideTracker::new(GeofenceConfig::default());
        let ride = Uuid::new_v4();

        assert!(matches!(
            tracker.observe(ride, &sample(49.700, 8.600, 0)),
            GeofenceEvent::Outside { .. }
        ));
        assert!(matches!(
            tracker.observe(ride, &sample(49.6857, 8.5936, 5)),
            GeofenceEvent::Arrived { .. }
        ));
    }

    #[test]
    fn permission_denied_ride_never_completes() {
        let tracker = RideTracker::new(GeofenceConfig::default());
        let ride = Uuid::new_v4();

        tracker.fail(ride, GeolocationError::PermissionDenied);
        for i in 0..5 {
            assert_eq!(
                tracker.observe(ride, &sample(49.68559, 8.59348, i)),
                GeofenceEvent::Ignored
            );
        }
    }

    #[test]
    fn forget_resets_ride() {
        let tracker = RideTracker::new(GeofenceConfig::default());
        let ride = Uuid::new_v4();

        tracker.observe(ride, &sample(49.700, 8.600, 0));
        assert_eq!(tracker.state(ride), Some(GeofenceState::Approaching));

        tracker.forget(ride);
        assert_eq!(tracker.state(ride), None);
    }

    #[test]
    fn idle_monitors_are_evicted() {
        let tracker = RideTracker::new(GeofenceConfig::default());
        for _ in 0..3 {
            tracker.observe(Uuid::new_v4(), &sample(49.700, 8.600, 0));
        }

        assert_eq!(tracker.evict_idle(Instant::now()), 0);
        assert_eq!(tracker.len(), 3);

        let later = Instant::now() + IDLE_TIMEOUT + Duration::from_secs(1);
        assert_eq!(tracker.evict_idle(later), 3);
        assert!(tracker.is_empty());
    }
}
