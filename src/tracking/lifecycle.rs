use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::ride::{self, RideStatus};
use crate::error::{AppError, AppResult};
use crate::notify::Notification;
use crate::tracking::geofence::{GeofenceEvent, GeofenceState, GeolocationError, PositionSample};
use crate::tracking::hub::RideEvent;
use crate::utils::geo::GeoPoint;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Arrived,
    EndedByDriver,
}

#[derive(Debug, Serialize)]
pub struct PositionOutcome {
    pub ride_id: Uuid,
    pub status: RideStatus,
    pub distance_m: f64,
    pub geofence: Option<GeofenceState>,
}

/// Finished rides take no more positions or tracking reports
pub fn ensure_tracking(status: RideStatus) -> AppResult<()> {
    if status.is_terminal() {
        return Err(AppError::BadRequest("Ride is already finished".to_string()));
    }
    Ok(())
}

/// The first fix starts the ride
pub fn status_after_position(status: RideStatus) -> AppResult<RideStatus> {
    ensure_tracking(status).map(|_| RideStatus::Active)
}

pub fn ensure_cancellable(status: RideStatus) -> AppResult<()> {
    if status == RideStatus::Completed {
        return Err(AppError::BadRequest(
            "Completed rides cannot be cancelled".to_string(),
        ));
    }
    Ok(())
}

async fn lock_ride(txn: &DatabaseTransaction, ride_id: Uuid) -> AppResult<ride::Model> {
    ride::Entity::find_by_id(ride_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))
}

async fn accepted_passengers<C: ConnectionTrait>(db: &C, ride_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(booking::Entity::find()
        .filter(booking::Column::RideId.eq(ride_id))
        .filter(booking::Column::Status.eq(BookingStatus::Accepted))
        .all(db)
        .await?
        .into_iter()
        .map(|b| b.passenger_id)
        .collect())
}

/// Stop tracking a ride that ended and tell its subscribers
pub fn release_ride(state: &AppState, ride_id: Uuid, status: RideStatus) {
    state.tracker.forget(ride_id);
    state
        .hub
        .publish(ride_id, RideEvent::StatusChanged { status });
}

/// Store the driver's latest fix, fan it out and feed the geofence.
///
/// The ride row is locked for the write so a concurrent end or cancel
/// cannot be overwritten.
pub async fn record_position(
    state: &AppState,
    ride_id: Uuid,
    sample: PositionSample,
) -> AppResult<PositionOutcome> {
    let point = sample.point();
    if !point.is_valid() {
        return Err(AppError::BadRequest("Invalid coordinates".to_string()));
    }
    let sample = sample.received_at(Utc::now());

    let txn = state.db.begin().await?;
    let ride = lock_ride(&txn, ride_id).await?;
    let status = status_after_position(ride.status)?;

    let mut active: ride::ActiveModel = ride.into();
    active.current_lat = Set(Some(point.lat));
    active.current_lon = Set(Some(point.lon));
    active.status = Set(status);
    let mut updated = active.update(&txn).await?;
    txn.commit().await?;

    let geofence = state.config.geofence;
    let destination = GeoPoint::new(geofence.destination_lat, geofence.destination_lon);
    let distance_m = point.distance_to(&destination);

    state.hub.publish(
        ride_id,
        RideEvent::DriverPosition {
            lat: point.lat,
            lon: point.lon,
            distance_m,
            at: sample.timestamp,
        },
    );

    let event = state.tracker.observe(ride_id, &sample);
    tracing::debug!(%ride_id, distance_m, ?event, "Driver position recorded");

    let geofence_state = state.tracker.state(ride_id);

    if matches!(event, GeofenceEvent::Arrived { .. }) {
        if let Some(completed) = complete_ride(state, ride_id, CompletionReason::Arrived).await? {
            updated = completed;
        }
    }

    Ok(PositionOutcome {
        ride_id,
        status: updated.status,
        distance_m,
        geofence: geofence_state,
    })
}

pub fn record_position_error(
    state: &AppState,
    ride: &ride::Model,
    error: GeolocationError,
) -> AppResult<()> {
    ensure_tracking(ride.status)?;

    tracing::info!(ride_id = %ride.id, ?error, "Driver geolocation failed, arrival detection stopped");
    state.tracker.fail(ride.id, error);
    Ok(())
}

/// Move a ride to `completed`.
///
/// Returns `None` when the ride was already finished, so concurrent
/// triggers complete it exactly once.
pub async fn complete_ride(
    state: &AppState,
    ride_id: Uuid,
    reason: CompletionReason,
) -> AppResult<Option<ride::Model>> {
    let txn = state.db.begin().await?;
    let ride = lock_ride(&txn, ride_id).await?;

    if ride.status.is_terminal() {
        return Ok(None);
    }

    let mut active: ride::ActiveModel = ride.into();
    active.status = Set(RideStatus::Completed);
    let completed = active.update(&txn).await?;
    let passengers = accepted_passengers(&txn, ride_id).await?;

    txn.commit().await?;

    tracing::info!(%ride_id, ?reason, "Ride completed");

    release_ride(state, ride_id, RideStatus::Completed);
    state
        .notifier
        .send(Notification::ride_completed(&completed, passengers));

    Ok(Some(completed))
}

/// Remove a ride together with its bookings and tell the passengers
pub async fn cancel_ride(state: &AppState, ride_id: Uuid) -> AppResult<ride::Model> {
    let txn = state.db.begin().await?;
    let ride = lock_ride(&txn, ride_id).await?;
    ensure_cancellable(ride.status)?;

    let passengers = accepted_passengers(&txn, ride_id).await?;

    booking::Entity::delete_many()
        .filter(booking::Column::RideId.eq(ride_id))
        .exec(&txn)
        .await?;
    ride::Entity::delete_by_id(ride_id).exec(&txn).await?;

    txn.commit().await?;

    tracing::info!(%ride_id, passengers = passengers.len(), "Ride cancelled");

    release_ride(state, ride_id, RideStatus::Cancelled);
    state
        .notifier
        .send(Notification::ride_cancelled(&ride, passengers));

    Ok(ride::Model {
        status: RideStatus::Cancelled,
        ..ride
    })
}
