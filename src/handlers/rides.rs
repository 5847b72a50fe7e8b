use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::ride::{self, RideStatus};
use crate::entities::{prayer, user};
use crate::error::{AppError, AppResult};
use crate::tracking::geofence::{GeofenceState, GeolocationError, PositionSample};
use crate::tracking::ledger::{booked_seats_by_ride, ledger_for, SeatLedger};
use crate::tracking::lifecycle::{self, CompletionReason, PositionOutcome};
use crate::utils::geo::GeoPoint;
use crate::AppState;

pub const MAX_SEATS: i32 = 8;

#[derive(Debug, Serialize)]
pub struct RideResponse {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub driver_phone: String,
    pub prayer_id: i32,
    pub ride_date: NaiveDate,
    pub seats_total: i32,
    pub seats_available: i32,
    pub start_lat: f64,
    pub start_lon: f64,
    pub current_lat: Option<f64>,
    pub current_lon: Option<f64>,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
}

impl RideResponse {
    pub fn new(ride: ride::Model, ledger: SeatLedger) -> Self {
        Self {
            id: ride.id,
            driver_id: ride.driver_id,
            driver_name: ride.driver_name,
            driver_phone: ride.driver_phone,
            prayer_id: ride.prayer_id,
            ride_date: ride.ride_date,
            seats_total: ride.seats_total,
            seats_available: ledger.free_seats(),
            start_lat: ride.start_lat,
            start_lon: ride.start_lon,
            current_lat: ride.current_lat,
            current_lon: ride.current_lon,
            status: ride.status,
            created_at: ride.created_at.with_timezone(&Utc),
        }
    }
}

/// Attach seat counts to a batch of rides
pub(crate) async fn with_seats(
    state: &AppState,
    rides: Vec<ride::Model>,
) -> AppResult<Vec<RideResponse>> {
    let booked = booked_seats_by_ride(&state.db, rides.iter().map(|r| r.id).collect()).await?;

    Ok(rides
        .into_iter()
        .map(|r| {
            let ledger = SeatLedger {
                seats_total: r.seats_total,
                seats_booked: booked.get(&r.id).copied().unwrap_or(0),
            };
            RideResponse::new(r, ledger)
        })
        .collect())
}

async fn find_ride(state: &AppState, ride_id: Uuid) -> AppResult<ride::Model> {
    ride::Entity::find_by_id(ride_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))
}

/// Load a ride and verify the caller drives it
async fn find_own_ride(state: &AppState, ride_id: Uuid, user: &user::Model) -> AppResult<ride::Model> {
    let ride = find_ride(state, ride_id).await?;

    if ride.driver_id != user.id {
        return Err(AppError::Forbidden(
            "You are not the driver of this ride".to_string(),
        ));
    }

    Ok(ride)
}

// ============ Offering rides ============

#[derive(Debug, Deserialize)]
pub struct CreateRideRequest {
    pub prayer_id: i32,
    pub ride_date: NaiveDate,
    pub seats_total: i32,
    pub start_lat: f64,
    pub start_lon: f64,
}

/// Offer a ride to a prayer
pub async fn create_ride(
    State(state): State<AppState>,
    Extension(driver): Extension<user::Model>,
    Json(payload): Json<CreateRideRequest>,
) -> AppResult<Json<RideResponse>> {
    if !(1..=MAX_SEATS).contains(&payload.seats_total) {
        return Err(AppError::BadRequest(format!(
            "Seats must be between 1 and {}",
            MAX_SEATS
        )));
    }

    if !GeoPoint::new(payload.start_lat, payload.start_lon).is_valid() {
        return Err(AppError::BadRequest("Invalid start coordinates".to_string()));
    }

    if payload.ride_date < state.config.local_today() {
        return Err(AppError::BadRequest("Cannot offer rides in the past".to_string()));
    }

    let prayer = prayer::Entity::find_by_id(payload.prayer_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid prayer".to_string()))?;

    if !prayer.active {
        return Err(AppError::BadRequest(format!("{} is not offered", prayer.name)));
    }

    let existing = ride::Entity::find()
        .filter(ride::Column::DriverId.eq(driver.id))
        .filter(ride::Column::PrayerId.eq(prayer.id))
        .filter(ride::Column::RideDate.eq(payload.ride_date))
        .filter(ride::Column::Status.ne(RideStatus::Completed))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(
            "You already offer a ride for this prayer".to_string(),
        ));
    }

    let ride = ride::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(driver.id),
        driver_name: Set(driver.name.clone()),
        driver_phone: Set(driver.phone.clone()),
        prayer_id: Set(prayer.id),
        ride_date: Set(payload.ride_date),
        seats_total: Set(payload.seats_total),
        start_lat: Set(payload.start_lat),
        start_lon: Set(payload.start_lon),
        current_lat: Set(None),
        current_lon: Set(None),
        status: Set(RideStatus::Open),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(ride_id = %ride.id, prayer = %prayer.name, "Ride offered");

    let ledger = SeatLedger::from_bookings(ride.seats_total, std::iter::empty());
    Ok(Json(RideResponse::new(ride, ledger)))
}

#[derive(Debug, Deserialize)]
pub struct RideFilter {
    pub prayer_id: Option<i32>,
    pub date: Option<NaiveDate>,
}

/// List rides that still accept bookings
pub async fn list_rides(
    State(state): State<AppState>,
    Query(filter): Query<RideFilter>,
) -> AppResult<Json<Vec<RideResponse>>> {
    let date = filter.date.unwrap_or_else(|| state.config.local_today());

    let mut query = ride::Entity::find()
        .filter(ride::Column::RideDate.eq(date))
        .filter(ride::Column::Status.ne(RideStatus::Completed))
        .filter(ride::Column::Status.ne(RideStatus::Cancelled));

    if let Some(prayer_id) = filter.prayer_id {
        query = query.filter(ride::Column::PrayerId.eq(prayer_id));
    }

    let rides = query
        .order_by_asc(ride::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(with_seats(&state, rides).await?))
}

/// List rides offered by the caller
pub async fn my_rides(
    State(state): State<AppState>,
    Extension(driver): Extension<user::Model>,
) -> AppResult<Json<Vec<RideResponse>>> {
    let rides = ride::Entity::find()
        .filter(ride::Column::DriverId.eq(driver.id))
        .order_by_desc(ride::Column::RideDate)
        .all(&state.db)
        .await?;

    Ok(Json(with_seats(&state, rides).await?))
}

/// Ride details including the driver's latest position
pub async fn get_ride(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<RideResponse>> {
    let ride = find_ride(&state, ride_id).await?;
    let ledger = ledger_for(&state.db, &ride).await?;

    Ok(Json(RideResponse::new(ride, ledger)))
}

#[derive(Debug, Serialize)]
pub struct PassengerPickupInfo {
    pub booking_id: Uuid,
    pub passenger_id: Uuid,
    pub passenger_name: String,
    pub passenger_phone: String,
    pub seats_booked: i32,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
}

impl From<booking::Model> for PassengerPickupInfo {
    fn from(b: booking::Model) -> Self {
        Self {
            booking_id: b.id,
            passenger_id: b.passenger_id,
            passenger_name: b.passenger_name,
            passenger_phone: b.passenger_phone,
            seats_booked: b.seats_booked,
            pickup_lat: b.pickup_lat,
            pickup_lon: b.pickup_lon,
        }
    }
}

/// Pickup points of the accepted passengers, for the driver
pub async fn ride_passengers(
    State(state): State<AppState>,
    Extension(driver): Extension<user::Model>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<Vec<PassengerPickupInfo>>> {
    let ride = find_own_ride(&state, ride_id, &driver).await?;

    let bookings = booking::Entity::find()
        .filter(booking::Column::RideId.eq(ride.id))
        .filter(booking::Column::Status.eq(BookingStatus::Accepted))
        .order_by_asc(booking::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(bookings.into_iter().map(PassengerPickupInfo::from).collect()))
}

// ============ Driving ============

/// Report a position sample from the driver's device
pub async fn report_position(
    State(state): State<AppState>,
    Extension(driver): Extension<user::Model>,
    Path(ride_id): Path<Uuid>,
    Json(sample): Json<PositionSample>,
) -> AppResult<Json<PositionOutcome>> {
    let ride = find_own_ride(&state, ride_id, &driver).await?;
    let outcome = lifecycle::record_position(&state, ride.id, sample).await?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct PositionErrorRequest {
    pub code: GeolocationError,
}

#[derive(Debug, Serialize)]
pub struct TrackingStatus {
    pub ride_id: Uuid,
    pub geofence: Option<GeofenceState>,
}

/// The driver's device could not deliver positions
pub async fn report_position_error(
    State(state): State<AppState>,
    Extension(driver): Extension<user::Model>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<PositionErrorRequest>,
) -> AppResult<Json<TrackingStatus>> {
    let ride = find_own_ride(&state, ride_id, &driver).await?;
    lifecycle::record_position_error(&state, &ride, payload.code)?;

    Ok(Json(TrackingStatus {
        ride_id: ride.id,
        geofence: state.tracker.state(ride.id),
    }))
}

/// End the ride by hand
pub async fn end_ride(
    State(state): State<AppState>,
    Extension(driver): Extension<user::Model>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<RideResponse>> {
    let ride = find_own_ride(&state, ride_id, &driver).await?;

    let ride = match lifecycle::complete_ride(&state, ride.id, CompletionReason::EndedByDriver).await? {
        Some(completed) => completed,
        // Already finished; report the current state
        None => find_ride(&state, ride.id).await?,
    };
    let ledger = ledger_for(&state.db, &ride).await?;

    Ok(Json(RideResponse::new(ride, ledger)))
}

/// Cancel the ride; its bookings are removed with it
pub async fn cancel_ride(
    State(state): State<AppState>,
    Extension(driver): Extension<user::Model>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let ride = find_own_ride(&state, ride_id, &driver).await?;
    let cancelled = lifecycle::cancel_ride(&state, ride.id).await?;

    Ok(Json(serde_json::json!({
        "message": "Ride cancelled",
        "id": cancelled.id,
        "status": cancelled.status,
    })))
}
