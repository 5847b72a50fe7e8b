use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::ride::{self, RideStatus};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::notify::Notification;
use crate::tracking::hub::RideEvent;
use crate::tracking::ledger::{ledger_for, reserve_seats, SeatRequest};
use crate::utils::geo::GeoPoint;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub ride_id: Uuid,
    pub seats: i32,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub prayer_id: i32,
    pub ride_date: NaiveDate,
    pub ride_status: RideStatus,
    pub driver_name: String,
    pub driver_phone: String,
    pub driver_lat: Option<f64>,
    pub driver_lon: Option<f64>,
    pub seats_booked: i32,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl BookingResponse {
    fn new(booking: booking::Model, ride: &ride::Model) -> Self {
        Self {
            id: booking.id,
            ride_id: ride.id,
            prayer_id: ride.prayer_id,
            ride_date: ride.ride_date,
            ride_status: ride.status,
            driver_name: ride.driver_name.clone(),
            driver_phone: ride.driver_phone.clone(),
            driver_lat: ride.current_lat,
            driver_lon: ride.current_lon,
            seats_booked: booking.seats_booked,
            pickup_lat: booking.pickup_lat,
            pickup_lon: booking.pickup_lon,
            status: booking.status,
            created_at: booking.created_at.with_timezone(&Utc),
        }
    }
}

/// Load a booking with its ride and verify the caller made it
async fn find_own_booking(
    state: &AppState,
    booking_id: Uuid,
    passenger: &user::Model,
) -> AppResult<(booking::Model, ride::Model)> {
    let (booking, ride) = booking::Entity::find_by_id(booking_id)
        .find_also_related(ride::Entity)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    if booking.passenger_id != passenger.id {
        return Err(AppError::Forbidden(
            "You can only change your own bookings".to_string(),
        ));
    }

    let ride = ride.ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;
    Ok((booking, ride))
}

/// Book seats on a ride
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(passenger): Extension<user::Model>,
    Json(payload): Json<CreateBookingRequest>,
) -> AppResult<Json<BookingResponse>> {
    let request = SeatRequest {
        ride_id: payload.ride_id,
        seats: payload.seats,
        pickup: GeoPoint::new(payload.pickup_lat, payload.pickup_lon),
    };

    let (ride, booking, ledger) = reserve_seats(&state.db, &passenger, &request).await?;

    state.hub.publish(
        ride.id,
        RideEvent::SeatsChanged {
            seats_available: ledger.free_seats(),
        },
    );
    state
        .notifier
        .send(Notification::booking_created(&ride, &booking));

    Ok(Json(BookingResponse::new(booking, &ride)))
}

/// List the caller's bookings, newest ride first
pub async fn my_bookings(
    State(state): State<AppState>,
    Extension(passenger): Extension<user::Model>,
) -> AppResult<Json<Vec<BookingResponse>>> {
    let bookings = booking::Entity::find()
        .filter(booking::Column::PassengerId.eq(passenger.id))
        .find_also_related(ride::Entity)
        .order_by_desc(booking::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let responses = bookings
        .into_iter()
        .filter_map(|(b, ride)| ride.map(|r| BookingResponse::new(b, &r)))
        .collect();

    Ok(Json(responses))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePickupRequest {
    pub lat: f64,
    pub lon: f64,
}

/// Move the pickup point, e.g. from the passenger's live position
pub async fn update_pickup(
    State(state): State<AppState>,
    Extension(passenger): Extension<user::Model>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<UpdatePickupRequest>,
) -> AppResult<Json<BookingResponse>> {
    let (booking, ride) = find_own_booking(&state, booking_id, &passenger).await?;

    let pickup = GeoPoint::new(payload.lat, payload.lon);
    if !pickup.is_valid() {
        return Err(AppError::BadRequest("Invalid pickup coordinates".to_string()));
    }

    if booking.status != BookingStatus::Accepted || ride.status.is_terminal() {
        return Err(AppError::BadRequest(
            "Pickup can only change while the booking is active".to_string(),
        ));
    }

    let mut active: booking::ActiveModel = booking.into();
    active.pickup_lat = Set(pickup.lat);
    active.pickup_lon = Set(pickup.lon);
    let updated = active.update(&state.db).await?;

    state.hub.publish(
        ride.id,
        RideEvent::PickupUpdated {
            booking_id: updated.id,
            lat: updated.pickup_lat,
            lon: updated.pickup_lon,
        },
    );

    Ok(Json(BookingResponse::new(updated, &ride)))
}

/// Cancel a booking and release its seats
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(passenger): Extension<user::Model>,
    Path(booking_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let (booking, ride) = find_own_booking(&state, booking_id, &passenger).await?;

    if booking.status == BookingStatus::Cancelled {
        return Err(AppError::Conflict("Booking is already cancelled".to_string()));
    }

    if ride.status == RideStatus::Completed {
        return Err(AppError::BadRequest(
            "Cannot cancel bookings for finished rides".to_string(),
        ));
    }

    let mut active: booking::ActiveModel = booking.into();
    active.status = Set(BookingStatus::Cancelled);
    let cancelled = active.update(&state.db).await?;

    let ledger = ledger_for(&state.db, &ride).await?;
    tracing::info!(
        ride_id = %ride.id,
        booking_id = %cancelled.id,
        free = ledger.free_seats(),
        "Booking cancelled"
    );

    state.hub.publish(
        ride.id,
        RideEvent::SeatsChanged {
            seats_available: ledger.free_seats(),
        },
    );
    state
        .notifier
        .send(Notification::booking_cancelled(&ride, &cancelled));

    Ok(Json(serde_json::json!({
        "message": "Booking cancelled",
        "seats_available": ledger.free_seats(),
    })))
}
