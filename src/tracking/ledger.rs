use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::{ride, user};
use crate::error::{AppError, AppResult};
use crate::utils::geo::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatLedger {
    pub seats_total: i32,
    pub seats_booked: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeatError {
    #[error("Must book at least 1 seat")]
    NonPositive,
    #[error("Only {available} seats available")]
    Insufficient { requested: i32, available: i32 },
}

impl From<SeatError> for AppError {
    fn from(err: SeatError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl SeatLedger {
    pub fn from_bookings<'a>(
        seats_total: i32,
        bookings: impl IntoIterator<Item = &'a booking::Model>,
    ) -> Self {
        let seats_booked = bookings
            .into_iter()
            .filter(|b| b.status == BookingStatus::Accepted)
            .map(|b| b.seats_booked)
            .sum();

        Self {
            seats_total,
            seats_booked,
        }
    }

    /// Never negative, even if an admin shrank the ride below its bookings
    pub fn free_seats(&self) -> i32 {
        (self.seats_total - self.seats_booked).max(0)
    }

    pub fn check(&self, requested: i32) -> Result<(), SeatError> {
        if requested <= 0 {
            return Err(SeatError::NonPositive);
        }

        let available = self.free_seats();
        if requested > available {
            return Err(SeatError::Insufficient {
                requested,
                available,
            });
        }

        Ok(())
    }
}

/// Seats booked per ride, for listing many rides with a single query
pub async fn booked_seats_by_ride<C: ConnectionTrait>(
    db: &C,
    ride_ids: Vec<Uuid>,
) -> AppResult<HashMap<Uuid, i32>> {
    if ride_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let bookings = booking::Entity::find()
        .filter(booking::Column::RideId.is_in(ride_ids))
        .filter(booking::Column::Status.eq(BookingStatus::Accepted))
        .all(db)
        .await?;

    let mut booked = HashMap::new();
    for b in bookings {
        *booked.entry(b.ride_id).or_insert(0) += b.seats_booked;
    }

    Ok(booked)
}

pub async fn ledger_for<C: ConnectionTrait>(db: &C, ride: &ride::Model) -> AppResult<SeatLedger> {
    let bookings = booking::Entity::find()
        .filter(booking::Column::RideId.eq(ride.id))
        .filter(booking::Column::Status.eq(BookingStatus::Accepted))
        .all(db)
        .await?;

    Ok(SeatLedger::from_bookings(ride.seats_total, &bookings))
}

/// Decide whether a passenger may book `seats` on a ride, given its
/// current bookings. Returns the ledger before the booking.
pub fn admit(
    ride: &ride::Model,
    passenger_id: Uuid,
    bookings: &[booking::Model],
    seats: i32,
) -> AppResult<SeatLedger> {
    if !ride.status.is_bookable() {
        return Err(AppError::BadRequest(
            "This ride no longer accepts bookings".to_string(),
        ));
    }

    if ride.driver_id == passenger_id {
        return Err(AppError::BadRequest(
            "You cannot book your own ride".to_string(),
        ));
    }

    if bookings
        .iter()
        .any(|b| b.status == BookingStatus::Accepted && b.passenger_id == passenger_id)
    {
        return Err(AppError::Conflict(
            "You already have a booking for this ride".to_string(),
        ));
    }

    let ledger = SeatLedger::from_bookings(ride.seats_total, bookings);
    ledger.check(seats)?;
    Ok(ledger)
}

#[derive(Debug, Clone)]
pub struct SeatRequest {
    pub ride_id: Uuid,
    pub seats: i32,
    pub pickup: GeoPoint,
}

/// Reserve seats on a ride for a passenger.
///
/// The ride row stays locked until the booking is committed. A ride that was
/// cancelled or finished while the request was in flight rejects it.
pub async fn reserve_seats(
    db: &DatabaseConnection,
    passenger: &user::Model,
    request: &SeatRequest,
) -> AppResult<(ride::Model, booking::Model, SeatLedger)> {
    if !request.pickup.is_valid() {
        return Err(AppError::BadRequest("Invalid pickup coordinates".to_string()));
    }

    let txn = db.begin().await?;

    let ride = ride::Entity::find_by_id(request.ride_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

    let bookings = booking::Entity::find()
        .filter(booking::Column::RideId.eq(ride.id))
        .filter(booking::Column::Status.eq(BookingStatus::Accepted))
        .all(&txn)
        .await?;

    let ledger = admit(&ride, passenger.id, &bookings, request.seats)?;

    let booking = booking::ActiveModel {
        id: Set(Uuid::new_v4()),
        ride_id: Set(ride.id),
        passenger_id: Set(passenger.id),
        passenger_name: Set(passenger.name.clone()),
        passenger_phone: Set(passenger.phone.clone()),
        pickup_lat: Set(request.pickup.lat),
        pickup_lon: Set(request.pickup.lon),
        seats_booked: Set(request.seats),
        status: Set(BookingStatus::Accepted),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    let after = SeatLedger {
        seats_total: ledger.seats_total,
        seats_booked: ledger.seats_booked + request.seats,
    };

    tracing::info!(
        ride_id = %ride.id,
        booking_id = %booking.id,
        seats = request.seats,
        free = after.free_seats(),
        "Seats reserved"
    );

    Ok((ride, booking, after))
}
