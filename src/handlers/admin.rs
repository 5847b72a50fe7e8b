use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::entities::ride::RideStatus;
use crate::entities::{prayer, ride, user};
use crate::error::{AppError, AppResult};
use crate::handlers::prayers::PrayerInfo;
use crate::handlers::profile::ProfileResponse;
use crate::handlers::rides::{with_seats, RideFilter, RideResponse};
use crate::tracking::lifecycle;
use crate::AppState;

// ============ Prayer Management ============

#[derive(Debug, Deserialize)]
pub struct CreatePrayerRequest {
    pub name: String,
    pub prayer_time: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePrayerRequest {
    pub name: Option<String>,
    pub prayer_time: Option<NaiveTime>,
    pub active: Option<bool>,
}

/// List all prayers, including inactive ones (admin)
pub async fn list_prayers(State(state): State<AppState>) -> AppResult<Json<Vec<PrayerInfo>>> {
    let prayers = prayer::Entity::find()
        .order_by_asc(prayer::Column::PrayerTime)
        .all(&state.db)
        .await?;

    Ok(Json(prayers.into_iter().map(PrayerInfo::from).collect()))
}

async fn ensure_unique_name(state: &AppState, name: &str, except: Option<i32>) -> AppResult<()> {
    let existing = prayer::Entity::find()
        .filter(prayer::Column::Name.eq(name))
        .one(&state.db)
        .await?;

    match existing {
        Some(p) if Some(p.id) != except => Err(AppError::Conflict(format!(
            "A prayer named {} already exists",
            name
        ))),
        _ => Ok(()),
    }
}

/// Create a prayer (admin)
pub async fn create_prayer(
    State(state): State<AppState>,
    Json(payload): Json<CreatePrayerRequest>,
) -> AppResult<Json<PrayerInfo>> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }
    ensure_unique_name(&state, &name, None).await?;

    let prayer = prayer::ActiveModel {
        name: Set(name),
        prayer_time: Set(payload.prayer_time),
        active: Set(true),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    Ok(Json(prayer.into()))
}

/// Update a prayer's name, time or availability (admin)
pub async fn update_prayer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdatePrayerRequest>,
) -> AppResult<Json<PrayerInfo>> {
    let prayer = prayer::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Prayer not found".to_string()))?;

    let mut active: prayer::ActiveModel = prayer.into();

    if let Some(name) = payload.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Name is required".to_string()));
        }
        ensure_unique_name(&state, &name, Some(id)).await?;
        active.name = Set(name);
    }

    if let Some(time) = payload.prayer_time {
        active.prayer_time = Set(time);
    }

    if let Some(flag) = payload.active {
        active.active = Set(flag);
    }

    let updated = active.update(&state.db).await?;
    Ok(Json(updated.into()))
}

/// Delete a prayer without rides (admin)
pub async fn delete_prayer(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let rides = ride::Entity::find()
        .filter(ride::Column::PrayerId.eq(id))
        .count(&state.db)
        .await?;

    if rides > 0 {
        return Err(AppError::Conflict(
            "Prayer has rides; deactivate it instead".to_string(),
        ));
    }

    let result = prayer::Entity::delete_by_id(id).exec(&state.db).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Prayer not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "message": "Prayer deleted" })))
}

// ============ User Management ============

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub pending: Option<bool>,
}

/// List users; `?pending=true` shows those awaiting approval (admin)
pub async fn list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> AppResult<Json<Vec<ProfileResponse>>> {
    let mut query = user::Entity::find().order_by_asc(user::Column::CreatedAt);

    if filter.pending.unwrap_or(false) {
        query = query
            .filter(user::Column::Approved.eq(false))
            .filter(user::Column::Role.eq(user::UserRole::Member));
    }

    let users = query.all(&state.db).await?;
    Ok(Json(users.into_iter().map(ProfileResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
}

/// Approve or revoke a user (admin)
pub async fn set_approval(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ApprovalRequest>,
) -> AppResult<Json<ProfileResponse>> {
    let user = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut active: user::ActiveModel = user.into();
    active.approved = Set(payload.approved);
    let updated = active.update(&state.db).await?;

    tracing::info!(user_id = %updated.id, approved = payload.approved, "User approval changed");

    Ok(Json(updated.into()))
}

/// Delete a user; their rides and bookings go with them (admin)
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let rides = ride::Entity::find()
        .filter(ride::Column::DriverId.eq(id))
        .all(&state.db)
        .await?;

    let result = user::Entity::delete_by_id(id).exec(&state.db).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    // The cascade removed the rides without passing through cancel_ride
    for ride in rides.iter().filter(|r| !r.status.is_terminal()) {
        lifecycle::release_ride(&state, ride.id, RideStatus::Cancelled);
    }
    tracing::info!(user_id = %id, rides = rides.len(), "User deleted");

    Ok(Json(serde_json::json!({ "message": "User deleted" })))
}

// ============ Rides (admin view) ============

/// List rides of any status, optionally by day and prayer (admin)
pub async fn list_rides(
    State(state): State<AppState>,
    Query(filter): Query<RideFilter>,
) -> AppResult<Json<Vec<RideResponse>>> {
    let mut query = ride::Entity::find().order_by_desc(ride::Column::RideDate);

    if let Some(date) = filter.date {
        query = query.filter(ride::Column::RideDate.eq(date));
    }
    if let Some(prayer_id) = filter.prayer_id {
        query = query.filter(ride::Column::PrayerId.eq(prayer_id));
    }

    let rides = query.all(&state.db).await?;
    Ok(Json(with_seats(&state, rides).await?))
}
