use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpsertProfileRequest {
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub role: UserRole,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for ProfileResponse {
    fn from(u: user::Model) -> Self {
        Self {
            approved: u.may_carpool(),
            id: u.id,
            name: u.name,
            phone: u.phone,
            role: u.role,
            created_at: u.created_at.with_timezone(&Utc),
        }
    }
}

/// Create or update the caller's profile
pub async fn upsert_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpsertProfileRequest>,
) -> AppResult<Json<ProfileResponse>> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }
    let phone = payload.phone.trim().to_string();

    let existing = user::Entity::find_by_id(claims.sub).one(&state.db).await?;

    let saved = match existing {
        Some(user) => {
            let mut active: user::ActiveModel = user.into();
            active.name = Set(name);
            active.phone = Set(phone);
            // Admin status follows the auth provider
            active.role = Set(claims.role);
            active.update(&state.db).await?
        }
        None => {
            let created = user::ActiveModel {
                id: Set(claims.sub),
                name: Set(name),
                phone: Set(phone),
                role: Set(claims.role),
                approved: Set(claims.role == UserRole::Admin),
                ..Default::default()
            }
            .insert(&state.db)
            .await?;
            tracing::info!(user_id = %created.id, "Profile created, awaiting approval");
            created
        }
    };

    Ok(Json(saved.into()))
}

/// Get the caller's profile
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<ProfileResponse>> {
    let user = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    Ok(Json(user.into()))
}
