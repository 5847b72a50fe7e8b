use axum::{extract::State, Json};
use chrono::NaiveTime;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;

use crate::entities::prayer;
use crate::error::AppResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PrayerInfo {
    pub id: i32,
    pub name: String,
    pub prayer_time: NaiveTime,
    pub active: bool,
}

impl From<prayer::Model> for PrayerInfo {
    fn from(p: prayer::Model) -> Self {
        Self {
            id: p.id,
            name: p.name,
            prayer_time: p.prayer_time,
            active: p.active,
        }
    }
}

/// List active prayers in order of the day
pub async fn list_prayers(State(state): State<AppState>) -> AppResult<Json<Vec<PrayerInfo>>> {
    let prayers = prayer::Entity::find()
        .filter(prayer::Column::Active.eq(true))
        .order_by_asc(prayer::Column::PrayerTime)
        .all(&state.db)
        .await?;

    Ok(Json(prayers.into_iter().map(PrayerInfo::from).collect()))
}
