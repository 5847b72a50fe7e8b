use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "ride_status")]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl RideStatus {
    /// Passengers may only book rides that have not finished
    pub fn is_bookable(self) -> bool {
        matches!(self, RideStatus::Open | RideStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ride")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub driver_phone: String,
    pub prayer_id: i32,
    pub ride_date: Date,
    pub seats_total: i32,
    pub start_lat: f64,
    pub start_lon: f64,
    pub current_lat: Option<f64>,
    pub current_lon: Option<f64>,
    pub status: RideStatus,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::DriverId",
        to = "super::user::Column::Id"
    )]
    Driver,
    #[sea_orm(
        belongs_to = "super::prayer::Entity",
        from = "Column::PrayerId",
        to = "super::prayer::Column::Id"
    )]
    Prayer,
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl Related<super::prayer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prayer.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Driver.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;

    #[rstest]
    #[case(RideStatus::Open, true, false)]
    #[case(RideStatus::Active, true, false)]
    #[case(RideStatus::Completed, false, true)]
    #[case(RideStatus::Cancelled, false, true)]
    fn status_predicates(#[case] status: RideStatus, #[case] bookable: bool, #[case] terminal: bool) {
        assert_eq!(status.is_bookable(), bookable);
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn rides_join_their_driver() {
        let sql = Entity::find()
            .find_also_related(super::super::user::Entity)
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#"LEFT JOIN "user" ON "ride"."driver_id" = "user"."id""#), "{sql}");
    }

    #[test]
    fn drivers_list_their_rides() {
        let sql = super::super::user::Entity::find()
            .find_with_related(Entity)
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""ride""#), "{sql}");
    }
}
