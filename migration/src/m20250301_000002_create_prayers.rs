use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Prayer::Table)
                    .if_not_exists()
                    .col(pk_auto(Prayer::Id))
                    .col(string_len(Prayer::Name, 50).not_null().unique_key())
                    .col(time(Prayer::PrayerTime).not_null())
                    .col(boolean(Prayer::Active).not_null().default(true))
                    .to_owned(),
            )
            .await?;

        // Seed the five daily prayers; admins adjust the times afterwards
        let insert = Query::insert()
            .into_table(Prayer::Table)
            .columns([Prayer::Name, Prayer::PrayerTime])
            .values_panic(["Fajr".into(), Expr::cust("TIME '06:00:00'")])
            .values_panic(["Dhuhr".into(), Expr::cust("TIME '13:15:00'")])
            .values_panic(["Asr".into(), Expr::cust("TIME '16:30:00'")])
            .values_panic(["Maghrib".into(), Expr::cust("TIME '19:00:00'")])
            .values_panic(["Isha".into(), Expr::cust("TIME '20:45:00'")])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Prayer::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Prayer {
    Table,
    Id,
    Name,
    PrayerTime,
    Active,
}
