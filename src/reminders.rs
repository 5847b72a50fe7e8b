use std::collections::HashSet;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crate::entities::prayer;
use crate::error::AppResult;
use crate::notify::Notification;
use crate::AppState;

/// Prayers whose reminder window contains `now`.
///
/// The window opens `lead_minutes` before the prayer and closes at the
/// prayer itself. Each (prayer, date) pair is reported once.
pub fn due_reminders<'a>(
    prayers: &'a [prayer::Model],
    now: NaiveDateTime,
    lead_minutes: i64,
    sent: &mut HashSet<(i32, NaiveDate)>,
) -> Vec<&'a prayer::Model> {
    let today = now.date();
    let lead = Duration::minutes(lead_minutes);

    prayers
        .iter()
        .filter(|p| p.active)
        .filter(|p| {
            let at = today.and_time(p.prayer_time);
            now >= at - lead && now < at
        })
        .filter(|p| sent.insert((p.id, today)))
        .collect()
}

async fn tick(state: &AppState, sent: &mut HashSet<(i32, NaiveDate)>) -> AppResult<()> {
    let config = state.config.reminders;
    let prayers = prayer::Entity::find()
        .filter(prayer::Column::Active.eq(true))
        .all(&state.db)
        .await?;

    let now = state.config.local_now();
    // Yesterday's entries can never match again
    sent.retain(|(_, date)| *date >= now.date());

    for prayer in due_reminders(&prayers, now, config.lead_minutes, sent) {
        tracing::info!(prayer = %prayer.name, "Sending prayer reminder");
        state.notifier.send(Notification::prayer_reminder(
            prayer,
            now.date(),
            config.lead_minutes,
        ));
    }

    Ok(())
}

/// Background task sending reminders ahead of each active prayer
pub fn spawn_reminder_scheduler(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(StdDuration::from_secs(state.config.reminders.tick_secs.max(1)));
        let mut sent = HashSet::new();

        loop {
            interval.tick().await;
            if let Err(e) = tick(&state, &mut sent).await {
                tracing::warn!(error = %e, "Prayer reminder tick failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    fn prayer(id: i32, name: &str, h: u32, m: u32, active: bool) -> prayer::Model {
        prayer::Model {
            id,
            name: name.to_string(),
            prayer_time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            active,
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn fires_inside_lead_window_once() {
        let prayers = vec![prayer(1, "Dhuhr", 13, 15, true), prayer(2, "Asr", 16, 30, true)];
        let mut sent = HashSet::new();

        assert!(due_reminders(&prayers, at(12, 59), 15, &mut sent).is_empty());

        let due = due_reminders(&prayers, at(13, 0), 15, &mut sent);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "Dhuhr");

        assert!(due_reminders(&prayers, at(13, 5), 15, &mut sent).is_empty());
    }

    #[test]
    fn skips_inactive_and_past_prayers() {
        let prayers = vec![prayer(1, "Fajr", 6, 0, false), prayer(2, "Dhuhr", 13, 15, true)];
        let mut sent = HashSet::new();

        assert!(due_reminders(&prayers, at(5, 50), 15, &mut sent).is_empty());
        assert!(due_reminders(&prayers, at(13, 15), 15, &mut sent).is_empty());
    }

    #[test]
    fn fires_again_next_day() {
        let prayers = vec![prayer(1, "Isha", 20, 45, true)];
        let mut sent = HashSet::new();
        let tomorrow = at(20, 40) + Duration::days(1);

        assert_eq!(due_reminders(&prayers, at(20, 40), 15, &mut sent).len(), 1);
        assert_eq!(due_reminders(&prayers, tomorrow, 15, &mut sent).len(), 1);
    }
}
