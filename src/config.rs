use std::env;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::error::{AppError, AppResult};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub geofence: GeofenceConfig,
    pub push: Option<PushConfig>,
    pub reminders: ReminderConfig,
    /// Offset of the mosque's wall clock; prayer times and ride dates use it
    pub utc_offset_minutes: i32,
}

/// Where rides end and how arrival is confirmed
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeofenceConfig {
    pub destination_lat: f64,
    pub destination_lon: f64,
    pub radius_m: f64,
    pub confirm_samples: u32,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            destination_lat: 49.68559,
            destination_lon: 8.59348,
            radius_m: 150.0,
            confirm_samples: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PushConfig {
    pub api_url: String,
    pub app_id: String,
    pub api_key: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReminderConfig {
    pub lead_minutes: i64,
    pub tick_secs: u64,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| AppError::Config(format!("{} must be set", key)))
        };

        let defaults = GeofenceConfig::default();
        let geofence = GeofenceConfig {
            destination_lat: parse_or(&lookup, "DESTINATION_LAT", defaults.destination_lat)?,
            destination_lon: parse_or(&lookup, "DESTINATION_LON", defaults.destination_lon)?,
            radius_m: parse_or(&lookup, "GEOFENCE_RADIUS_M", defaults.radius_m)?,
            confirm_samples: parse_or(&lookup, "GEOFENCE_CONFIRM_SAMPLES", defaults.confirm_samples)?,
        };

        if geofence.confirm_samples == 0 {
            return Err(AppError::Config(
                "GEOFENCE_CONFIRM_SAMPLES must be at least 1".to_string(),
            ));
        }

        // Push is optional, but only as a complete set
        let push = match (lookup("PUSH_API_URL"), lookup("PUSH_APP_ID"), lookup("PUSH_API_KEY")) {
            (Some(api_url), Some(app_id), Some(api_key)) => Some(PushConfig {
                api_url,
                app_id,
                api_key,
            }),
            (None, None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "PUSH_API_URL, PUSH_APP_ID and PUSH_API_KEY must be set together".to_string(),
                ));
            }
        };

        let utc_offset_minutes: i32 = parse_or(&lookup, "TIMEZONE_OFFSET_MINUTES", 60)?;
        if utc_offset_minutes.checked_mul(60).and_then(FixedOffset::east_opt).is_none() {
            return Err(AppError::Config(format!(
                "TIMEZONE_OFFSET_MINUTES out of range: {}",
                utc_offset_minutes
            )));
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            geofence,
            push,
            reminders: ReminderConfig {
                lead_minutes: parse_or(&lookup, "REMINDER_LEAD_MINUTES", 15)?,
                tick_secs: parse_or(&lookup, "REMINDER_TICK_SECS", 60)?,
            },
            utc_offset_minutes,
        })
    }

    pub fn local_now(&self) -> NaiveDateTime {
        local_time(Utc::now(), self.utc_offset_minutes)
    }

    pub fn local_today(&self) -> NaiveDate {
        self.local_now().date()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Wall-clock time at the given offset from UTC
pub fn local_time(now: DateTime<Utc>, offset_minutes: i32) -> NaiveDateTime {
    offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .map(|offset| now.with_timezone(&offset).naive_local())
        .unwrap_or_else(|| now.naive_utc())
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> AppResult<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/carpool"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup_from(&BASE)).unwrap();

        assert_eq!(config.server_addr(), "0.0.0.0:3000");
        assert_eq!(config.geofence, GeofenceConfig::default());
        assert!(config.push.is_none());
        assert_eq!(config.reminders.lead_minutes, 15);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.geofence.confirm_samples, 1);
        assert_eq!(config.utc_offset_minutes, 60);
    }

    #[test]
    fn local_date_rolls_over_before_utc() {
        let late_evening = DateTime::parse_from_rfc3339("2025-03-07T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let local = local_time(late_evening, 60);
        assert_eq!(local.date(), NaiveDate::from_ymd_opt(2025, 3, 8).unwrap());
        assert_eq!(local.format("%H:%M").to_string(), "00:30");

        assert_eq!(local_time(late_evening, -60).date(), late_evening.date_naive());
    }

    #[test]
    fn rejects_impossible_offset() {
        let mut pairs = BASE.to_vec();
        pairs.push(("TIMEZONE_OFFSET_MINUTES", "100000"));

        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn missing_database_url_is_config_error() {
        let result = Config::from_lookup(lookup_from(&[("JWT_SECRET", "secret")]));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn rejects_unparsable_port() {
        let mut pairs = BASE.to_vec();
        pairs.push(("SERVER_PORT", "http"));

        assert!(matches!(
            Config::from_lookup(lookup_from(&pairs)),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn rejects_zero_confirm_samples() {
        let mut pairs = BASE.to_vec();
        pairs.push(("GEOFENCE_CONFIRM_SAMPLES", "0"));

        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn partial_push_settings_are_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("PUSH_API_URL", "https://push.example.com"));

        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());

        pairs.push(("PUSH_APP_ID", "app"));
        pairs.push(("PUSH_API_KEY", "key"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.push.unwrap().app_id, "app");
    }
}
