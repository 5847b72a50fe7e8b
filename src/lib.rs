pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notify;
pub mod reminders;
pub mod routes;
pub mod tracking;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use notify::Notifier;
use tracking::hub::RideHub;
use tracking::tracker::RideTracker;

/// Buffered events per ride before slow subscribers start lagging
const HUB_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub hub: Arc<RideHub>,
    pub tracker: Arc<RideTracker>,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config) -> Self {
        Self {
            hub: Arc::new(RideHub::new(HUB_CAPACITY)),
            tracker: Arc::new(RideTracker::new(config.geofence)),
            notifier: Notifier::new(config.push.clone()),
            db,
            config,
        }
    }
}
