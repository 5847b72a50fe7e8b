pub mod geofence;
pub mod hub;
pub mod ledger;
pub mod lifecycle;
pub mod tracker;
