pub mod admin;
pub mod bookings;
pub mod live;
pub mod prayers;
pub mod profile;
pub mod rides;
