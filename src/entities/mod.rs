pub mod booking;
pub mod prayer;
pub mod ride;
pub mod user;
