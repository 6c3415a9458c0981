pub mod checkin;
pub mod circle;
pub mod location;
pub mod user;
