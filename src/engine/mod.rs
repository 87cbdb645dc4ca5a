pub mod assignment;
pub mod lifecycle;
pub mod payments;
pub mod tracking;
pub mod users;
