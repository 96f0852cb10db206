pub mod bookings;
pub mod request;
pub mod session;
