pub mod appointment;
pub mod assignment;
pub mod availability;
pub mod evaluation;
pub mod notification;
pub mod request;
pub mod user;
