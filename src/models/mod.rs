pub mod driver;
pub mod message;
pub mod route;
pub mod trip;
