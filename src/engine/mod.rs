pub mod fixtures;
pub mod matcher;
pub mod notifications;
pub mod publisher;
pub mod registry;
