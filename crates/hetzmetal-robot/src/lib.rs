pub mod client;
pub mod error;
pub mod mock;
pub mod models;

pub use client::RobotClient;
pub use error::RobotError;
