pub mod client;
pub mod error;
pub mod machine;
pub mod mock;
pub mod models;

pub use client::HcloudClient;
pub use error::HcloudError;
