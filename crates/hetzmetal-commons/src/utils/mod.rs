pub mod actionresult;
pub mod backoff;
pub mod error;
pub mod logging;
