use thiserror::Error;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum HcloudError {
    #[error("server not found")]
    NotFound,

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("cloud api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl HcloudError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, HcloudError::RateLimitExceeded(_))
    }
}
