use thiserror::Error;

/// Errors surfaced by the vendor API. The four named codes are the ones the
/// state machines react to specifically; everything else is either a generic
/// API failure or a transport problem.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RobotError {
    #[error("server not found")]
    ServerNotFound,

    #[error("not found")]
    NotFound,

    #[error("ssh key already exists")]
    KeyAlreadyExists,

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("vendor api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl RobotError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, RobotError::RateLimitExceeded(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RobotError::NotFound | RobotError::ServerNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RobotError::RateLimitExceeded("slow down".into()).is_rate_limit());
        assert!(!RobotError::KeyAlreadyExists.is_rate_limit());
        assert!(RobotError::ServerNotFound.is_not_found());
        assert!(RobotError::NotFound.is_not_found());
        assert!(!RobotError::KeyAlreadyExists.is_not_found());
    }
}
