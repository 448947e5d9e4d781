use hetzmetal_robot::RobotError;
use hetzmetal_ssh::SshTransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BareMetalError {
    #[error("vendor api error: {0}")]
    Robot(#[from] RobotError),

    #[error("ssh transport error: {0}")]
    Ssh(#[from] SshTransportError),

    #[error("ssh command failed: {0}")]
    SshCommand(String),

    #[error("unexpected hostname: {0}")]
    UnexpectedHostname(String),

    #[error("wrong ssh key")]
    WrongSshKey,

    #[error("unknown ROTA: {0}")]
    UnknownRota(String),

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
