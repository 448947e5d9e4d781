use hetzmetal_commons::models::ssh::SshSecret;
use hetzmetal_robot::models::SshKey;
use hetzmetal_robot::{
    RobotClient,
    RobotError,
};
use tracing::info;

use crate::error::BareMetalError;

/// Outcome of ensuring a named key is registered with the vendor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyRegistration {
    Registered(SshKey),
    /// The vendor already holds this key material under a different name.
    /// Ambiguous on purpose: the caller records a fatal condition.
    AlreadyExistsConflict,
}

/// Idempotently registers the secret's public key with the vendor.
///
/// A key listed under the secret's name wins without any upload, so repeated
/// calls with the same secret converge on a single registered key and issue
/// at most one upload in total.
pub async fn ensure_ssh_key(
    robot: &dyn RobotClient, secret: &SshSecret,
) -> Result<KeyRegistration, BareMetalError> {
    let keys = robot.list_ssh_keys().await?;
    if let Some(key) = keys.into_iter().find(|key| key.name == secret.name) {
        return Ok(KeyRegistration::Registered(key));
    }

    match robot.set_ssh_key(&secret.name, &secret.public_key).await {
        Ok(key) => {
            info!(name = %key.name, fingerprint = %key.fingerprint, "registered ssh key");
            Ok(KeyRegistration::Registered(key))
        }
        Err(RobotError::KeyAlreadyExists) => Ok(KeyRegistration::AlreadyExistsConflict),
        Err(error) => Err(error.into()),
    }
}
