use async_trait::async_trait;
use hetzmetal_commons::models::host::RebootType;

use crate::error::RobotError;
use crate::models::{
    BootRescue,
    RebootOptions,
    Server,
    SshKey,
};

/// Narrow interface over the vendor's HTTP control plane.
///
/// The state machines consume this trait only; the HTTP implementation lives
/// with the harness. Every call is bounded by the caller's context.
#[async_trait]
pub trait RobotClient: Send + Sync {
    async fn get_server(&self, server_id: i64) -> Result<Server, RobotError>;

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>, RobotError>;

    async fn set_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey, RobotError>;

    async fn get_boot_rescue(&self, server_id: i64) -> Result<BootRescue, RobotError>;

    async fn set_boot_rescue(
        &self, server_id: i64, fingerprint: &str,
    ) -> Result<BootRescue, RobotError>;

    async fn delete_boot_rescue(&self, server_id: i64) -> Result<BootRescue, RobotError>;

    async fn get_reboot(&self, server_id: i64) -> Result<RebootOptions, RobotError>;

    async fn reboot_server(
        &self, server_id: i64, reboot_type: RebootType,
    ) -> Result<(), RobotError>;

    async fn set_server_name(&self, server_id: i64, name: &str) -> Result<Server, RobotError>;
}
