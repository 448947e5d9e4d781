use async_trait::async_trait;

use crate::error::HcloudError;
use crate::models::{
    Action,
    CloudServer,
};

/// Narrow interface over the cloud API. Mutating calls that are asynchronous
/// on the vendor side return an [`Action`] handle for polling.
#[async_trait]
pub trait HcloudClient: Send + Sync {
    async fn get_server(&self, server_id: i64) -> Result<CloudServer, HcloudError>;

    async fn enable_rescue(&self, server_id: i64) -> Result<Action, HcloudError>;

    async fn reboot_server(&self, server_id: i64) -> Result<Action, HcloudError>;

    async fn get_action(&self, action_id: i64) -> Result<Action, HcloudError>;

    async fn shutdown_server(&self, server_id: i64) -> Result<Action, HcloudError>;

    async fn delete_server(&self, server_id: i64) -> Result<(), HcloudError>;

    async fn detach_from_load_balancer(
        &self, load_balancer_id: i64, server_id: i64,
    ) -> Result<(), HcloudError>;
}
