use chrono::{
    DateTime,
    Utc,
};
use hetzmetal_commons::models::conditions::Condition;
use serde::{
    Deserialize,
    Serialize,
};

/// Sentinel stored in place of an action id once the action has been polled
/// to completion, so it is never polled again.
pub const ACTION_DRAINED: i64 = -1;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Initializing,
    Starting,
    Running,
    Stopping,
    Off,
    Deleting,
    Rebuilding,
    Migrating,
    Unknown,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CloudServer {
    pub id: i64,
    pub name: String,
    pub status: ServerStatus,
    #[serde(default)]
    pub ready: bool,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

/// A vendor-side asynchronous operation. The machines store the id and poll
/// until it leaves `Running`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Action {
    pub id: i64,
    pub status: ActionStatus,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Boot progress of a cloud VM provisioned via an image-URL command.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VmBootState {
    #[default]
    Unset,
    Initializing,
    EnablingRescue,
    BootingToRescue,
    RunningImageCommand,
    WaitingForReboot,
    BootToRealOs,
    OsRunning,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CloudVmStatus {
    #[serde(default)]
    pub boot_state: VmBootState,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_enable_rescue: Option<i64>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_reboot_to_rescue: Option<i64>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_reboot_after_image_command: Option<i64>,
    /// When the reboot into rescue finished, for the reach-rescue timeout and
    /// the reboot-retry workaround.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescue_reboot_finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rescue_reboot_retries: u32,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_command_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_error: Option<String>,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl CloudVmStatus {
    /// Records a machine error, counting repeats of the same message.
    pub fn set_machine_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.machine_error.as_deref() == Some(message.as_str()) {
            self.error_count += 1;
        } else {
            self.error_count = 1;
        }
        self.machine_error = Some(message);
    }
}

/// One cloud VM as persisted by the harness.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CloudVirtualMachine {
    pub name: String,
    pub server_id: i64,
    #[serde(default)]
    pub ip: String,
    /// User-supplied command run in the rescue system to write the image.
    #[serde(default)]
    pub image_url_command: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer_id: Option<i64>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: CloudVmStatus,
}

impl CloudVirtualMachine {
    pub fn deletion_requested(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}
