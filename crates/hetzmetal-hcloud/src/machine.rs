use std::sync::Arc;
use std::time::Duration;

use chrono::{
    DateTime,
    Utc,
};
use hetzmetal_commons::models::conditions::{
    ConditionType,
    set_condition,
};
use hetzmetal_commons::models::host::ErrorType;
use hetzmetal_commons::models::ssh::SshSecret;
use hetzmetal_ssh::analyze::RESCUE_HOSTNAME;
use hetzmetal_ssh::{
    SshClient,
    SshFactory,
    SshTarget,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::client::HcloudClient;
use crate::error::HcloudError;
use crate::models::{
    ACTION_DRAINED,
    ActionStatus,
    CloudVirtualMachine,
    ServerStatus,
    VmBootState as State,
};

pub type ActionResult = hetzmetal_commons::utils::actionresult::ActionResult<HcloudError>;

const SSH_PORT: u16 = 22;
const ACTION_POLL_DELAY: Duration = Duration::from_secs(5);
const BOOT_POLL_DELAY: Duration = Duration::from_secs(10);
const OS_RUNNING_REQUEUE: Duration = Duration::from_secs(300);

/// Time the server gets to come up in the rescue system after the reboot
/// action finished.
const RESCUE_TIMEOUT: Duration = Duration::from_secs(4 * 60);
/// Budget for the user-supplied image command.
const IMAGE_COMMAND_TIMEOUT: Duration = Duration::from_secs(7 * 60);
/// The vendor sometimes ignores the first reboot into rescue; after this
/// grace the reboot is reissued.
const RESCUE_REBOOT_RETRY_GRACE: Duration = Duration::from_secs(10);
const MAX_RESCUE_REBOOT_RETRIES: u32 = 3;
/// A reboot issued immediately after rescue-enable finishes is ignored.
const POST_RESCUE_ENABLE_DELAY: Duration = Duration::from_secs(10);

const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(660);
const RATE_LIMIT_PAUSE_DELETING: Duration = Duration::from_secs(120);

/// Boot state machine for cloud VMs provisioned via an image-URL command:
/// enable rescue, reboot into it, run the command, reboot again, accept the
/// installed OS. Vendor-side actions are tracked by id and drained to a
/// sentinel so every reconcile stays bounded.
pub struct VmStateMachine<'a> {
    vm: &'a mut CloudVirtualMachine,
    hcloud: &'a dyn HcloudClient,
    ssh_factory: &'a dyn SshFactory,
    secret: SshSecret,
}

impl<'a> VmStateMachine<'a> {
    pub fn new(
        vm: &'a mut CloudVirtualMachine, hcloud: &'a dyn HcloudClient,
        ssh_factory: &'a dyn SshFactory, secret: SshSecret,
    ) -> Self {
        VmStateMachine {
            vm,
            hcloud,
            ssh_factory,
            secret,
        }
    }

    pub async fn reconcile(&mut self) -> ActionResult {
        if self.vm.deletion_requested() {
            let result = self.delete().await;
            return self.finish(result, true);
        }

        let state = self.vm.status.boot_state;
        debug!(vm = %self.vm.name, ?state, "reconciling cloud vm");

        let handled = match state {
            State::Unset => Ok(ActionResult::Complete),
            State::Initializing => self.handle_initializing().await,
            State::EnablingRescue => self.handle_enabling_rescue().await,
            State::BootingToRescue => self.handle_booting_to_rescue().await,
            State::RunningImageCommand => self.handle_running_image_command().await,
            State::WaitingForReboot => self.handle_waiting_for_reboot().await,
            State::BootToRealOs => self.handle_boot_to_real_os().await,
            State::OsRunning => self.handle_os_running().await,
        };

        let result = self.finish(handled, false);
        if result.is_complete() {
            self.advance(state);
        }
        result
    }

    fn finish(
        &mut self, result: Result<ActionResult, HcloudError>, deleting: bool,
    ) -> ActionResult {
        match result {
            Ok(result) => result,
            Err(error) if error.is_rate_limit() => {
                // A healthy VM that is not being deleted has nothing urgent to
                // do; the rate-limit error is swallowed entirely.
                if !deleting && self.vm.status.boot_state == State::OsRunning {
                    debug!(vm = %self.vm.name, %error, "rate limited, nothing urgent, ignoring");
                    return ActionResult::continue_after(OS_RUNNING_REQUEUE);
                }
                set_condition(
                    &mut self.vm.status.conditions,
                    ConditionType::RateLimited,
                    true,
                    "RateLimitExceeded",
                    &error.to_string(),
                );
                let pause = if deleting {
                    RATE_LIMIT_PAUSE_DELETING
                } else {
                    RATE_LIMIT_PAUSE
                };
                ActionResult::continue_after(pause)
            }
            Err(error) => ActionResult::Error(error),
        }
    }

    fn advance(&mut self, from: State) {
        let next = match from {
            State::Unset => State::Initializing,
            State::Initializing => State::EnablingRescue,
            State::EnablingRescue => State::BootingToRescue,
            State::BootingToRescue => State::RunningImageCommand,
            State::RunningImageCommand => State::WaitingForReboot,
            State::WaitingForReboot => State::BootToRealOs,
            State::BootToRealOs => State::OsRunning,
            State::OsRunning => State::OsRunning,
        };
        if next != from {
            info!(vm = %self.vm.name, ?from, to = ?next, "boot state complete");
        }
        self.vm.status.boot_state = next;
    }

    fn failed(&self) -> ActionResult {
        ActionResult::Failed {
            error_type: ErrorType::FatalError,
            error_count: self.vm.status.error_count,
        }
    }

    fn ssh_client(&self) -> Arc<dyn SshClient> {
        self.ssh_factory.client(SshTarget {
            ip: self.vm.ip.clone(),
            port: SSH_PORT,
            secret: self.secret.clone(),
        })
    }

    async fn handle_initializing(&mut self) -> Result<ActionResult, HcloudError> {
        let server = self.hcloud.get_server(self.vm.server_id).await?;
        if server.status == ServerStatus::Running {
            return Ok(ActionResult::Complete);
        }
        Ok(ActionResult::continue_after(BOOT_POLL_DELAY))
    }

    async fn handle_enabling_rescue(&mut self) -> Result<ActionResult, HcloudError> {
        match self.vm.status.action_enable_rescue {
            None => {
                let action = self.hcloud.enable_rescue(self.vm.server_id).await?;
                self.vm.status.action_enable_rescue = Some(action.id);
                Ok(ActionResult::continue_after(ACTION_POLL_DELAY))
            }
            Some(ACTION_DRAINED) => Ok(ActionResult::Complete),
            Some(action_id) => {
                let action = self.hcloud.get_action(action_id).await?;
                match action.status {
                    ActionStatus::Running => Ok(ActionResult::continue_after(ACTION_POLL_DELAY)),
                    ActionStatus::Error => {
                        let cause = action.error.unwrap_or_else(|| "unknown".to_string());
                        self.vm
                            .status
                            .set_machine_error(format!("enable rescue failed: {cause}"));
                        Ok(self.failed())
                    }
                    ActionStatus::Success => {
                        self.vm.status.action_enable_rescue = Some(ACTION_DRAINED);
                        // A reboot issued right away would be ignored.
                        Ok(ActionResult::continue_after(POST_RESCUE_ENABLE_DELAY))
                    }
                }
            }
        }
    }

    async fn handle_booting_to_rescue(&mut self) -> Result<ActionResult, HcloudError> {
        match self.vm.status.action_reboot_to_rescue {
            None => {
                let action = self.hcloud.reboot_server(self.vm.server_id).await?;
                self.vm.status.action_reboot_to_rescue = Some(action.id);
                Ok(ActionResult::continue_after(ACTION_POLL_DELAY))
            }
            Some(ACTION_DRAINED) => self.check_rescue_boot().await,
            Some(action_id) => {
                let action = self.hcloud.get_action(action_id).await?;
                match action.status {
                    ActionStatus::Running => Ok(ActionResult::continue_after(ACTION_POLL_DELAY)),
                    ActionStatus::Error => {
                        let cause = action.error.unwrap_or_else(|| "unknown".to_string());
                        self.vm
                            .status
                            .set_machine_error(format!("reboot to rescue failed: {cause}"));
                        Ok(self.failed())
                    }
                    ActionStatus::Success => {
                        self.vm.status.action_reboot_to_rescue = Some(ACTION_DRAINED);
                        self.vm.status.rescue_reboot_finished_at = Some(Utc::now());
                        Ok(ActionResult::continue_after(BOOT_POLL_DELAY))
                    }
                }
            }
        }
    }

    async fn check_rescue_boot(&mut self) -> Result<ActionResult, HcloudError> {
        let output = self.ssh_client().get_hostname().await;
        let hostname = output.trimmed_stdout().to_string();

        if output.error.is_none() && hostname == RESCUE_HOSTNAME {
            return Ok(ActionResult::Complete);
        }

        if output.error.is_none() && hostname == self.vm.name {
            // The vendor sometimes ignores the first reboot into rescue; the
            // server is simply back in its old OS.
            if !elapsed_at_least(
                self.vm.status.rescue_reboot_finished_at,
                RESCUE_REBOOT_RETRY_GRACE,
            ) {
                return Ok(ActionResult::continue_after(ACTION_POLL_DELAY));
            }
            if self.vm.status.rescue_reboot_retries >= MAX_RESCUE_REBOOT_RETRIES {
                self.vm.status.set_machine_error(format!(
                    "reboot to rescue failed after {MAX_RESCUE_REBOOT_RETRIES} retries"
                ));
                return Ok(self.failed());
            }
            warn!(vm = %self.vm.name, "still in the old OS, reissuing reboot into rescue");
            let action = self.hcloud.reboot_server(self.vm.server_id).await?;
            self.vm.status.action_reboot_to_rescue = Some(action.id);
            self.vm.status.rescue_reboot_retries += 1;
            return Ok(ActionResult::continue_after(ACTION_POLL_DELAY));
        }

        if elapsed_at_least(self.vm.status.rescue_reboot_finished_at, RESCUE_TIMEOUT) {
            let elapsed = elapsed_since(self.vm.status.rescue_reboot_finished_at);
            self.vm.status.set_machine_error(format!(
                "BootIntoRescue timed out after {}",
                format_duration(elapsed)
            ));
            return Ok(self.failed());
        }

        Ok(ActionResult::continue_after(BOOT_POLL_DELAY))
    }

    async fn handle_running_image_command(&mut self) -> Result<ActionResult, HcloudError> {
        let ssh = self.ssh_client();

        if self.vm.status.image_command_started_at.is_none() {
            let output = ssh
                .execute_image_url_command(&self.vm.image_url_command)
                .await;
            if !output.succeeded() {
                debug!(vm = %self.vm.name, ?output, "could not start image command yet");
                return Ok(ActionResult::continue_after(BOOT_POLL_DELAY));
            }
            self.vm.status.image_command_started_at = Some(Utc::now());
            return Ok(ActionResult::continue_after(BOOT_POLL_DELAY));
        }

        let output = ssh.state_of_image_url_command().await;
        match output.trimmed_stdout() {
            "done" => Ok(ActionResult::Complete),
            "failed" => {
                self.vm.status.set_machine_error("image command failed");
                Ok(self.failed())
            }
            _ => {
                if elapsed_at_least(
                    self.vm.status.image_command_started_at,
                    IMAGE_COMMAND_TIMEOUT,
                ) {
                    let elapsed = elapsed_since(self.vm.status.image_command_started_at);
                    self.vm.status.set_machine_error(format!(
                        "ImageURLCommand timed out after {}",
                        format_duration(elapsed)
                    ));
                    return Ok(self.failed());
                }
                Ok(ActionResult::continue_after(BOOT_POLL_DELAY))
            }
        }
    }

    async fn handle_waiting_for_reboot(&mut self) -> Result<ActionResult, HcloudError> {
        match self.vm.status.action_reboot_after_image_command {
            None => {
                let action = self.hcloud.reboot_server(self.vm.server_id).await?;
                self.vm.status.action_reboot_after_image_command = Some(action.id);
                Ok(ActionResult::continue_after(ACTION_POLL_DELAY))
            }
            Some(ACTION_DRAINED) => Ok(ActionResult::Complete),
            Some(action_id) => {
                let action = self.hcloud.get_action(action_id).await?;
                match action.status {
                    ActionStatus::Running => Ok(ActionResult::continue_after(ACTION_POLL_DELAY)),
                    ActionStatus::Error => {
                        let cause = action.error.unwrap_or_else(|| "unknown".to_string());
                        self.vm
                            .status
                            .set_machine_error(format!("reboot after image command failed: {cause}"));
                        Ok(self.failed())
                    }
                    ActionStatus::Success => {
                        self.vm.status.action_reboot_after_image_command = Some(ACTION_DRAINED);
                        Ok(ActionResult::continue_after(BOOT_POLL_DELAY))
                    }
                }
            }
        }
    }

    async fn handle_boot_to_real_os(&mut self) -> Result<ActionResult, HcloudError> {
        let output = self.ssh_client().get_hostname().await;
        if output.error.is_none() && output.trimmed_stdout() == self.vm.name {
            self.vm.status.machine_error = None;
            self.vm.status.error_count = 0;
            return Ok(ActionResult::Complete);
        }
        Ok(ActionResult::continue_after(BOOT_POLL_DELAY))
    }

    async fn handle_os_running(&mut self) -> Result<ActionResult, HcloudError> {
        // Periodic health check; its failures are non-urgent by definition.
        let _ = self.hcloud.get_server(self.vm.server_id).await?;
        Ok(ActionResult::continue_after(OS_RUNNING_REQUEUE))
    }

    /// Graceful teardown: detach from the load balancer, shut a healthy
    /// server down first, force-delete everything else.
    async fn delete(&mut self) -> Result<ActionResult, HcloudError> {
        let server = match self.hcloud.get_server(self.vm.server_id).await {
            Ok(server) => server,
            Err(HcloudError::NotFound) => return Ok(ActionResult::DeleteComplete),
            Err(error) => return Err(error),
        };

        if let Some(load_balancer_id) = self.vm.load_balancer_id {
            match self
                .hcloud
                .detach_from_load_balancer(load_balancer_id, self.vm.server_id)
                .await
            {
                Ok(()) | Err(HcloudError::NotFound) => {}
                Err(error) => return Err(error),
            }
        }

        if server.status == ServerStatus::Running && server.ready {
            info!(vm = %self.vm.name, "shutting down before delete");
            self.hcloud.shutdown_server(self.vm.server_id).await?;
            return Ok(ActionResult::continue_after(BOOT_POLL_DELAY));
        }

        self.hcloud.delete_server(self.vm.server_id).await?;
        info!(vm = %self.vm.name, "server deleted");
        Ok(ActionResult::DeleteComplete)
    }
}

fn elapsed_since(since: Option<DateTime<Utc>>) -> Duration {
    since
        .and_then(|t| Utc::now().signed_duration_since(t).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

fn elapsed_at_least(since: Option<DateTime<Utc>>, threshold: Duration) -> bool {
    elapsed_since(since) >= threshold
}

/// Renders a duration the way operators read it in the status: "8m0s".
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}m{}s", secs / 60, secs % 60)
}
