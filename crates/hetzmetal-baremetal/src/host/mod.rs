use std::sync::Arc;
use std::time::Duration;

use hetzmetal_commons::models::conditions::{
    ConditionType,
    set_condition,
};
use hetzmetal_commons::models::host::{
    BARE_METAL_HOST_FINALIZER,
    BareMetalHost,
    ErrorType,
    ProvisioningState as State,
    reboot_types_from_codes,
};
use hetzmetal_commons::models::ssh::{
    SecretStatus,
    SshSecret,
    SshSpec,
};
use hetzmetal_commons::utils::error::{
    clear_error,
    set_error,
};
use hetzmetal_robot::{
    RobotClient,
    RobotError,
};
use hetzmetal_ssh::analyze::{
    BootState,
    RESCUE_HOSTNAME,
    classify,
};
use hetzmetal_ssh::{
    SshClient,
    SshFactory,
    SshOutput,
    SshTarget,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::error::BareMetalError;
use crate::escalation::{
    self,
    IncompleteBoot,
    handle_incomplete_boot,
};
use crate::inventory::{
    InventoryCollector,
    handle_ssh_error,
};
use crate::reconcile::ActionResult;
use crate::registrar::{
    KeyRegistration,
    ensure_ssh_key,
};

#[cfg(test)]
mod tests;

const RESCUE_PORT: u16 = 22;
const AVAILABLE_REQUEUE: Duration = Duration::from_secs(10);
const POST_REBOOT_REQUEUE: Duration = Duration::from_secs(5);
const CLOUD_INIT_REQUEUE: Duration = Duration::from_secs(5);
const PROVISIONED_REQUEUE: Duration = Duration::from_secs(180);

/// Resolved SSH credential material for the two keys a host uses.
#[derive(Clone, Debug)]
pub struct HostSecrets {
    pub rescue: SshSecret,
    pub os: SshSecret,
}

/// Drives one bare-metal host through its provisioning phases.
///
/// The machine is purely a function of the persisted host record plus the two
/// injected clients; everything it decides is written back into the record
/// before returning, so the next reconcile can resume from there.
pub struct HostStateMachine<'a> {
    host: &'a mut BareMetalHost,
    robot: &'a dyn RobotClient,
    ssh_factory: &'a dyn SshFactory,
    secrets: HostSecrets,
}

impl<'a> HostStateMachine<'a> {
    pub fn new(
        host: &'a mut BareMetalHost, robot: &'a dyn RobotClient,
        ssh_factory: &'a dyn SshFactory, secrets: HostSecrets,
    ) -> Self {
        HostStateMachine {
            host,
            robot,
            ssh_factory,
            secrets,
        }
    }

    /// One reconcile step: route deletion and cancellation, check for secret
    /// rotation, run the current phase handler, apply the transition.
    pub async fn reconcile(&mut self) -> ActionResult {
        self.route_deletion();
        self.route_cancellation();

        if let Some(result) = self.update_ssh_key() {
            return result;
        }

        let state = self.host.status.provisioning_state;
        debug!(host = %self.host.name, %state, "reconciling host");

        let handled = match state {
            State::None => self.handle_none().await,
            State::Registering => self.handle_registering().await,
            State::Available => self.handle_available().await,
            State::ImageInstalling => self.handle_image_installing().await,
            State::Provisioning => self.handle_provisioning().await,
            State::EnsureProvisioned => self.handle_ensure_provisioned().await,
            State::Provisioned => self.handle_provisioned().await,
            State::Deprovisioning => self.handle_deprovisioning().await,
            State::Deleting => self.handle_deleting().await,
        };

        let result = match handled {
            Ok(result) => result,
            Err(error) => {
                if let BareMetalError::Robot(robot_error) = &error {
                    if robot_error.is_rate_limit() {
                        set_condition(
                            &mut self.host.status.conditions,
                            ConditionType::RateLimited,
                            true,
                            "RateLimitExceeded",
                            &robot_error.to_string(),
                        );
                    }
                }
                ActionResult::Error(error)
            }
        };

        if result.is_complete() {
            self.advance(state);
        }
        result
    }

    /// A deletion request interrupts whatever the host is doing: claimed
    /// hosts are deprovisioned first, unclaimed ones go straight to Deleting.
    fn route_deletion(&mut self) {
        if !self.host.deletion_requested() {
            return;
        }
        match self.host.status.provisioning_state {
            State::Deleting | State::Deprovisioning => {}
            State::None | State::Registering | State::Available => {
                info!(host = %self.host.name, "deletion requested");
                self.host.status.provisioning_state = State::Deleting;
            }
            _ => {
                info!(host = %self.host.name, "deletion requested, deprovisioning first");
                self.host.status.provisioning_state = State::Deprovisioning;
            }
        }
    }

    /// Provisioning was cancelled when the install image disappears while the
    /// host is in a post-Available phase.
    fn route_cancellation(&mut self) {
        let state = self.host.status.provisioning_state;
        let cancellable = matches!(
            state,
            State::ImageInstalling
                | State::Provisioning
                | State::EnsureProvisioned
                | State::Provisioned
        );
        if cancellable && self.host.spec.install_image.is_none() {
            info!(host = %self.host.name, %state, "provisioning cancelled");
            self.host.status.provisioning_state = State::Deprovisioning;
        }
    }

    /// Compares the current secrets against the recorded hashes and reacts to
    /// rotation before any handler runs.
    fn update_ssh_key(&mut self) -> Option<ActionResult> {
        let rescue_rotated = self
            .host
            .status
            .ssh_status
            .current_rescue
            .as_ref()
            .is_some_and(|status| !status.matches(&self.secrets.rescue));
        let os_rotated = self
            .host
            .status
            .ssh_status
            .current_os
            .as_ref()
            .is_some_and(|status| !status.matches(&self.secrets.os));

        let state = self.host.status.provisioning_state;

        if rescue_rotated
            && matches!(
                state,
                State::Registering | State::Available | State::ImageInstalling | State::Deprovisioning
            )
        {
            info!(host = %self.host.name, "rescue ssh secret rotated, resetting host");
            self.host.status.provisioning_state = State::None;
            self.host.status.hardware_details = None;
            self.host.status.ssh_status.rescue_key_fingerprint = None;
        }

        if os_rotated {
            match self.host.status.provisioning_state {
                State::Provisioning | State::EnsureProvisioned => {
                    info!(host = %self.host.name, "os ssh secret rotated, reinstalling image");
                    self.host.status.provisioning_state = State::ImageInstalling;
                }
                State::Provisioned => {
                    // The OS secret is pinned while provisioned; the recorded
                    // hash is left alone so the failure repeats until an
                    // operator intervenes.
                    return Some(self.record_failure(
                        ErrorType::RegistrationError,
                        "os ssh secret was rotated while the host is provisioned",
                    ));
                }
                _ => {}
            }
        }

        self.host.status.ssh_status.current_rescue = Some(SecretStatus::from_secret(
            &self.secrets.rescue.name.clone(),
            &self.secrets.rescue,
        ));
        self.host.status.ssh_status.current_os = Some(SecretStatus::from_secret(
            &self.host.spec.ssh_spec.secret_ref.name.clone(),
            &self.secrets.os,
        ));
        None
    }

    fn advance(&mut self, from: State) {
        let next = match from {
            State::None => State::Registering,
            State::Registering => State::Available,
            State::Available => State::ImageInstalling,
            State::ImageInstalling => State::Provisioning,
            State::Provisioning => State::EnsureProvisioned,
            State::EnsureProvisioned => State::Provisioned,
            State::Provisioned => State::Provisioned,
            State::Deprovisioning => State::Available,
            State::Deleting => State::Deleting,
        };
        if next != from {
            info!(host = %self.host.name, %from, to = %next, "phase complete");
        }

        // Completing a phase ends any counted-failure streak; a triggered
        // reboot state set by the completing handler survives into the next
        // phase, where the escalation ladder picks it up.
        if matches!(
            self.host.status.error_type,
            Some(ErrorType::RegistrationError)
                | Some(ErrorType::PreparationError)
                | Some(ErrorType::ProvisioningError)
                | Some(ErrorType::FatalError)
        ) {
            clear_error(&mut self.host.status);
        }
        self.host.status.provisioning_state = next;
    }

    fn record_failure(&mut self, error_type: ErrorType, message: &str) -> ActionResult {
        warn!(host = %self.host.name, %error_type, error_message = message, "host failed");
        set_error(&mut self.host.status, error_type, message);
        ActionResult::Failed {
            error_type,
            error_count: self.host.status.error_count,
        }
    }

    fn host_ip(&self) -> String {
        self.host.status.ip.clone().unwrap_or_default()
    }

    fn rescue_client(&self) -> Arc<dyn SshClient> {
        self.ssh_factory.client(SshTarget {
            ip: self.host_ip(),
            port: RESCUE_PORT,
            secret: self.secrets.rescue.clone(),
        })
    }

    fn os_client(&self, port: u16) -> Arc<dyn SshClient> {
        self.ssh_factory.client(SshTarget {
            ip: self.host_ip(),
            port,
            secret: self.secrets.os.clone(),
        })
    }

    /// Probes the rescue hostname and reclassifies ambiguous failures via the
    /// installed OS's port, per the secondary-probe pattern.
    async fn rescue_boot_state(&self) -> (SshOutput, BootState) {
        let rescue = self.rescue_client();
        let output = rescue.get_hostname().await;
        let mut boot_state = classify(&output, RESCUE_HOSTNAME, None);

        if matches!(
            boot_state,
            BootState::WrongSshKey | BootState::ConnectionRefused
        ) {
            let probe = self
                .os_client(self.host.spec.ssh_spec.port_after_install_image)
                .get_hostname()
                .await;
            boot_state = classify(&output, RESCUE_HOSTNAME, Some(&probe));
        }
        (output, boot_state)
    }

    async fn escalate(
        &mut self, boot_state: &BootState, wants_rescue: bool,
    ) -> Result<ActionResult, BareMetalError> {
        handle_incomplete_boot(
            self.host,
            self.robot,
            IncompleteBoot {
                is_timeout: matches!(boot_state, BootState::Timeout),
                is_connection_refused: matches!(boot_state, BootState::ConnectionRefused),
                wants_rescue,
            },
        )
        .await
    }

    async fn handle_none(&mut self) -> Result<ActionResult, BareMetalError> {
        let server = match self.robot.get_server(self.host.spec.server_id).await {
            Ok(server) => server,
            Err(RobotError::ServerNotFound) => {
                return Ok(
                    self.record_failure(ErrorType::RegistrationError, "server not found")
                );
            }
            Err(error) => return Err(error.into()),
        };
        self.host.status.ip = Some(server.server_ip.clone());

        match ensure_ssh_key(self.robot, &self.secrets.rescue).await? {
            KeyRegistration::Registered(key) => {
                self.host.status.ssh_status.rescue_key_fingerprint = Some(key.fingerprint);
                set_condition(
                    &mut self.host.status.conditions,
                    ConditionType::SshKeyRegistered,
                    true,
                    "Registered",
                    "",
                );
            }
            KeyRegistration::AlreadyExistsConflict => {
                return Ok(self.fail_key_conflict(&self.secrets.rescue.name.clone()));
            }
        }

        let options = self.robot.get_reboot(self.host.spec.server_id).await?;
        self.host.status.reboot_types = reboot_types_from_codes(&options.types)
            .map_err(|error| BareMetalError::Other(error.to_string()))?;

        if !server.rescue {
            set_condition(
                &mut self.host.status.conditions,
                ConditionType::RescueSystemAvailable,
                false,
                "Unavailable",
                "the vendor offers no rescue system for this server",
            );
            return Ok(self.record_failure(
                ErrorType::RegistrationError,
                "rescue system not available for server",
            ));
        }
        set_condition(
            &mut self.host.status.conditions,
            ConditionType::RescueSystemAvailable,
            true,
            "Available",
            "",
        );

        // The key may have rotated since the last activation, so any prior
        // rescue arming is dropped and redone with the current fingerprint.
        self.robot
            .delete_boot_rescue(self.host.spec.server_id)
            .await?;
        let fingerprint = self
            .host
            .status
            .ssh_status
            .rescue_key_fingerprint
            .clone()
            .unwrap_or_default();
        self.robot
            .set_boot_rescue(self.host.spec.server_id, &fingerprint)
            .await?;

        let Some((reboot_type, error_type)) = escalation::strongest_reboot(&self.host.status)
        else {
            return Ok(self.record_failure(ErrorType::FatalError, "no reboot method available"));
        };
        self.robot
            .reboot_server(self.host.spec.server_id, reboot_type)
            .await?;
        let message = match error_type {
            ErrorType::HardwareRebootTriggered => "hardware reboot triggered",
            _ => "software reboot triggered",
        };
        escalation::record(self.host, error_type, message);

        Ok(ActionResult::Complete)
    }

    async fn handle_registering(&mut self) -> Result<ActionResult, BareMetalError> {
        let (output, boot_state) = self.rescue_boot_state().await;

        match boot_state {
            BootState::Correct => {}
            BootState::StderrError(stderr) => return Err(BareMetalError::SshCommand(stderr)),
            BootState::Unknown(message) if output.error.is_some() => {
                return Err(BareMetalError::Other(message));
            }
            other => return self.escalate(&other, true).await,
        }
        escalation::clear_boot_triggered(self.host);

        if self.host.status.hardware_details.is_none() {
            let rescue = self.rescue_client();
            let details = InventoryCollector::new(rescue.as_ref()).collect().await?;
            self.host.status.hardware_details = Some(details);
        }

        let wwn = match &self.host.spec.root_device_hints {
            Some(hints) if hints.is_valid() => hints.wwn.clone(),
            _ => {
                return Ok(self.record_failure(
                    ErrorType::RegistrationError,
                    "no root device hints specified yet",
                ));
            }
        };
        let device_found = self
            .host
            .status
            .hardware_details
            .as_ref()
            .is_some_and(|details| details.storage_device_by_wwn(&wwn).is_some());
        if !device_found {
            return Ok(self.record_failure(
                ErrorType::RegistrationError,
                "no storage device found with root device hints",
            ));
        }

        Ok(ActionResult::Complete)
    }

    async fn handle_available(&mut self) -> Result<ActionResult, BareMetalError> {
        if self.host.is_claimed() {
            return Ok(ActionResult::Complete);
        }
        Ok(ActionResult::continue_after(AVAILABLE_REQUEUE))
    }

    async fn handle_image_installing(&mut self) -> Result<ActionResult, BareMetalError> {
        match ensure_ssh_key(self.robot, &self.secrets.os).await? {
            KeyRegistration::Registered(key) => {
                self.host.status.ssh_status.os_key_fingerprint = Some(key.fingerprint);
            }
            KeyRegistration::AlreadyExistsConflict => {
                return Ok(self.fail_key_conflict(&self.secrets.os.name.clone()));
            }
        }

        let (output, boot_state) = self.rescue_boot_state().await;
        match boot_state {
            BootState::Correct => {}
            BootState::StderrError(stderr) => return Err(BareMetalError::SshCommand(stderr)),
            BootState::Unknown(message) if output.error.is_some() => {
                return Err(BareMetalError::Other(message));
            }
            other => return self.escalate(&other, true).await,
        }
        escalation::clear_boot_triggered(self.host);

        let Some(install_image) = self.host.spec.install_image.clone() else {
            return Err(BareMetalError::Other("install image disappeared".into()));
        };
        let rescue = self.rescue_client();

        let image_path = if !install_image.image.url.is_empty() {
            let Some(suffix) = install_image.image.url_suffix() else {
                return Ok(
                    self.record_failure(ErrorType::ProvisioningError, "wrong image url suffix")
                );
            };
            let path = format!("/root/{}.{}", install_image.image.name, suffix);
            handle_ssh_error(
                rescue.download_image(&path, &install_image.image.url).await,
                "download image",
            )?;
            path
        } else if !install_image.image.path.is_empty() {
            install_image.image.path.clone()
        } else {
            return Ok(
                self.record_failure(ErrorType::ProvisioningError, "no image source provided")
            );
        };

        let device = self.root_device_name()?;
        let hostname = self.host.prefixed_server_name();
        let autosetup =
            crate::autosetup::render_autosetup(&hostname, &install_image, &[device], &image_path);
        handle_ssh_error(rescue.create_autosetup(&autosetup).await, "create autosetup")?;

        if let Some(script) = &install_image.post_install_script {
            handle_ssh_error(
                rescue.create_post_install_script(script).await,
                "create post install script",
            )?;
        }

        handle_ssh_error(
            rescue
                .execute_install_image(install_image.post_install_script.is_some())
                .await,
            "execute installimage",
        )?;

        self.robot
            .set_server_name(self.host.spec.server_id, &hostname)
            .await?;

        // The connection usually drops mid-reboot, so the output is only
        // logged.
        let reboot_output = rescue.reboot().await;
        debug!(host = %self.host.name, ?reboot_output, "rebooting out of rescue");
        escalation::record(self.host, ErrorType::SshRebootTriggered, "ssh reboot triggered");

        Ok(ActionResult::Complete)
    }

    async fn handle_provisioning(&mut self) -> Result<ActionResult, BareMetalError> {
        let os = self.os_client(self.host.spec.ssh_spec.port_after_install_image);
        let expected = self.host.expected_hostname();

        let output = os.get_hostname().await;
        let mut boot_state = classify(&output, &expected, None);
        if matches!(
            boot_state,
            BootState::WrongSshKey | BootState::ConnectionRefused
        ) {
            let probe = self.rescue_client().get_hostname().await;
            boot_state = classify(&output, &expected, Some(&probe));
        }

        match boot_state {
            BootState::Correct => {}
            BootState::StderrError(stderr) => return Err(BareMetalError::SshCommand(stderr)),
            BootState::Unknown(message) if output.error.is_some() => {
                return Err(BareMetalError::Other(message));
            }
            other => return self.escalate(&other, false).await,
        }
        escalation::clear_boot_triggered(self.host);

        let cloud_init = handle_ssh_error(os.ensure_cloud_init().await, "ensure cloud-init")?;
        if cloud_init.trim().is_empty() {
            return Err(BareMetalError::Other(
                "cloud-init is not installed on the image".into(),
            ));
        }

        handle_ssh_error(os.create_nocloud_directory().await, "create no-cloud directory")?;
        handle_ssh_error(os.create_meta_data(&expected).await, "create meta-data")?;
        let user_data = self.host.spec.user_data.clone().unwrap_or_default();
        handle_ssh_error(os.create_user_data(&user_data).await, "create user-data")?;

        let reboot_output = os.reboot().await;
        debug!(host = %self.host.name, ?reboot_output, "rebooting into cloud-init");
        escalation::record(self.host, ErrorType::SshRebootTriggered, "ssh reboot triggered");

        Ok(ActionResult::Complete)
    }

    async fn handle_ensure_provisioned(&mut self) -> Result<ActionResult, BareMetalError> {
        let new_port = self.host.spec.ssh_spec.port_after_cloud_init;
        let old_port = self.host.spec.ssh_spec.port_after_install_image;

        let client = self.os_client(new_port);
        let output = client.cloud_init_status().await;

        // Cloud-init may not have switched sshd to the new port yet. When the
        // ports differ, the old port still answers and knows how far
        // cloud-init got.
        if matches!(
            output.error,
            Some(hetzmetal_ssh::SshTransportError::ConnectionRefused)
        ) && new_port != old_port
        {
            let old_client = self.os_client(old_port);
            let old_output = old_client.cloud_init_status().await;
            return self.interpret_cloud_init(old_client, old_output).await;
        }

        self.interpret_cloud_init(client, output).await
    }

    async fn interpret_cloud_init(
        &mut self, client: Arc<dyn SshClient>, output: SshOutput,
    ) -> Result<ActionResult, BareMetalError> {
        use hetzmetal_ssh::SshTransportError;

        match &output.error {
            Some(SshTransportError::Timeout) => {
                return handle_incomplete_boot(
                    self.host,
                    self.robot,
                    IncompleteBoot {
                        is_timeout: true,
                        ..Default::default()
                    },
                )
                .await;
            }
            Some(SshTransportError::ConnectionRefused) => {
                return handle_incomplete_boot(
                    self.host,
                    self.robot,
                    IncompleteBoot {
                        is_connection_refused: true,
                        ..Default::default()
                    },
                )
                .await;
            }
            Some(SshTransportError::AuthenticationFailed) => {
                return Err(BareMetalError::WrongSshKey);
            }
            Some(SshTransportError::Other(message)) => {
                return Err(BareMetalError::Other(message.clone()));
            }
            None => {}
        }
        if !output.stderr.is_empty() {
            return Err(BareMetalError::SshCommand(output.stderr));
        }

        let status = output.stdout.trim();
        if status.contains("running") {
            return Ok(ActionResult::continue_after(CLOUD_INIT_REQUEUE));
        }
        if status.contains("disabled") {
            let reboot_output = client.reboot().await;
            debug!(host = %self.host.name, ?reboot_output, "cloud-init disabled, rebooting");
            escalation::record(self.host, ErrorType::SshRebootTriggered, "ssh reboot triggered");
            return Ok(ActionResult::continue_after(POST_REBOOT_REQUEUE));
        }
        if status.contains("error") {
            return Ok(
                self.record_failure(ErrorType::FatalError, "cloud-init failed with status: error")
            );
        }
        if status.contains("done") {
            // Cloud-init sometimes reports done after being killed mid-run;
            // a SIGTERM in its logs means the run has to be redone.
            let sigterm =
                handle_ssh_error(client.check_cloud_init_logs_for_sigterm().await, "check logs")?;
            if !sigterm.trim().is_empty() {
                warn!(host = %self.host.name, "cloud-init was killed mid-run, cleaning up and rebooting");
                handle_ssh_error(client.clean_cloud_init_logs().await, "clean cloud-init logs")?;
                handle_ssh_error(
                    client.clean_cloud_init_instances().await,
                    "clean cloud-init instances",
                )?;
                let reboot_output = client.reboot().await;
                debug!(host = %self.host.name, ?reboot_output, "rebooting after cloud-init cleanup");
                escalation::record(
                    self.host,
                    ErrorType::SshRebootTriggered,
                    "ssh reboot triggered",
                );
                return Ok(ActionResult::continue_after(POST_REBOOT_REQUEUE));
            }

            escalation::clear_boot_triggered(self.host);
            set_condition(
                &mut self.host.status.conditions,
                ConditionType::ProvisionSucceeded,
                true,
                "CloudInitDone",
                "",
            );
            return Ok(ActionResult::Complete);
        }

        Err(BareMetalError::Other(format!(
            "unexpected cloud-init status: {status}"
        )))
    }

    async fn handle_provisioned(&mut self) -> Result<ActionResult, BareMetalError> {
        if !self.host.has_reboot_annotation() {
            self.host.status.rebooted = false;
            return Ok(ActionResult::continue_after(PROVISIONED_REQUEUE));
        }

        let os = self.os_client(self.host.spec.ssh_spec.port_after_cloud_init);

        if !self.host.status.rebooted {
            let reboot_output = os.reboot().await;
            debug!(host = %self.host.name, ?reboot_output, "reboot requested via annotation");
            escalation::record(self.host, ErrorType::SshRebootTriggered, "ssh reboot triggered");
            self.host.status.rebooted = true;
            return Ok(ActionResult::continue_after(POST_REBOOT_REQUEUE));
        }

        let expected = self.host.expected_hostname();
        let output = os.get_hostname().await;
        match classify(&output, &expected, None) {
            BootState::Correct => {
                escalation::clear_boot_triggered(self.host);
                self.host.status.rebooted = false;
                self.host.clear_reboot_annotation();
                info!(host = %self.host.name, "annotated reboot confirmed");
                Ok(ActionResult::continue_after(PROVISIONED_REQUEUE))
            }
            BootState::StderrError(stderr) => Err(BareMetalError::SshCommand(stderr)),
            BootState::Unknown(message) if output.error.is_some() => {
                Err(BareMetalError::Other(message))
            }
            other => self.escalate(&other, false).await,
        }
    }

    async fn handle_deprovisioning(&mut self) -> Result<ActionResult, BareMetalError> {
        // Drop the machine-name prefix at the vendor.
        self.robot
            .set_server_name(self.host.spec.server_id, &self.host.name.clone())
            .await?;

        // Cluster membership reset is best effort; the node may already be
        // unreachable.
        let os = self.os_client(self.host.spec.ssh_spec.port_after_cloud_init);
        let output = os.reset_kubeadm().await;
        if !output.succeeded() {
            warn!(host = %self.host.name, ?output, "kubeadm reset failed, continuing deprovisioning");
        }

        self.host.spec.install_image = None;
        self.host.spec.user_data = None;
        self.host.spec.consumer_ref = None;
        self.host.spec.ssh_spec = SshSpec::default();
        self.host.status.ssh_status.os_key_fingerprint = None;
        self.host.status.ssh_status.current_os = None;
        self.host.status.rebooted = false;
        clear_error(&mut self.host.status);

        Ok(ActionResult::Complete)
    }

    async fn handle_deleting(&mut self) -> Result<ActionResult, BareMetalError> {
        info!(host = %self.host.name, "removing finalizer");
        self.host
            .finalizers
            .retain(|finalizer| finalizer != BARE_METAL_HOST_FINALIZER);
        Ok(ActionResult::DeleteComplete)
    }

    fn fail_key_conflict(&mut self, key_name: &str) -> ActionResult {
        set_condition(
            &mut self.host.status.conditions,
            ConditionType::SshKeyAlreadyExists,
            true,
            "KeyAlreadyExists",
            &format!("key material of {key_name} is already registered under a different name"),
        );
        self.record_failure(
            ErrorType::FatalError,
            "ssh key already registered under a different name",
        )
    }

    fn root_device_name(&self) -> Result<String, BareMetalError> {
        let wwn = self
            .host
            .spec
            .root_device_hints
            .as_ref()
            .map(|hints| hints.wwn.clone())
            .unwrap_or_default();
        self.host
            .status
            .hardware_details
            .as_ref()
            .and_then(|details| details.storage_device_by_wwn(&wwn))
            .map(|device| device.name.clone())
            .ok_or_else(|| {
                BareMetalError::Other("no storage device found with root device hints".into())
            })
    }
}
