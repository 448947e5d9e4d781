use std::time::Duration;

use chrono::Utc;
use hetzmetal_commons::models::host::{
    BareMetalHost,
    ErrorType,
    HostStatus,
    RebootType,
};
use hetzmetal_commons::utils::error::{
    clear_error,
    set_error,
};
use hetzmetal_robot::RobotClient;
use tracing::{
    info,
    warn,
};

use crate::error::BareMetalError;
use crate::reconcile::ActionResult;

pub const SSH_RESET_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const SOFTWARE_RESET_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const HARDWARE_RESET_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const CONNECTION_ERROR_GRACE: Duration = Duration::from_secs(60);

const REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// What the hostname probe told us, reduced to the two signals the ladder
/// keys on. Everything that is neither a timeout nor a refused connection is
/// treated as "booted into the wrong system".
#[derive(Clone, Copy, Debug, Default)]
pub struct IncompleteBoot {
    pub is_timeout: bool,
    pub is_connection_refused: bool,
    /// Re-arm the rescue system before issuing any reboot, so the server
    /// comes back up in rescue rather than the installed OS.
    pub wants_rescue: bool,
}

/// Climbs the reboot-escalation ladder one rung at a time.
///
/// The last attempted escalation lives in `(error_type, last_updated)` on the
/// host so the sequence stays level-triggered and crash-safe; each rung waits
/// out its timeout before the next, more forceful reboot is issued.
pub async fn handle_incomplete_boot(
    host: &mut BareMetalHost, robot: &dyn RobotClient, probe: IncompleteBoot,
) -> Result<ActionResult, BareMetalError> {
    if probe.is_connection_refused {
        return handle_connection_refused(host);
    }

    match host.status.error_type {
        Some(ErrorType::SshRebootTriggered) => {
            // A non-timeout answer means the server is up, just in the wrong
            // system; waiting out the SSH reset timeout would be pointless.
            if !probe.is_timeout || has_timed_out(&host.status, SSH_RESET_TIMEOUT) {
                return escalate_past_ssh(host, robot, probe.wants_rescue).await;
            }
            Ok(ActionResult::continue_after(REQUEUE_DELAY))
        }
        Some(ErrorType::SoftwareRebootTriggered) => {
            if has_timed_out(&host.status, SOFTWARE_RESET_TIMEOUT) {
                return issue_reboot(
                    host,
                    robot,
                    RebootType::Hardware,
                    ErrorType::HardwareRebootTriggered,
                    probe.wants_rescue,
                )
                .await;
            }
            Ok(ActionResult::continue_after(REQUEUE_DELAY))
        }
        Some(ErrorType::HardwareRebootTriggered) | Some(ErrorType::HardwareRebootFailed) => {
            if has_timed_out(&host.status, HARDWARE_RESET_TIMEOUT) {
                warn!(host = %host.name, "hardware reboot did not complete in time, retrying");
                return issue_reboot(
                    host,
                    robot,
                    RebootType::Hardware,
                    ErrorType::HardwareRebootFailed,
                    probe.wants_rescue,
                )
                .await;
            }
            Ok(ActionResult::continue_after(REQUEUE_DELAY))
        }
        _ => {
            if probe.is_timeout {
                // The server has not come back from its previous reboot yet;
                // start the clock without issuing another one.
                record(host, ErrorType::SshRebootTriggered, "ssh reboot triggered");
                return Ok(ActionResult::continue_after(REQUEUE_DELAY));
            }
            escalate_past_ssh(host, robot, probe.wants_rescue).await
        }
    }
}

fn handle_connection_refused(host: &mut BareMetalHost) -> Result<ActionResult, BareMetalError> {
    if host.status.error_type == Some(ErrorType::ConnectionError)
        && has_timed_out(&host.status, CONNECTION_ERROR_GRACE)
    {
        record(
            host,
            ErrorType::FatalError,
            "connection refused for over a minute, ssh port is likely wrong",
        );
        return Ok(failed(&host.status));
    }

    if host.status.error_type != Some(ErrorType::ConnectionError) {
        record(host, ErrorType::ConnectionError, "ssh connection refused");
    }
    Ok(ActionResult::continue_after(REQUEUE_DELAY))
}

/// The strongest reboot the vendor offers together with the triggered state
/// recording it: software when available, hardware otherwise.
pub(crate) fn strongest_reboot(status: &HostStatus) -> Option<(RebootType, ErrorType)> {
    if status.has_reboot_type(RebootType::Software) {
        return Some((RebootType::Software, ErrorType::SoftwareRebootTriggered));
    }
    if status.has_reboot_type(RebootType::Hardware) {
        return Some((RebootType::Hardware, ErrorType::HardwareRebootTriggered));
    }
    None
}

async fn escalate_past_ssh(
    host: &mut BareMetalHost, robot: &dyn RobotClient, wants_rescue: bool,
) -> Result<ActionResult, BareMetalError> {
    let Some((reboot_type, error_type)) = strongest_reboot(&host.status) else {
        record(host, ErrorType::FatalError, "no reboot method available");
        return Ok(failed(&host.status));
    };
    issue_reboot(host, robot, reboot_type, error_type, wants_rescue).await
}

async fn issue_reboot(
    host: &mut BareMetalHost, robot: &dyn RobotClient, reboot_type: RebootType,
    error_type: ErrorType, wants_rescue: bool,
) -> Result<ActionResult, BareMetalError> {
    if wants_rescue {
        ensure_rescue_armed(host, robot).await?;
    }

    robot.reboot_server(host.spec.server_id, reboot_type).await?;
    info!(host = %host.name, ?reboot_type, "issued reboot");

    let message = match error_type {
        ErrorType::SoftwareRebootTriggered => "software reboot triggered",
        ErrorType::HardwareRebootTriggered => "hardware reboot triggered",
        ErrorType::HardwareRebootFailed => "hardware reboot failed, issued another one",
        _ => "reboot triggered",
    };
    record(host, error_type, message);
    Ok(ActionResult::continue_after(REQUEUE_DELAY))
}

/// Fetches the rescue state and re-arms it with the registered rescue key if
/// it went inactive, so the upcoming reboot lands in the rescue system.
pub async fn ensure_rescue_armed(
    host: &BareMetalHost, robot: &dyn RobotClient,
) -> Result<(), BareMetalError> {
    let rescue = robot.get_boot_rescue(host.spec.server_id).await?;
    if rescue.active {
        return Ok(());
    }

    let fingerprint = host
        .status
        .ssh_status
        .rescue_key_fingerprint
        .clone()
        .ok_or_else(|| BareMetalError::Other("rescue ssh key fingerprint not recorded".into()))?;
    robot
        .set_boot_rescue(host.spec.server_id, &fingerprint)
        .await?;
    Ok(())
}

/// Clears a boot-ladder error once the expected system answered. Counted
/// failures (registration, provisioning, ...) are left alone so their streaks
/// keep driving the backoff.
pub(crate) fn clear_boot_triggered(host: &mut BareMetalHost) {
    if matches!(
        host.status.error_type,
        Some(ErrorType::SshRebootTriggered)
            | Some(ErrorType::SoftwareRebootTriggered)
            | Some(ErrorType::HardwareRebootTriggered)
            | Some(ErrorType::HardwareRebootFailed)
            | Some(ErrorType::ConnectionError)
    ) {
        clear_error(&mut host.status);
    }
}

/// Records a ladder transition. Unlike a plain `set_error`, the timestamp is
/// refreshed even for a repeated `(type, message)` pair: each issued reboot
/// starts a new wait window.
pub(crate) fn record(host: &mut BareMetalHost, error_type: ErrorType, message: &str) {
    set_error(&mut host.status, error_type, message);
    host.status.last_updated = Some(Utc::now());
}

fn failed(status: &HostStatus) -> ActionResult {
    ActionResult::Failed {
        error_type: status.error_type.unwrap_or(ErrorType::FatalError),
        error_count: status.error_count,
    }
}

pub fn has_timed_out(status: &HostStatus, timeout: Duration) -> bool {
    match status.last_updated {
        Some(last_updated) => Utc::now()
            .signed_duration_since(last_updated)
            .to_std()
            .map(|elapsed| elapsed >= timeout)
            .unwrap_or(false),
        None => true,
    }
}
