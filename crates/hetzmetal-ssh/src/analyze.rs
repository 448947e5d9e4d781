use crate::output::{
    SshOutput,
    SshTransportError,
};

/// Rescue systems always report this hostname.
pub const RESCUE_HOSTNAME: &str = "rescue";

/// What a hostname probe tells us about the machine's boot progress.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BootState {
    /// The expected system answered with the expected hostname.
    Correct,
    /// Nothing answered in time; the server is likely still rebooting.
    Timeout,
    /// The port is closed; nothing listens there (yet).
    ConnectionRefused,
    /// The *other* system answered: booted into rescue when the installed OS
    /// was expected, or vice versa.
    WrongBoot,
    /// Something answered but reported no hostname yet.
    EmptyHostname,
    /// Authentication failed and the other system did not answer either.
    WrongSshKey,
    StderrError(String),
    Unknown(String),
}

/// Classifies one hostname probe.
///
/// Rescue-mode SSH and installed-OS SSH may share port 22 with different host
/// keys, or use different ports. When the primary probe fails with an
/// authentication or connection error, the caller may supply a probe taken on
/// the other (port, key) pair; if *anything* answered there, the server booted
/// into the wrong system rather than being unreachable. The probe only ever
/// reclassifies, it never commits state.
pub fn classify(
    output: &SshOutput, expected_hostname: &str, secondary_probe: Option<&SshOutput>,
) -> BootState {
    if let Some(error) = &output.error {
        return match error {
            SshTransportError::Timeout => BootState::Timeout,
            SshTransportError::AuthenticationFailed => {
                if probe_answered(secondary_probe) {
                    BootState::WrongBoot
                } else {
                    BootState::WrongSshKey
                }
            }
            SshTransportError::ConnectionRefused => {
                if probe_answered(secondary_probe) {
                    BootState::WrongBoot
                } else {
                    BootState::ConnectionRefused
                }
            }
            SshTransportError::Other(message) => BootState::Unknown(message.clone()),
        };
    }

    if !output.stderr.is_empty() {
        return BootState::StderrError(output.stderr.clone());
    }

    let hostname = output.trimmed_stdout();
    if hostname.is_empty() {
        return BootState::EmptyHostname;
    }
    if hostname == expected_hostname {
        return BootState::Correct;
    }
    if hostname == RESCUE_HOSTNAME {
        return BootState::WrongBoot;
    }

    BootState::Unknown(hostname.to_string())
}

fn probe_answered(probe: Option<&SshOutput>) -> bool {
    matches!(probe, Some(output) if output.error.is_none())
}
