use thiserror::Error;

/// Transport-level failure of an SSH command. The classifier switches on
/// these variants; call sites never match on error text.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SshTransportError {
    #[error("ssh command timed out")]
    Timeout,

    #[error("ssh authentication failed")]
    AuthenticationFailed,

    #[error("ssh connection refused")]
    ConnectionRefused,

    #[error("ssh transport error: {0}")]
    Other(String),
}

/// Result of one SSH command: both output streams plus the transport error,
/// if any. All three are meaningful to the boot classifier.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SshOutput {
    pub stdout: String,
    pub stderr: String,
    pub error: Option<SshTransportError>,
}

impl SshOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        SshOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            error: None,
        }
    }

    pub fn with_stderr(stderr: impl Into<String>) -> Self {
        SshOutput {
            stdout: String::new(),
            stderr: stderr.into(),
            error: None,
        }
    }

    pub fn transport_error(error: SshTransportError) -> Self {
        SshOutput {
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.stderr.is_empty()
    }

    /// Stdout without the trailing newline most commands emit.
    pub fn trimmed_stdout(&self) -> &str {
        self.stdout.trim_end_matches('\n')
    }
}
