use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_ssh2_lite::{
    AsyncSession,
    TokioTcpStream,
};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::lookup_host;
use tracing::debug;

use crate::client::{
    SshClient,
    SshFactory,
    SshTarget,
};
use crate::output::{
    SshOutput,
    SshTransportError,
};

const SSH_USER: &str = "root";
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(3600);

/// SSH client that opens one session per command against a fixed target.
///
/// Commands are bounded by a timeout covering connect, handshake,
/// authentication and execution; long-running installer steps get their own
/// budgets.
pub struct SshConnection {
    target: SshTarget,
    command_timeout: Duration,
}

impl SshConnection {
    pub fn new(target: SshTarget) -> Self {
        SshConnection {
            target,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn run(&self, command: &str) -> SshOutput {
        self.run_with_timeout(command, self.command_timeout).await
    }

    async fn run_with_timeout(&self, command: &str, timeout: Duration) -> SshOutput {
        debug!(target = %self.target.ip, port = self.target.port, "running ssh command");
        match tokio::time::timeout(timeout, self.exec(command)).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => SshOutput::transport_error(error),
            Err(_) => SshOutput::transport_error(SshTransportError::Timeout),
        }
    }

    async fn exec(&self, command: &str) -> Result<SshOutput, SshTransportError> {
        let addr = self.resolve().await?;

        let mut session = AsyncSession::<TokioTcpStream>::connect(addr, None)
            .await
            .map_err(map_transport_error)?;
        session.handshake().await.map_err(map_transport_error)?;
        session
            .userauth_pubkey_memory(
                SSH_USER,
                Some(&self.target.secret.public_key),
                &self.target.secret.private_key,
                None,
            )
            .await
            .map_err(|_| SshTransportError::AuthenticationFailed)?;

        let mut channel = session
            .channel_session()
            .await
            .map_err(map_transport_error)?;
        channel.exec(command).await.map_err(map_transport_error)?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .await
            .map_err(|e| SshTransportError::Other(e.to_string()))?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .await
            .map_err(|e| SshTransportError::Other(e.to_string()))?;

        channel.close().await.map_err(map_transport_error)?;

        Ok(SshOutput {
            stdout,
            stderr,
            error: None,
        })
    }

    async fn resolve(&self) -> Result<SocketAddr, SshTransportError> {
        let mut addrs = lookup_host((self.target.ip.as_str(), self.target.port))
            .await
            .map_err(map_io_error)?;
        addrs
            .next()
            .ok_or_else(|| SshTransportError::Other(format!("cannot resolve {}", self.target.ip)))
    }
}

fn map_transport_error(error: async_ssh2_lite::Error) -> SshTransportError {
    match error {
        async_ssh2_lite::Error::Io(io) => map_io_error(io),
        other => SshTransportError::Other(other.to_string()),
    }
}

fn map_io_error(error: std::io::Error) -> SshTransportError {
    match error.kind() {
        ErrorKind::ConnectionRefused => SshTransportError::ConnectionRefused,
        ErrorKind::TimedOut => SshTransportError::Timeout,
        _ => SshTransportError::Other(error.to_string()),
    }
}

const NIC_COMMAND: &str = r#"for iname in $(ip a | awk '/state UP/{print $2}' | sed 's/://'); do
mac=$(cat /sys/class/net/$iname/address)
speed=$(cat /sys/class/net/$iname/speed 2>/dev/null || echo 0)
model=$(lspci -s "$(basename "$(readlink /sys/class/net/$iname/device 2>/dev/null)" 2>/dev/null)" 2>/dev/null | cut -d: -f3- | xargs)
ip=$(ip -o -4 addr show dev $iname 2>/dev/null | awk '{print $4}' | head -1)
echo "name=\"$iname\" model=\"$model\" mac=\"$mac\" ip=\"$ip\" speedMbps=\"$speed\""
done"#;

const STORAGE_COMMAND: &str =
    r#"lsblk -b -P -o "NAME,TYPE,SIZE,VENDOR,MODEL,SERIAL,WWN,HCTL,ROTA""#;

const IMAGE_COMMAND_LOG: &str = "/root/image-url-command.log";
const IMAGE_COMMAND_DONE: &str = "/root/.image-url-command-done";
const IMAGE_COMMAND_FAILED: &str = "/root/.image-url-command-failed";

#[async_trait]
impl SshClient for SshConnection {
    async fn get_hostname(&self) -> SshOutput {
        self.run("hostname").await
    }

    async fn reboot(&self) -> SshOutput {
        self.run("reboot").await
    }

    async fn get_hardware_details_ram(&self) -> SshOutput {
        self.run("grep MemTotal /proc/meminfo | awk '{print $2}'")
            .await
    }

    async fn get_hardware_details_nics(&self) -> SshOutput {
        self.run(NIC_COMMAND).await
    }

    async fn get_hardware_details_storage(&self) -> SshOutput {
        self.run(STORAGE_COMMAND).await
    }

    async fn get_hardware_details_cpu_arch(&self) -> SshOutput {
        self.run("lscpu | grep 'Architecture:' | awk '{print $2}'")
            .await
    }

    async fn get_hardware_details_cpu_model(&self) -> SshOutput {
        self.run("lscpu | grep 'Model name:' | sed 's/Model name:[[:space:]]*//'")
            .await
    }

    async fn get_hardware_details_cpu_clock_gigahertz(&self) -> SshOutput {
        self.run("lscpu | grep 'CPU max MHz:' | awk '{printf \"%.1f\", $4/1000}'")
            .await
    }

    async fn get_hardware_details_cpu_threads(&self) -> SshOutput {
        self.run("grep -c processor /proc/cpuinfo").await
    }

    async fn get_hardware_details_cpu_flags(&self) -> SshOutput {
        self.run("lscpu | grep 'Flags:' | sed 's/Flags:[[:space:]]*//'")
            .await
    }

    async fn download_image(&self, path: &str, url: &str) -> SshOutput {
        self.run_with_timeout(
            &format!("wget --no-check-certificate -O {path} {url}"),
            DOWNLOAD_TIMEOUT,
        )
        .await
    }

    async fn create_autosetup(&self, content: &str) -> SshOutput {
        self.run(&format!("cat << 'EOF' > /autosetup\n{content}\nEOF"))
            .await
    }

    async fn create_post_install_script(&self, content: &str) -> SshOutput {
        self.run(&format!(
            "cat << 'EOF' > /root/post-install.sh\n{content}\nEOF\nchmod +x /root/post-install.sh"
        ))
        .await
    }

    async fn execute_install_image(&self, has_post_install_script: bool) -> SshOutput {
        let command = if has_post_install_script {
            "export TERM=xterm; /root/.oldroot/nfs/install/installimage -a -c /autosetup -x /root/post-install.sh"
        } else {
            "export TERM=xterm; /root/.oldroot/nfs/install/installimage -a -c /autosetup"
        };
        self.run_with_timeout(command, INSTALL_TIMEOUT).await
    }

    async fn ensure_cloud_init(&self) -> SshOutput {
        self.run("command -v cloud-init").await
    }

    async fn create_nocloud_directory(&self) -> SshOutput {
        self.run("mkdir -p /var/lib/cloud/seed/nocloud-net").await
    }

    async fn create_meta_data(&self, hostname: &str) -> SshOutput {
        self.run(&format!(
            "echo 'instance-id: {hostname}' > /var/lib/cloud/seed/nocloud-net/meta-data"
        ))
        .await
    }

    async fn create_user_data(&self, user_data: &str) -> SshOutput {
        self.run(&format!(
            "cat << 'EOF' > /var/lib/cloud/seed/nocloud-net/user-data\n{user_data}\nEOF"
        ))
        .await
    }

    async fn cloud_init_status(&self) -> SshOutput {
        self.run("cloud-init status").await
    }

    async fn check_cloud_init_logs_for_sigterm(&self) -> SshOutput {
        self.run("grep SIGTERM /var/log/cloud-init.log || true").await
    }

    async fn clean_cloud_init_logs(&self) -> SshOutput {
        self.run("cloud-init clean --logs").await
    }

    async fn clean_cloud_init_instances(&self) -> SshOutput {
        self.run("rm -rf /var/lib/cloud/instances").await
    }

    async fn reset_kubeadm(&self) -> SshOutput {
        self.run_with_timeout("kubeadm reset -f", Duration::from_secs(60))
            .await
    }

    async fn execute_image_url_command(&self, command: &str) -> SshOutput {
        self.run(&format!(
            "rm -f {IMAGE_COMMAND_DONE} {IMAGE_COMMAND_FAILED}\n\
             nohup sh -c '{command} && touch {IMAGE_COMMAND_DONE} || touch {IMAGE_COMMAND_FAILED}' \
             >> {IMAGE_COMMAND_LOG} 2>&1 &\necho started"
        ))
        .await
    }

    async fn state_of_image_url_command(&self) -> SshOutput {
        self.run(&format!(
            "if [ -e {IMAGE_COMMAND_DONE} ]; then echo done; \
             elif [ -e {IMAGE_COMMAND_FAILED} ]; then echo failed; \
             else echo running; fi"
        ))
        .await
    }
}

/// Factory producing real connections; the state machines depend only on the
/// `SshFactory` trait so tests can swap in scripted clients.
#[derive(Default)]
pub struct SessionFactory;

impl SshFactory for SessionFactory {
    fn client(&self, target: SshTarget) -> Arc<dyn SshClient> {
        Arc::new(SshConnection::new(target))
    }
}
