use std::sync::Arc;

use async_trait::async_trait;
use hetzmetal_commons::models::ssh::SshSecret;

use crate::output::SshOutput;

/// One SSH endpoint: an address, a port, and the key material for it.
#[derive(Clone, Debug)]
pub struct SshTarget {
    pub ip: String,
    pub port: u16,
    pub secret: SshSecret,
}

/// Produces clients for the different (port, key) pairs a host goes through
/// during provisioning: rescue on 22, the installed OS on the
/// port-after-install-image, cloud-init's final sshd on the
/// port-after-cloud-init.
pub trait SshFactory: Send + Sync {
    fn client(&self, target: SshTarget) -> Arc<dyn SshClient>;
}

/// Commands the provisioner runs on a server. Every method returns the full
/// `SshOutput`; transport failures are carried inside the value so the
/// classifier can see them.
#[async_trait]
pub trait SshClient: Send + Sync {
    async fn get_hostname(&self) -> SshOutput;

    async fn reboot(&self) -> SshOutput;

    async fn get_hardware_details_ram(&self) -> SshOutput;

    async fn get_hardware_details_nics(&self) -> SshOutput;

    async fn get_hardware_details_storage(&self) -> SshOutput;

    async fn get_hardware_details_cpu_arch(&self) -> SshOutput;

    async fn get_hardware_details_cpu_model(&self) -> SshOutput;

    async fn get_hardware_details_cpu_clock_gigahertz(&self) -> SshOutput;

    async fn get_hardware_details_cpu_threads(&self) -> SshOutput;

    async fn get_hardware_details_cpu_flags(&self) -> SshOutput;

    async fn download_image(&self, path: &str, url: &str) -> SshOutput;

    async fn create_autosetup(&self, content: &str) -> SshOutput;

    async fn create_post_install_script(&self, content: &str) -> SshOutput;

    async fn execute_install_image(&self, has_post_install_script: bool) -> SshOutput;

    async fn ensure_cloud_init(&self) -> SshOutput;

    async fn create_nocloud_directory(&self) -> SshOutput;

    async fn create_meta_data(&self, hostname: &str) -> SshOutput;

    async fn create_user_data(&self, user_data: &str) -> SshOutput;

    async fn cloud_init_status(&self) -> SshOutput;

    async fn check_cloud_init_logs_for_sigterm(&self) -> SshOutput;

    async fn clean_cloud_init_logs(&self) -> SshOutput;

    async fn clean_cloud_init_instances(&self) -> SshOutput;

    async fn reset_kubeadm(&self) -> SshOutput;

    /// Starts the user-supplied image command in the background on a cloud
    /// VM's rescue system.
    async fn execute_image_url_command(&self, command: &str) -> SshOutput;

    /// Reports "running", "done" or "failed" for a previously started image
    /// command.
    async fn state_of_image_url_command(&self) -> SshOutput;
}
