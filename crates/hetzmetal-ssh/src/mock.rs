//! Scripted SSH client for the state-machine test suites. Each method pops
//! the next scripted output for its name, falling back to an empty success.

use std::collections::{
    HashMap,
    VecDeque,
};
use std::sync::{
    Arc,
    Mutex,
};

use async_trait::async_trait;

use crate::client::{
    SshClient,
    SshFactory,
    SshTarget,
};
use crate::output::SshOutput;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MockCall {
    pub method: String,
    pub arg: Option<String>,
}

#[derive(Default)]
struct MockState {
    responses: HashMap<String, VecDeque<SshOutput>>,
    calls: Vec<MockCall>,
}

#[derive(Default)]
pub struct MockSshClient {
    state: Mutex<MockState>,
}

impl MockSshClient {
    pub fn new() -> Self {
        MockSshClient::default()
    }

    /// Queues an output for the named method. Multiple outputs for the same
    /// method are returned in order; the last one repeats.
    pub fn script(self, method: &str, output: SshOutput) -> Self {
        self.push(method, output);
        self
    }

    pub fn push(&self, method: &str, output: SshOutput) {
        self.state
            .lock()
            .unwrap()
            .responses
            .entry(method.to_string())
            .or_default()
            .push_back(output);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    fn take(&self, method: &str, arg: Option<&str>) -> SshOutput {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall {
            method: method.to_string(),
            arg: arg.map(|a| a.to_string()),
        });

        match state.responses.get_mut(method) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => SshOutput::ok(""),
        }
    }
}

#[async_trait]
impl SshClient for MockSshClient {
    async fn get_hostname(&self) -> SshOutput {
        self.take("get_hostname", None)
    }

    async fn reboot(&self) -> SshOutput {
        self.take("reboot", None)
    }

    async fn get_hardware_details_ram(&self) -> SshOutput {
        self.take("get_hardware_details_ram", None)
    }

    async fn get_hardware_details_nics(&self) -> SshOutput {
        self.take("get_hardware_details_nics", None)
    }

    async fn get_hardware_details_storage(&self) -> SshOutput {
        self.take("get_hardware_details_storage", None)
    }

    async fn get_hardware_details_cpu_arch(&self) -> SshOutput {
        self.take("get_hardware_details_cpu_arch", None)
    }

    async fn get_hardware_details_cpu_model(&self) -> SshOutput {
        self.take("get_hardware_details_cpu_model", None)
    }

    async fn get_hardware_details_cpu_clock_gigahertz(&self) -> SshOutput {
        self.take("get_hardware_details_cpu_clock_gigahertz", None)
    }

    async fn get_hardware_details_cpu_threads(&self) -> SshOutput {
        self.take("get_hardware_details_cpu_threads", None)
    }

    async fn get_hardware_details_cpu_flags(&self) -> SshOutput {
        self.take("get_hardware_details_cpu_flags", None)
    }

    async fn download_image(&self, path: &str, _url: &str) -> SshOutput {
        self.take("download_image", Some(path))
    }

    async fn create_autosetup(&self, content: &str) -> SshOutput {
        self.take("create_autosetup", Some(content))
    }

    async fn create_post_install_script(&self, content: &str) -> SshOutput {
        self.take("create_post_install_script", Some(content))
    }

    async fn execute_install_image(&self, has_post_install_script: bool) -> SshOutput {
        self.take(
            "execute_install_image",
            Some(if has_post_install_script { "with-post-install" } else { "plain" }),
        )
    }

    async fn ensure_cloud_init(&self) -> SshOutput {
        self.take("ensure_cloud_init", None)
    }

    async fn create_nocloud_directory(&self) -> SshOutput {
        self.take("create_nocloud_directory", None)
    }

    async fn create_meta_data(&self, hostname: &str) -> SshOutput {
        self.take("create_meta_data", Some(hostname))
    }

    async fn create_user_data(&self, user_data: &str) -> SshOutput {
        self.take("create_user_data", Some(user_data))
    }

    async fn cloud_init_status(&self) -> SshOutput {
        self.take("cloud_init_status", None)
    }

    async fn check_cloud_init_logs_for_sigterm(&self) -> SshOutput {
        self.take("check_cloud_init_logs_for_sigterm", None)
    }

    async fn clean_cloud_init_logs(&self) -> SshOutput {
        self.take("clean_cloud_init_logs", None)
    }

    async fn clean_cloud_init_instances(&self) -> SshOutput {
        self.take("clean_cloud_init_instances", None)
    }

    async fn reset_kubeadm(&self) -> SshOutput {
        self.take("reset_kubeadm", None)
    }

    async fn execute_image_url_command(&self, command: &str) -> SshOutput {
        self.take("execute_image_url_command", Some(command))
    }

    async fn state_of_image_url_command(&self) -> SshOutput {
        self.take("state_of_image_url_command", None)
    }
}

/// Factory handing out per-port mock clients, so a test can script the rescue
/// system and the installed OS independently.
#[derive(Default)]
pub struct MockSshFactory {
    clients: Mutex<HashMap<u16, Arc<MockSshClient>>>,
}

impl MockSshFactory {
    pub fn new() -> Self {
        MockSshFactory::default()
    }

    /// Registers (or returns the existing) mock for a port.
    pub fn client_for_port(&self, port: u16) -> Arc<MockSshClient> {
        self.clients
            .lock()
            .unwrap()
            .entry(port)
            .or_insert_with(|| Arc::new(MockSshClient::new()))
            .clone()
    }
}

impl SshFactory for MockSshFactory {
    fn client(&self, target: SshTarget) -> Arc<dyn SshClient> {
        self.client_for_port(target.port)
    }
}
