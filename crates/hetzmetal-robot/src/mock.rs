//! In-memory stand-in for the vendor API, used by the state-machine test
//! suites across the workspace.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hetzmetal_commons::models::host::RebootType;

use crate::client::RobotClient;
use crate::error::RobotError;
use crate::models::{
    BootRescue,
    RebootOptions,
    Server,
    SshKey,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RobotCall {
    GetServer(i64),
    ListSshKeys,
    SetSshKey { name: String },
    GetBootRescue(i64),
    SetBootRescue { server_id: i64, fingerprint: String },
    DeleteBootRescue(i64),
    GetReboot(i64),
    RebootServer { server_id: i64, reboot_type: RebootType },
    SetServerName { server_id: i64, name: String },
}

#[derive(Default)]
struct State {
    servers: Vec<Server>,
    ssh_keys: Vec<SshKey>,
    rescue: HashMap<i64, BootRescue>,
    reboot_codes: Vec<String>,
    set_ssh_key_error: Option<RobotError>,
    calls: Vec<RobotCall>,
}

#[derive(Default)]
pub struct MockRobotClient {
    state: Mutex<State>,
}

impl MockRobotClient {
    pub fn new() -> Self {
        let mock = MockRobotClient::default();
        mock.state.lock().unwrap().reboot_codes =
            vec!["sw".to_string(), "hw".to_string(), "power".to_string()];
        mock
    }

    pub fn with_server(self, server: Server) -> Self {
        self.state.lock().unwrap().servers.push(server);
        self
    }

    pub fn with_ssh_key(self, key: SshKey) -> Self {
        self.state.lock().unwrap().ssh_keys.push(key);
        self
    }

    pub fn with_reboot_codes(self, codes: &[&str]) -> Self {
        self.state.lock().unwrap().reboot_codes =
            codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_active_rescue(self, server_id: i64) -> Self {
        self.state.lock().unwrap().rescue.insert(
            server_id,
            BootRescue {
                active: true,
                os: "linux".to_string(),
                authorized_key_fingerprints: Vec::new(),
            },
        );
        self
    }

    /// Makes every subsequent `set_ssh_key` call fail with the given error.
    pub fn fail_set_ssh_key(self, error: RobotError) -> Self {
        self.state.lock().unwrap().set_ssh_key_error = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<RobotCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn reboots(&self) -> Vec<(i64, RebootType)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RobotCall::RebootServer {
                    server_id,
                    reboot_type,
                } => Some((server_id, reboot_type)),
                _ => None,
            })
            .collect()
    }

    pub fn registered_ssh_keys(&self) -> Vec<SshKey> {
        self.state.lock().unwrap().ssh_keys.clone()
    }

    pub fn rescue_state(&self, server_id: i64) -> BootRescue {
        self.state
            .lock()
            .unwrap()
            .rescue
            .get(&server_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RobotClient for MockRobotClient {
    async fn get_server(&self, server_id: i64) -> Result<Server, RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::GetServer(server_id));
        state
            .servers
            .iter()
            .find(|s| s.server_number == server_id)
            .cloned()
            .ok_or(RobotError::ServerNotFound)
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>, RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::ListSshKeys);
        Ok(state.ssh_keys.clone())
    }

    async fn set_ssh_key(&self, name: &str, public_key: &str) -> Result<SshKey, RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::SetSshKey {
            name: name.to_string(),
        });

        if let Some(error) = state.set_ssh_key_error.clone() {
            return Err(error);
        }

        let key = SshKey {
            name: name.to_string(),
            fingerprint: format!("fp-{name}"),
            key_type: "ED25519".to_string(),
            size: 256,
            data: public_key.to_string(),
        };
        state.ssh_keys.push(key.clone());
        Ok(key)
    }

    async fn get_boot_rescue(&self, server_id: i64) -> Result<BootRescue, RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::GetBootRescue(server_id));
        Ok(state.rescue.get(&server_id).cloned().unwrap_or_default())
    }

    async fn set_boot_rescue(
        &self, server_id: i64, fingerprint: &str,
    ) -> Result<BootRescue, RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::SetBootRescue {
            server_id,
            fingerprint: fingerprint.to_string(),
        });

        let rescue = BootRescue {
            active: true,
            os: "linux".to_string(),
            authorized_key_fingerprints: vec![fingerprint.to_string()],
        };
        state.rescue.insert(server_id, rescue.clone());
        Ok(rescue)
    }

    async fn delete_boot_rescue(&self, server_id: i64) -> Result<BootRescue, RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::DeleteBootRescue(server_id));

        let rescue = BootRescue::default();
        state.rescue.insert(server_id, rescue.clone());
        Ok(rescue)
    }

    async fn get_reboot(&self, server_id: i64) -> Result<RebootOptions, RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::GetReboot(server_id));
        Ok(RebootOptions {
            types: state.reboot_codes.clone(),
        })
    }

    async fn reboot_server(
        &self, server_id: i64, reboot_type: RebootType,
    ) -> Result<(), RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::RebootServer {
            server_id,
            reboot_type,
        });
        Ok(())
    }

    async fn set_server_name(&self, server_id: i64, name: &str) -> Result<Server, RobotError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RobotCall::SetServerName {
            server_id,
            name: name.to_string(),
        });

        match state
            .servers
            .iter_mut()
            .find(|s| s.server_number == server_id)
        {
            Some(server) => {
                server.server_name = name.to_string();
                Ok(server.clone())
            }
            None => Err(RobotError::ServerNotFound),
        }
    }
}
