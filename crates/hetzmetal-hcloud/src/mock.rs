//! In-memory cloud API used by the boot-machine tests.

use std::collections::{
    HashMap,
    VecDeque,
};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::HcloudClient;
use crate::error::HcloudError;
use crate::models::{
    Action,
    ActionStatus,
    CloudServer,
    ServerStatus,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HcloudCall {
    GetServer(i64),
    EnableRescue(i64),
    RebootServer(i64),
    GetAction(i64),
    ShutdownServer(i64),
    DeleteServer(i64),
    DetachFromLoadBalancer { load_balancer_id: i64, server_id: i64 },
}

#[derive(Default)]
struct State {
    servers: Vec<CloudServer>,
    next_action_id: i64,
    action_results: HashMap<i64, VecDeque<Action>>,
    rate_limit_all: Option<String>,
    calls: Vec<HcloudCall>,
}

#[derive(Default)]
pub struct MockHcloudClient {
    state: Mutex<State>,
}

impl MockHcloudClient {
    pub fn new() -> Self {
        let mock = MockHcloudClient::default();
        mock.state.lock().unwrap().next_action_id = 900;
        mock
    }

    pub fn with_server(self, server: CloudServer) -> Self {
        self.state.lock().unwrap().servers.push(server);
        self
    }

    /// Makes every call fail with a rate-limit error carrying this message.
    pub fn rate_limited(self, message: &str) -> Self {
        self.state.lock().unwrap().rate_limit_all = Some(message.to_string());
        self
    }

    /// Queues a poll result for the given action id. Without scripting,
    /// actions finish successfully on the first poll.
    pub fn script_action(&self, action_id: i64, status: ActionStatus, error: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .action_results
            .entry(action_id)
            .or_default()
            .push_back(Action {
                id: action_id,
                status,
                error: error.map(|e| e.to_string()),
            });
    }

    pub fn set_server_status(&self, server_id: i64, status: ServerStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(server) = state.servers.iter_mut().find(|s| s.id == server_id) {
            server.status = status;
        }
    }

    pub fn calls(&self) -> Vec<HcloudCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, matcher: impl Fn(&HcloudCall) -> bool) -> usize {
        self.calls().iter().filter(|call| matcher(call)).count()
    }

    fn next_action(state: &mut State) -> Action {
        state.next_action_id += 1;
        Action {
            id: state.next_action_id,
            status: ActionStatus::Running,
            error: None,
        }
    }

    fn check_rate_limit(state: &State) -> Result<(), HcloudError> {
        match &state.rate_limit_all {
            Some(message) => Err(HcloudError::RateLimitExceeded(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HcloudClient for MockHcloudClient {
    async fn get_server(&self, server_id: i64) -> Result<CloudServer, HcloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HcloudCall::GetServer(server_id));
        Self::check_rate_limit(&state)?;
        state
            .servers
            .iter()
            .find(|s| s.id == server_id)
            .cloned()
            .ok_or(HcloudError::NotFound)
    }

    async fn enable_rescue(&self, server_id: i64) -> Result<Action, HcloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HcloudCall::EnableRescue(server_id));
        Self::check_rate_limit(&state)?;
        Ok(Self::next_action(&mut state))
    }

    async fn reboot_server(&self, server_id: i64) -> Result<Action, HcloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HcloudCall::RebootServer(server_id));
        Self::check_rate_limit(&state)?;
        Ok(Self::next_action(&mut state))
    }

    async fn get_action(&self, action_id: i64) -> Result<Action, HcloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HcloudCall::GetAction(action_id));
        Self::check_rate_limit(&state)?;

        let scripted = state
            .action_results
            .get_mut(&action_id)
            .and_then(|queue| queue.pop_front());
        Ok(scripted.unwrap_or(Action {
            id: action_id,
            status: ActionStatus::Success,
            error: None,
        }))
    }

    async fn shutdown_server(&self, server_id: i64) -> Result<Action, HcloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HcloudCall::ShutdownServer(server_id));
        Self::check_rate_limit(&state)?;
        if let Some(server) = state.servers.iter_mut().find(|s| s.id == server_id) {
            server.status = ServerStatus::Off;
        }
        Ok(Self::next_action(&mut state))
    }

    async fn delete_server(&self, server_id: i64) -> Result<(), HcloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HcloudCall::DeleteServer(server_id));
        Self::check_rate_limit(&state)?;
        state.servers.retain(|s| s.id != server_id);
        Ok(())
    }

    async fn detach_from_load_balancer(
        &self, load_balancer_id: i64, server_id: i64,
    ) -> Result<(), HcloudError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(HcloudCall::DetachFromLoadBalancer {
            load_balancer_id,
            server_id,
        });
        Self::check_rate_limit(&state)?;
        Ok(())
    }
}
