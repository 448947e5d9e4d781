use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ConditionType {
    SshKeyRegistered,
    SshKeyAlreadyExists,
    RescueSystemAvailable,
    RateLimited,
    ProvisionSucceeded,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Sets a condition, updating the transition time only when the status flips.
pub fn set_condition(
    conditions: &mut Vec<Condition>, condition_type: ConditionType, status: bool, reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == condition_type)
    {
        if existing.status != status {
            existing.last_transition_time = Utc::now();
        }
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        return;
    }

    conditions.push(Condition {
        condition_type,
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Utc::now(),
    });
}

pub fn get_condition(
    conditions: &[Condition], condition_type: ConditionType,
) -> Option<&Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}
