use std::collections::BTreeMap;
use std::fmt;

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

use crate::models::conditions::Condition;
use crate::models::hardware::HardwareDetails;
use crate::models::install_image::InstallImage;
use crate::models::ssh::{
    SshSpec,
    SshStatus,
};

/// Annotation a user places on a host to request a one-off reboot while the
/// host is in the Provisioned state.
pub const REBOOT_ANNOTATION: &str = "hetzmetal.io/reboot";

pub const BARE_METAL_HOST_FINALIZER: &str = "hetzmetal.io/bare-metal-host";

/// Prefix applied to the server name at the vendor while a host is claimed by
/// a machine, and stripped again during deprovisioning.
pub const SERVER_NAME_PREFIX: &str = "bm-";

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningState {
    #[default]
    None,
    Registering,
    Available,
    ImageInstalling,
    Provisioning,
    EnsureProvisioned,
    Provisioned,
    Deprovisioning,
    Deleting,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisioningState::None => "none",
            ProvisioningState::Registering => "registering",
            ProvisioningState::Available => "available",
            ProvisioningState::ImageInstalling => "image-installing",
            ProvisioningState::Provisioning => "provisioning",
            ProvisioningState::EnsureProvisioned => "ensure-provisioned",
            ProvisioningState::Provisioned => "provisioned",
            ProvisioningState::Deprovisioning => "deprovisioning",
            ProvisioningState::Deleting => "deleting",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorType {
    SshRebootTriggered,
    SoftwareRebootTriggered,
    HardwareRebootTriggered,
    HardwareRebootFailed,
    ConnectionError,
    RegistrationError,
    PreparationError,
    ProvisioningError,
    FatalError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorType::SshRebootTriggered => "ssh reboot triggered",
            ErrorType::SoftwareRebootTriggered => "software reboot triggered",
            ErrorType::HardwareRebootTriggered => "hardware reboot triggered",
            ErrorType::HardwareRebootFailed => "hardware reboot failed",
            ErrorType::ConnectionError => "connection error",
            ErrorType::RegistrationError => "registration error",
            ErrorType::PreparationError => "preparation error",
            ErrorType::ProvisioningError => "provisioning error",
            ErrorType::FatalError => "fatal error",
        };
        write!(f, "{s}")
    }
}

/// Reboot methods the vendor can offer for a server. The vendor reports them
/// as short string codes which must all be known to us.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RebootType {
    #[serde(rename = "ssh")]
    Ssh,
    #[serde(rename = "sw")]
    Software,
    #[serde(rename = "hw")]
    Hardware,
    #[serde(rename = "power")]
    Power,
}

#[derive(Debug, Error)]
#[error("unknown reboot type: {0}")]
pub struct UnknownRebootType(pub String);

/// Roundtrips the vendor's reboot-type codes through the known enum set.
/// Unknown codes are rejected instead of silently dropped.
pub fn reboot_types_from_codes(codes: &[String]) -> Result<Vec<RebootType>, UnknownRebootType> {
    codes
        .iter()
        .map(|code| match code.as_str() {
            "ssh" => Ok(RebootType::Ssh),
            "sw" => Ok(RebootType::Software),
            "hw" => Ok(RebootType::Hardware),
            "power" => Ok(RebootType::Power),
            other => Err(UnknownRebootType(other.to_string())),
        })
        .collect()
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RootDeviceHints {
    #[serde(default)]
    pub wwn: String,
}

impl RootDeviceHints {
    pub fn is_valid(&self) -> bool {
        !self.wwn.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct HostSpec {
    pub server_id: i64,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_device_hints: Option<RootDeviceHints>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_image: Option<InstallImage>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(default)]
    pub ssh_spec: SshSpec,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_ref: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct HostStatus {
    #[serde(default)]
    pub provisioning_state: ProvisioningState,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_details: Option<HardwareDetails>,
    #[serde(default)]
    pub reboot_types: Vec<RebootType>,
    #[serde(default)]
    pub ssh_status: SshStatus,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default)]
    pub rebooted: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl HostStatus {
    pub fn has_reboot_type(&self, reboot_type: RebootType) -> bool {
        self.reboot_types.contains(&reboot_type)
    }
}

/// The single owned entity: one physical server rented from the vendor,
/// together with everything the state machine needs to resume across process
/// restarts.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BareMetalHost {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub spec: HostSpec,
    #[serde(default)]
    pub status: HostStatus,
}

impl BareMetalHost {
    pub fn has_reboot_annotation(&self) -> bool {
        self.annotations.contains_key(REBOOT_ANNOTATION)
    }

    pub fn clear_reboot_annotation(&mut self) {
        self.annotations.remove(REBOOT_ANNOTATION);
    }

    pub fn deletion_requested(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// A host counts as claimed once a machine reserved it and an install
    /// image was provided.
    pub fn is_claimed(&self) -> bool {
        self.spec.install_image.is_some() && self.spec.consumer_ref.is_some()
    }

    /// The name the server carries at the vendor while provisioned.
    pub fn prefixed_server_name(&self) -> String {
        match &self.spec.consumer_ref {
            Some(consumer) => format!("{SERVER_NAME_PREFIX}{consumer}"),
            None => format!("{SERVER_NAME_PREFIX}{}", self.name),
        }
    }

    /// The hostname expected on the installed operating system.
    pub fn expected_hostname(&self) -> String {
        self.prefixed_server_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_state_default() {
        assert_eq!(ProvisioningState::default(), ProvisioningState::None);
    }

    #[test]
    fn test_reboot_types_from_codes() {
        let codes = vec!["sw".to_string(), "hw".to_string(), "power".to_string()];
        let types = reboot_types_from_codes(&codes).unwrap();
        assert_eq!(
            types,
            vec![RebootType::Software, RebootType::Hardware, RebootType::Power]
        );
    }

    #[test]
    fn test_reboot_types_from_codes_unknown() {
        let codes = vec!["sw".to_string(), "warp".to_string()];
        let err = reboot_types_from_codes(&codes).unwrap_err();
        assert_eq!(err.to_string(), "unknown reboot type: warp");
    }

    #[test]
    fn test_reboot_annotation_roundtrip() {
        let mut host = BareMetalHost {
            name: "host-0".to_string(),
            ..Default::default()
        };
        assert!(!host.has_reboot_annotation());

        host.annotations
            .insert(REBOOT_ANNOTATION.to_string(), "".to_string());
        assert!(host.has_reboot_annotation());

        host.clear_reboot_annotation();
        assert!(!host.has_reboot_annotation());
    }

    #[test]
    fn test_prefixed_server_name_uses_consumer_ref() {
        let mut host = BareMetalHost {
            name: "host-0".to_string(),
            ..Default::default()
        };
        assert_eq!(host.prefixed_server_name(), "bm-host-0");

        host.spec.consumer_ref = Some("worker-3".to_string());
        assert_eq!(host.prefixed_server_name(), "bm-worker-3");
    }

    #[test]
    fn test_host_status_serde_roundtrip() {
        let mut status = HostStatus::default();
        status.provisioning_state = ProvisioningState::Registering;
        status.error_type = Some(ErrorType::SshRebootTriggered);
        status.error_message = "ssh reboot issued".to_string();
        status.error_count = 2;
        status.reboot_types = vec![RebootType::Software, RebootType::Hardware];

        let encoded = serde_json::to_string(&status).unwrap();
        let decoded: HostStatus = serde_json::from_str(&encoded).unwrap();
        assert_eq!(status, decoded);
    }
}
