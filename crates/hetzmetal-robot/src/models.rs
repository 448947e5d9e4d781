use serde::{
    Deserialize,
    Serialize,
};

/// A bare-metal server as reported by the vendor.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Server {
    pub server_number: i64,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub server_ip: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub dc: String,
    /// Whether the vendor offers a rescue system for this server.
    #[serde(default)]
    pub rescue: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SshKey {
    pub name: String,
    pub fingerprint: String,
    #[serde(default)]
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub data: String,
}

/// Rescue-boot configuration of a server.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BootRescue {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub authorized_key_fingerprints: Vec<String>,
}

/// Reboot methods the vendor offers, as raw wire codes. They are converted
/// into the typed set via `reboot_types_from_codes` when a host registers.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RebootOptions {
    #[serde(rename = "type")]
    pub types: Vec<String>,
}
