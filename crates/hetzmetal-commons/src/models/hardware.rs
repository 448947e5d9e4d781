use serde::{
    Deserialize,
    Serialize,
};

/// Hardware inventory of a physical server, collected once while the host is
/// in the rescue system and immutable afterwards.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct HardwareDetails {
    pub ram_mebibytes: u64,
    #[serde(default)]
    pub nics: Vec<Nic>,
    #[serde(default)]
    pub storage: Vec<StorageDevice>,
    #[serde(default)]
    pub cpu: Cpu,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Nic {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub speed_mbps: i64,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageDevice {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hctl: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub wwn: String,
    /// True for rotational media, false for solid state.
    #[serde(default)]
    pub rota: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Cpu {
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub clock_gigahertz: String,
    #[serde(default)]
    pub threads: u32,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl HardwareDetails {
    /// Looks up the storage device selected by a WWN root-device hint.
    pub fn storage_device_by_wwn(&self, wwn: &str) -> Option<&StorageDevice> {
        self.storage.iter().find(|device| device.wwn == wwn)
    }
}
