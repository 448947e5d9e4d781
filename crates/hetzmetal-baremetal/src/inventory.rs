use hetzmetal_commons::models::hardware::{
    Cpu,
    HardwareDetails,
    Nic,
    StorageDevice,
};
use hetzmetal_ssh::{
    SshClient,
    SshOutput,
};
use serde::Deserialize;
use tracing::debug;

use crate::error::BareMetalError;

/// Turns one `key1="v1" key2="v2"` line into a JSON object string.
///
/// Computed by exactly two substitutions (`" ` becomes `","`, `="` becomes
/// `":"`) plus the `{"` wrapper; the closing quote of the last value supplies
/// the final quote of the object.
pub fn valid_json_from_ssh_output(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }

    let body = trimmed.replace("\" ", "\",\"").replace("=\"", "\":\"");
    format!("{{\"{body}}}")
}

pub(crate) fn handle_ssh_error(output: SshOutput, what: &str) -> Result<String, BareMetalError> {
    if let Some(error) = output.error {
        return Err(BareMetalError::Ssh(error));
    }
    if !output.stderr.is_empty() {
        return Err(BareMetalError::SshCommand(format!(
            "{what}: {}",
            output.stderr
        )));
    }
    Ok(output.stdout)
}

#[derive(Debug, Deserialize)]
struct NicWire {
    #[serde(default)]
    name: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    mac: String,
    #[serde(default)]
    ip: String,
    #[serde(default, rename = "speedMbps")]
    speed_mbps: String,
}

#[derive(Debug, Deserialize)]
struct StorageWire {
    #[serde(default, rename = "NAME")]
    name: String,
    #[serde(default, rename = "TYPE")]
    device_type: String,
    #[serde(default, rename = "SIZE")]
    size: String,
    #[serde(default, rename = "VENDOR")]
    vendor: String,
    #[serde(default, rename = "MODEL")]
    model: String,
    #[serde(default, rename = "SERIAL")]
    serial: String,
    #[serde(default, rename = "WWN")]
    wwn: String,
    #[serde(default, rename = "HCTL")]
    hctl: String,
    #[serde(default, rename = "ROTA")]
    rota: String,
}

/// Collects the hardware inventory of a server booted into the rescue
/// system. Every command goes through the same SSH error handling; parsing
/// failures abort the whole collection so the recorded details are either
/// complete or absent.
pub struct InventoryCollector<'a> {
    client: &'a dyn SshClient,
}

impl<'a> InventoryCollector<'a> {
    pub fn new(client: &'a dyn SshClient) -> Self {
        InventoryCollector { client }
    }

    pub async fn collect(&self) -> Result<HardwareDetails, BareMetalError> {
        let ram_mebibytes = self.ram_mebibytes().await?;
        let nics = self.nics().await?;
        let storage = self.storage().await?;
        let cpu = self.cpu().await?;

        debug!(ram_mebibytes, nic_count = nics.len(), "collected hardware details");

        Ok(HardwareDetails {
            ram_mebibytes,
            nics,
            storage,
            cpu,
        })
    }

    async fn ram_mebibytes(&self) -> Result<u64, BareMetalError> {
        let stdout = handle_ssh_error(self.client.get_hardware_details_ram().await, "ram")?;
        let kibibytes: u64 =
            stdout
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| BareMetalError::Parse {
                    what: "ram".to_string(),
                    message: e.to_string(),
                })?;
        Ok(kibibytes / 1024)
    }

    async fn nics(&self) -> Result<Vec<Nic>, BareMetalError> {
        let stdout = handle_ssh_error(self.client.get_hardware_details_nics().await, "nics")?;

        let mut nics = Vec::new();
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            let wire: NicWire = serde_json::from_str(&valid_json_from_ssh_output(line))?;
            let speed_mbps =
                wire.speed_mbps
                    .parse()
                    .map_err(|e: std::num::ParseIntError| BareMetalError::Parse {
                        what: format!("nic {} speedMbps", wire.name),
                        message: e.to_string(),
                    })?;
            nics.push(Nic {
                name: wire.name,
                model: wire.model,
                mac: wire.mac,
                ip: wire.ip,
                speed_mbps,
            });
        }
        Ok(nics)
    }

    async fn storage(&self) -> Result<Vec<StorageDevice>, BareMetalError> {
        let stdout =
            handle_ssh_error(self.client.get_hardware_details_storage().await, "storage")?;

        let mut devices = Vec::new();
        for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
            let wire: StorageWire = serde_json::from_str(&valid_json_from_ssh_output(line))?;
            if wire.device_type != "disk" {
                continue;
            }

            let rota = match wire.rota.as_str() {
                "0" => false,
                "1" => true,
                other => return Err(BareMetalError::UnknownRota(other.to_string())),
            };
            let size_bytes: u64 =
                wire.size
                    .parse()
                    .map_err(|e: std::num::ParseIntError| BareMetalError::Parse {
                        what: format!("storage {} size", wire.name),
                        message: e.to_string(),
                    })?;

            devices.push(StorageDevice {
                name: wire.name,
                hctl: wire.hctl,
                model: wire.model,
                vendor: wire.vendor,
                serial_number: wire.serial,
                size_bytes,
                wwn: wire.wwn,
                rota,
            });
        }
        Ok(devices)
    }

    async fn cpu(&self) -> Result<Cpu, BareMetalError> {
        let arch = self
            .nonempty(
                self.client.get_hardware_details_cpu_arch().await,
                "cpu arch",
            )
            .await?;
        let model = self
            .nonempty(
                self.client.get_hardware_details_cpu_model().await,
                "cpu model",
            )
            .await?;
        let clock = self
            .nonempty(
                self.client.get_hardware_details_cpu_clock_gigahertz().await,
                "cpu clock",
            )
            .await?;
        let threads_raw = self
            .nonempty(
                self.client.get_hardware_details_cpu_threads().await,
                "cpu threads",
            )
            .await?;
        let flags_raw = self
            .nonempty(
                self.client.get_hardware_details_cpu_flags().await,
                "cpu flags",
            )
            .await?;

        let threads: u32 =
            threads_raw
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| BareMetalError::Parse {
                    what: "cpu threads".to_string(),
                    message: e.to_string(),
                })?;

        Ok(Cpu {
            arch: arch.trim().to_string(),
            model: model.trim().to_string(),
            clock_gigahertz: clock.trim().to_string(),
            threads,
            flags: flags_raw.split_whitespace().map(str::to_string).collect(),
        })
    }

    async fn nonempty(&self, output: SshOutput, what: &str) -> Result<String, BareMetalError> {
        let stdout = handle_ssh_error(output, what)?;
        if stdout.trim().is_empty() {
            return Err(BareMetalError::SshCommand(format!("{what}: empty output")));
        }
        Ok(stdout)
    }
}
