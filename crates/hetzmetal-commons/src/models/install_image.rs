use serde::{
    Deserialize,
    Serialize,
};

/// Description of the operating system image and disk layout the installer
/// writes onto a claimed host.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstallImage {
    pub image: Image,
    #[serde(default)]
    pub partitions: Vec<Partition>,
    #[serde(default)]
    pub logical_volume_definitions: Vec<LogicalVolume>,
    #[serde(default)]
    pub btrfs_definitions: Vec<BtrfsSubvolume>,
    #[serde(default)]
    pub swraid: i32,
    #[serde(default)]
    pub swraid_level: i32,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_install_script: Option<String>,
}

/// The image source is either a (name, url) pair downloaded into the rescue
/// system, or a path already present there.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Image {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub path: String,
}

impl Image {
    /// Archive suffix of the image URL, if it is one the installer accepts.
    pub fn url_suffix(&self) -> Option<&'static str> {
        if self.url.ends_with(".tar.gz") {
            Some("tar.gz")
        } else if self.url.ends_with(".tgz") {
            Some("tgz")
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Partition {
    pub mount: String,
    pub file_system: String,
    pub size: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LogicalVolume {
    pub vg: String,
    pub name: String,
    pub mount: String,
    pub file_system: String,
    pub size: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BtrfsSubvolume {
    pub volume: String,
    pub subvolume: String,
    pub mount: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_suffix() {
        let mut image = Image {
            url: "https://images.example.com/ubuntu-24.04.tar.gz".to_string(),
            ..Default::default()
        };
        assert_eq!(image.url_suffix(), Some("tar.gz"));

        image.url = "https://images.example.com/ubuntu-24.04.tgz".to_string();
        assert_eq!(image.url_suffix(), Some("tgz"));

        image.url = "https://images.example.com/ubuntu-24.04.qcow2".to_string();
        assert_eq!(image.url_suffix(), None);
    }
}
