use hetzmetal_commons::models::install_image::InstallImage;

/// Renders the declarative installer input consumed in the rescue system.
///
/// The blank lines between blocks are significant to the installer and must
/// be preserved.
pub fn render_autosetup(hostname: &str, install_image: &InstallImage, os_devices: &[String],
    image_path: &str) -> String {
    let mut out = String::new();

    for (index, device) in os_devices.iter().enumerate() {
        out.push_str(&format!("DRIVE{} /dev/{}\n", index + 1, device));
    }
    out.push('\n');

    out.push_str(&format!("HOSTNAME {hostname}\n"));
    out.push_str(&format!("SWRAID {}\n", install_image.swraid));
    if install_image.swraid == 1 {
        out.push_str(&format!("SWRAIDLEVEL {}\n", install_image.swraid_level));
    }
    out.push('\n');

    for partition in &install_image.partitions {
        out.push_str(&format!(
            "PART {} {} {}\n",
            partition.mount, partition.file_system, partition.size
        ));
    }
    out.push('\n');

    if !install_image.logical_volume_definitions.is_empty() {
        for lv in &install_image.logical_volume_definitions {
            out.push_str(&format!(
                "LV {} {} {} {} {}\n",
                lv.vg, lv.name, lv.mount, lv.file_system, lv.size
            ));
        }
        out.push('\n');
    }

    if !install_image.btrfs_definitions.is_empty() {
        for subvolume in &install_image.btrfs_definitions {
            out.push_str(&format!(
                "SUBVOL {} {} {}\n",
                subvolume.volume, subvolume.subvolume, subvolume.mount
            ));
        }
        out.push('\n');
    }

    out.push_str(&format!("IMAGE {image_path}\n"));
    out
}

#[cfg(test)]
mod tests {
    use hetzmetal_commons::models::install_image::{
        BtrfsSubvolume,
        Image,
        LogicalVolume,
        Partition,
    };

    use super::*;

    fn install_image() -> InstallImage {
        InstallImage {
            image: Image {
                name: "ubuntu-24.04".to_string(),
                url: "https://images.example.com/ubuntu-24.04.tar.gz".to_string(),
                path: String::new(),
            },
            partitions: vec![
                Partition {
                    mount: "/boot".to_string(),
                    file_system: "ext3".to_string(),
                    size: "512M".to_string(),
                },
                Partition {
                    mount: "/".to_string(),
                    file_system: "ext4".to_string(),
                    size: "all".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_render_minimal() {
        let autosetup = render_autosetup(
            "bm-worker-3",
            &install_image(),
            &["nvme0n1".to_string()],
            "/root/ubuntu-24.04.tar.gz",
        );

        assert_eq!(
            autosetup,
            "DRIVE1 /dev/nvme0n1\n\
             \n\
             HOSTNAME bm-worker-3\n\
             SWRAID 0\n\
             \n\
             PART /boot ext3 512M\n\
             PART / ext4 all\n\
             \n\
             IMAGE /root/ubuntu-24.04.tar.gz\n"
        );
    }

    #[test]
    fn test_render_with_raid_lvm_and_btrfs() {
        let mut image = install_image();
        image.swraid = 1;
        image.swraid_level = 1;
        image.logical_volume_definitions = vec![LogicalVolume {
            vg: "vg0".to_string(),
            name: "root".to_string(),
            mount: "/".to_string(),
            file_system: "ext4".to_string(),
            size: "10G".to_string(),
        }];
        image.btrfs_definitions = vec![BtrfsSubvolume {
            volume: "@".to_string(),
            subvolume: "@home".to_string(),
            mount: "/home".to_string(),
        }];

        let autosetup = render_autosetup(
            "bm-worker-3",
            &image,
            &["sda".to_string(), "sdb".to_string()],
            "/root/ubuntu-24.04.tar.gz",
        );

        assert!(autosetup.starts_with("DRIVE1 /dev/sda\nDRIVE2 /dev/sdb\n\n"));
        assert!(autosetup.contains("SWRAID 1\nSWRAIDLEVEL 1\n\n"));
        assert!(autosetup.contains("LV vg0 root / ext4 10G\n\n"));
        assert!(autosetup.contains("SUBVOL @ @home /home\n\n"));
        assert!(autosetup.ends_with("IMAGE /root/ubuntu-24.04.tar.gz\n"));
    }
}
