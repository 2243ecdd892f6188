//! Linux removable-volume enumeration via /dev/disk/by-id and /proc/mounts.

use std::path::{Path, PathBuf};

use token_locator::{RemovableVolumeProvider, VolumeInfo};
use tracing::debug;

const BY_ID_DIR: &str = "/dev/disk/by-id";
const PROC_MOUNTS: &str = "/proc/mounts";

/// Enumerates USB disks through their stable by-id names.
///
/// Entry names look like `usb-Vendor_Model_SERIAL-0:0`; partition entries
/// carry a `-partN` suffix and are skipped (mounts are matched against the
/// whole disk's device prefix instead).
pub struct ByIdVolumeProvider;

impl RemovableVolumeProvider for ByIdVolumeProvider {
    fn volumes(&self) -> Vec<VolumeInfo> {
        enumerate(Path::new(BY_ID_DIR), Path::new(PROC_MOUNTS))
    }
}

fn enumerate(by_id_dir: &Path, mounts_file: &Path) -> Vec<VolumeInfo> {
    let mounts = read_mounts(mounts_file);
    let Ok(entries) = std::fs::read_dir(by_id_dir) else {
        return Vec::new();
    };

    let mut volumes = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(serial) = parse_usb_serial(&name) else {
            continue;
        };
        let Ok(device) = std::fs::canonicalize(entry.path()) else {
            continue;
        };
        let device_prefix = device.to_string_lossy().into_owned();

        // Mount points of the disk itself or any of its partitions.
        let mount_roots: Vec<PathBuf> = mounts
            .iter()
            .filter(|(dev, _)| dev.starts_with(&device_prefix))
            .map(|(_, mountpoint)| mountpoint.clone())
            .collect();
        if mount_roots.is_empty() {
            continue;
        }

        debug!(serial = %serial, roots = mount_roots.len(), "usb disk found");
        volumes.push(VolumeInfo {
            serial,
            mount_roots,
        });
    }
    volumes
}

/// `usb-Vendor_Model_SERIAL-0:0` → `SERIAL`. Partition links are skipped.
fn parse_usb_serial(name: &str) -> Option<String> {
    let rest = name.strip_prefix("usb-")?;
    if rest.contains("-part") {
        return None;
    }
    let without_lun = rest.rsplit_once("-").map(|(head, _)| head).unwrap_or(rest);
    let serial = without_lun.rsplit('_').next()?;
    if serial.is_empty() {
        return None;
    }
    Some(serial.to_string())
}

/// Device → mountpoint pairs, octal-escape decoded for the mountpoint.
fn read_mounts(mounts_file: &Path) -> Vec<(String, PathBuf)> {
    let Ok(content) = std::fs::read_to_string(mounts_file) else {
        return Vec::new();
    };
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mountpoint = fields.next()?;
            if !device.starts_with("/dev/") {
                return None;
            }
            Some((device.to_string(), PathBuf::from(unescape_mount(mountpoint))))
        })
        .collect()
}

/// /proc/mounts escapes spaces and such as `\040` octal sequences.
fn unescape_mount(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.by_ref().take(3).collect();
        match u8::from_str_radix(&digits, 8) {
            Ok(byte) => out.push(byte as char),
            Err(_) => {
                out.push('\\');
                out.push_str(&digits);
            }
        }
    }
    out
}
