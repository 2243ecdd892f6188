//! Windows adapters: WMI-backed USB enumeration and BitLocker unlock via
//! manage-bde.

use std::path::{Path, PathBuf};
use std::process::Command;

use token_locator::{RemovableVolumeProvider, VolumeInfo, VolumeUnlockProvider};
use tracing::{debug, warn};

/// PowerShell pipeline walking DiskDrive → Partition → LogicalDisk for USB
/// disks, emitting one `serial<TAB>root` line per logical disk.
const ENUM_SCRIPT: &str = r#"
foreach ($d in Get-CimInstance Win32_DiskDrive -Filter "InterfaceType='USB'") {
  $serial = ($d.SerialNumber | Out-String).Trim()
  if (-not $serial) { continue }
  $parts = Get-CimInstance -Query "ASSOCIATORS OF {Win32_DiskDrive.DeviceID='$($d.DeviceID)'} WHERE AssocClass=Win32_DiskDriveToDiskPartition"
  foreach ($p in $parts) {
    $disks = Get-CimInstance -Query "ASSOCIATORS OF {Win32_DiskPartition.DeviceID='$($p.DeviceID)'} WHERE AssocClass=Win32_LogicalDiskToPartition"
    foreach ($l in $disks) { Write-Output "$serial`t$($l.DeviceID)\" }
  }
}
"#;

pub struct WmiVolumeProvider;

impl RemovableVolumeProvider for WmiVolumeProvider {
    fn volumes(&self) -> Vec<VolumeInfo> {
        let output = match Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", ENUM_SCRIPT])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "usb enumeration failed");
                return Vec::new();
            }
        };
        parse_enum_output(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_enum_output(stdout: &str) -> Vec<VolumeInfo> {
    let mut volumes: Vec<VolumeInfo> = Vec::new();
    for line in stdout.lines() {
        let Some((serial, root)) = line.trim().split_once('\t') else {
            continue;
        };
        if serial.is_empty() || root.is_empty() {
            continue;
        }
        let root = PathBuf::from(root);
        match volumes.iter_mut().find(|v| v.serial == serial) {
            Some(volume) => volume.mount_roots.push(root),
            None => volumes.push(VolumeInfo {
                serial: serial.to_string(),
                mount_roots: vec![root],
            }),
        }
    }
    volumes
}

/// BitLocker unlock through `manage-bde.exe`.
pub struct ManageBdeUnlock;

/// `F:\` or `F:` → `F:` as manage-bde expects.
fn drive_letter(mount_root: &Path) -> String {
    let raw = mount_root.to_string_lossy();
    let trimmed = raw.trim_end_matches('\\').trim_end_matches(':');
    format!("{trimmed}:")
}

impl VolumeUnlockProvider for ManageBdeUnlock {
    fn is_locked(&self, mount_root: &Path) -> bool {
        let letter = drive_letter(mount_root);
        let output = match Command::new("manage-bde.exe")
            .args(["-status", &letter])
            .output()
        {
            Ok(output) => output,
            // Cannot determine: assume unlocked rather than blocking login.
            Err(_) => return false,
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .any(|line| line.contains("Lock Status") && line.contains("Locked")
                && !line.contains("Unlocked"))
    }

    fn unlock(&self, mount_root: &Path, passphrase: &str) -> bool {
        let letter = drive_letter(mount_root);
        let output = match Command::new("manage-bde.exe")
            .args(["-unlock", &letter, "-RecoveryPassword", passphrase])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "manage-bde could not be started");
                return false;
            }
        };

        if output.status.success() {
            return true;
        }
        // Already-unlocked volumes report failure with a telltale message.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let already = stdout.to_lowercase().contains("already unlocked")
            || stderr.to_lowercase().contains("already unlocked");
        if already {
            debug!(drive = %letter, "volume was already unlocked");
            return true;
        }
        warn!(drive = %letter, "BitLocker unlock failed");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_output_groups_roots_by_serial() {
        let parsed = parse_enum_output("ABC123\tF:\\\nABC123\tG:\\\nXYZ789\tH:\\\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].serial, "ABC123");
        assert_eq!(parsed[0].mount_roots.len(), 2);
        assert_eq!(parsed[1].serial, "XYZ789");
    }

    #[test]
    fn enum_output_skips_malformed_lines()  {
        let parsed = parse_enum_output("no-tab-here\n\t\nSER\t\n");
        assert!(parsed.is_empty());
    }

    #[test]
    fn drive_letter_normalization() {
        assert_eq!(drive_letter(Path::new("F:\\")), "F:");
        assert_eq!(drive_letter(Path::new("F:")), "F:");
    }
}
