//! Host identity: primary interface MAC and local IP.

use auth_session::HostInfoProvider;
use std::net::UdpSocket;

pub struct SystemHostInfo;

impl HostInfoProvider for SystemHostInfo {
    fn primary_mac(&self) -> String {
        primary_mac().unwrap_or_default()
    }

    fn local_ip(&self) -> String {
        local_ip().unwrap_or_default()
    }
}

/// MAC of the first operationally-up non-loopback interface.
#[cfg(target_os = "linux")]
fn primary_mac() -> Option<String> {
    let entries = std::fs::read_dir("/sys/class/net").ok()?;
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "lo" {
            continue;
        }
        let operstate = std::fs::read_to_string(entry.path().join("operstate")).ok()?;
        if operstate.trim() != "up" {
            continue;
        }
        let address = std::fs::read_to_string(entry.path().join("address")).ok()?;
        let address = address.trim().to_uppercase();
        if !address.is_empty() && address != "00:00:00:00:00:00" {
            tracing::debug!(interface = %name, "primary interface selected");
            return Some(address);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn primary_mac() -> Option<String> {
    None
}

/// Local IPv4, discovered by the routing table via a connected (never
/// actually used) UDP socket.
fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:9").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}
