//! Device types for the discovery inventory

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Seconds a device stays flagged as newly discovered.
pub const NEW_DEVICE_WINDOW_SECS: i64 = 300;

/// Seconds without a sighting before a device absent from the feeds is evicted.
pub const STALE_AFTER_SECS: i64 = 24 * 60 * 60;

/// Normalize a MAC address to its canonical inventory key: uppercase hex,
/// separators stripped, exactly twelve characters. Anything shorter or longer
/// is rejected.
pub fn normalize_mac(mac: &str) -> Option<String> {
    let normalized: String = mac
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (normalized.len() == 12).then_some(normalized)
}

/// Which feed a passive observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    Arp,
    Dhcp,
}

impl std::fmt::Display for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedSource::Arp => write!(f, "arp"),
            FeedSource::Dhcp => write!(f, "dhcp"),
        }
    }
}

/// Rough device category derived from the vendor name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    Phone,
    Computer,
    NetworkEquipment,
    SmartTv,
    SmartHome,
    Other,
}

impl Default for DeviceClass {
    fn default() -> Self {
        Self::Other
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceClass::Phone => "Phone",
            DeviceClass::Computer => "Computer",
            DeviceClass::NetworkEquipment => "Network equipment",
            DeviceClass::SmartTv => "Smart TV",
            DeviceClass::SmartHome => "Smart home",
            DeviceClass::Other => "Other",
        };
        write!(f, "{}", name)
    }
}

/// A passively discovered device tracked in the live inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Normalized MAC address, the inventory key
    pub mac: String,
    /// Most recently observed IP address
    pub ip: IpAddr,
    /// Hostname learned from a DHCP lease; empty until one supplies it
    pub hostname: String,
    /// Vendor name resolved from the OUI
    pub vendor: String,
    /// Category derived from the vendor
    pub device_class: DeviceClass,
    /// Set once at creation, never mutated afterwards
    pub first_seen: DateTime<Utc>,
    /// Advances on every observation
    pub last_seen: DateTime<Utc>,
    /// Feed that first reported the device
    pub source: FeedSource,
    /// Identifier of the monitored device whose table reported it
    pub source_device_id: String,
    /// Whether the device is still inside the new-device window
    pub is_new: bool,
}

impl DiscoveredDevice {
    /// Create an inventory record for a first observation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mac: String,
        ip: IpAddr,
        hostname: String,
        vendor: String,
        device_class: DeviceClass,
        source: FeedSource,
        source_device_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            mac,
            ip,
            hostname,
            vendor,
            device_class,
            first_seen: now,
            last_seen: now,
            source,
            source_device_id,
            is_new: true,
        }
    }

    /// Record another sighting: advance `last_seen`, take the current IP, and
    /// recompute the new-device flag against `first_seen`.
    pub fn observe(&mut self, ip: IpAddr, now: DateTime<Utc>) {
        self.last_seen = now;
        self.ip = ip;
        self.is_new = now - self.first_seen < Duration::seconds(NEW_DEVICE_WINDOW_SECS);
    }

    /// Whether the device has gone unseen long enough to be evicted.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_seen > Duration::seconds(STALE_AFTER_SECS)
    }
}

/// A device candidate produced by the active scanner. Ownership transfers to
/// the caller once returned; the scanner never mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeCandidate {
    /// Freshly generated identifier
    pub id: String,
    /// Identity name reported by the device
    pub name: String,
    /// Address the candidate answered on
    pub host: IpAddr,
    /// API port the candidate answered on
    pub port: u16,
    /// Credentials that authenticated successfully
    pub username: String,
    pub password: String,
    /// Board/platform name from the resource query
    pub board_name: String,
    /// Firmware version from the resource query
    pub version: String,
    /// Best-effort reverse DNS name, when resolution was requested
    #[serde(default)]
    pub hostname: Option<String>,
    pub enabled: bool,
    pub use_ssl: bool,
    /// Site the candidate was assigned to during the merge step
    #[serde(default)]
    pub site_id: Option<String>,
}
