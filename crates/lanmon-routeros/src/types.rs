//! Wire-facing types reported by the RouterOS API client

use lanmon_core::DeviceClass;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Plain API port
pub const API_PORT: u16 = 8728;

/// TLS API port
pub const API_SSL_PORT: u16 = 8729;

/// Factory-default administrative user
pub const DEFAULT_USERNAME: &str = "admin";

/// Login credentials for the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Credentials {
    /// Factory defaults: `admin` with an empty password.
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
        }
    }
}

/// `/system/identity` reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterIdentity {
    pub name: String,
}

/// `/system/resource` reply, reduced to the fields discovery consumes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterResources {
    pub board_name: String,
    pub version: String,
}

/// One `/ip/arp` table row from a monitored device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArpEntry {
    pub mac: String,
    pub ip: IpAddr,
    /// Monitored device that reported the entry
    pub device_id: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub device_class: Option<DeviceClass>,
}

/// One `/ip/dhcp-server/lease` row from a monitored device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpLease {
    pub mac: String,
    pub ip: IpAddr,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Monitored device that reported the lease
    pub device_id: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub device_class: Option<DeviceClass>,
}
