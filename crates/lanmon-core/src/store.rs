//! Contract for the external monitored-device store
//!
//! The discovery engine never persists monitored devices itself; it lists
//! and creates records through whatever backend implements [`DeviceStore`].

use crate::device::{DeviceClass, ProbeCandidate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A device in the permanently monitored set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredDevice {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub enabled: bool,
    pub use_ssl: bool,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub device_class: Option<DeviceClass>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// A record to be created; the store assigns the identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMonitoredDevice {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub enabled: bool,
    pub use_ssl: bool,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub device_class: Option<DeviceClass>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NewMonitoredDevice {
    /// Build a store record from an actively scanned candidate. The
    /// credentials already authenticated, so the record stays enabled.
    pub fn from_candidate(candidate: &ProbeCandidate) -> Self {
        Self {
            name: candidate.name.clone(),
            host: candidate.host.to_string(),
            mac_address: None,
            site_id: candidate.site_id.clone(),
            port: candidate.port,
            username: candidate.username.clone(),
            password: candidate.password.clone(),
            enabled: candidate.enabled,
            use_ssl: candidate.use_ssl,
            vendor: None,
            device_class: None,
            comment: None,
        }
    }

    /// Attach the identifier a store assigned to this record.
    pub fn into_monitored(self, id: String) -> MonitoredDevice {
        MonitoredDevice {
            id,
            name: self.name,
            host: self.host,
            mac_address: self.mac_address,
            site_id: self.site_id,
            port: self.port,
            username: self.username,
            password: self.password,
            enabled: self.enabled,
            use_ssl: self.use_ssl,
            vendor: self.vendor,
            device_class: self.device_class,
            comment: self.comment,
        }
    }
}

/// External store of permanently monitored devices
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn list(&self) -> Result<Vec<MonitoredDevice>, StoreError>;

    /// Persist a new record and return its assigned identifier.
    async fn create(&self, record: NewMonitoredDevice) -> Result<String, StoreError>;
}
