//! Promotion of discovered devices into the monitored set

use lanmon_core::store::{DeviceStore, NewMonitoredDevice, StoreError};
use lanmon_core::vendor::UNKNOWN_VENDOR;
use lanmon_routeros::{API_PORT, DEFAULT_USERNAME};
use tracing::{debug, info};

use crate::passive::PassiveDiscovery;

impl PassiveDiscovery {
    /// Promote an inventory entry to a monitored device record, tagged with
    /// `site_id`. The record is created disabled, with placeholder
    /// credentials for the operator to fill in. Promoting a MAC that is
    /// already monitored returns the existing record's id; promoting a MAC
    /// not in the inventory returns `Ok(None)`.
    pub async fn promote(
        &self,
        store: &dyn DeviceStore,
        mac: &str,
        site_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let Some(device) = self.get(mac).await else {
            return Ok(None);
        };

        for existing in store.list().await? {
            let matched = existing
                .mac_address
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(&device.mac));
            if matched {
                debug!(mac = %device.mac, id = %existing.id, "Device already monitored");
                return Ok(Some(existing.id));
            }
        }

        let tail = &device.mac[device.mac.len() - 6..];
        let name = if !device.hostname.is_empty() {
            device.hostname.clone()
        } else if device.vendor != UNKNOWN_VENDOR {
            format!("{} - {}", device.vendor, tail)
        } else {
            format!("Device {}", tail)
        };

        let record = NewMonitoredDevice {
            name: name.clone(),
            host: device.ip.to_string(),
            mac_address: Some(device.mac.clone()),
            site_id: Some(site_id.to_string()),
            port: API_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: String::new(),
            enabled: false,
            use_ssl: false,
            vendor: Some(device.vendor.clone()),
            device_class: Some(device.device_class),
            comment: Some(format!(
                "Auto-discovered from {} at {}",
                device.source,
                device.first_seen.format("%Y-%m-%d %H:%M:%S")
            )),
        };

        let id = store.create(record).await?;
        info!(mac = %device.mac, name = %name, id = %id, "Promoted discovered device");
        Ok(Some(id))
    }
}
