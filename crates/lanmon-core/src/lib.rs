//! lanmon Core - inventory types, vendor cache, and store contract
//!
//! This crate provides the foundational types for the lanmon system:
//! - Discovered-device inventory records and their aging rules
//! - The persisted MAC vendor cache with TTL and legacy-format migration
//! - The contract for the external monitored-device store

pub mod device;
pub mod store;
pub mod vendor;

pub use device::{
    normalize_mac, DeviceClass, DiscoveredDevice, FeedSource, ProbeCandidate,
    NEW_DEVICE_WINDOW_SECS, STALE_AFTER_SECS,
};
pub use store::{DeviceStore, MonitoredDevice, NewMonitoredDevice, StoreError};
pub use vendor::{classify, normalize_oui, VendorCache, VendorCacheError, UNKNOWN_VENDOR};
