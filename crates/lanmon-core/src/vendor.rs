//! MAC vendor cache with TTL and JSON file persistence
//!
//! The cache maps a six-character OUI to a vendor name and the unix timestamp
//! of the last refresh. The backing file is a single JSON object; legacy
//! files that stored bare vendor strings are upgraded in memory on load.

use crate::device::DeviceClass;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Entries older than 30 days are treated as absent and refreshed online.
pub const CACHE_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Sentinel for a vendor that could not be resolved; never cached.
pub const UNKNOWN_VENDOR: &str = "Unknown";

/// Normalize a MAC address down to its OUI lookup key: uppercase, all
/// separators stripped, first six characters. Returns `None` when fewer than
/// six characters remain.
pub fn normalize_oui(mac: &str) -> Option<String> {
    let normalized: String = mac
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if normalized.len() < 6 {
        return None;
    }
    Some(normalized[..6].to_string())
}

const PHONE_VENDORS: &[&str] = &[
    "apple", "samsung", "xiaomi", "oppo", "vivo", "huawei", "oneplus",
];
const COMPUTER_VENDORS: &[&str] = &[
    "dell", "hp", "lenovo", "asus", "acer", "intel", "microsoft",
];
const NETWORK_VENDORS: &[&str] = &[
    "cisco", "juniper", "aruba", "mikrotik", "ubiquiti", "tplink", "tp-link", "d-link", "netgear",
];
const SMART_TV_VENDORS: &[&str] = &[
    "sony", "samsung", "lg", "hisense", "tcl", "panasonic", "sharp", "philips",
];
const SMART_HOME_VENDORS: &[&str] = &[
    "nest", "ring", "ecobee", "sonos", "honeywell", "broadlink", "tuya",
];

/// Estimate the device category from a vendor name. Case-insensitive
/// substring match; the first matching category in declaration order wins.
pub fn classify(vendor: &str) -> DeviceClass {
    let lower = vendor.to_lowercase();
    let matches = |names: &[&str]| names.iter().any(|name| lower.contains(name));

    if matches(PHONE_VENDORS) {
        DeviceClass::Phone
    } else if matches(COMPUTER_VENDORS) {
        DeviceClass::Computer
    } else if matches(NETWORK_VENDORS) {
        DeviceClass::NetworkEquipment
    } else if matches(SMART_TV_VENDORS) {
        DeviceClass::SmartTv
    } else if matches(SMART_HOME_VENDORS) {
        DeviceClass::SmartHome
    } else {
        DeviceClass::Other
    }
}

#[derive(Error, Debug)]
pub enum VendorCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A cached vendor name with its refresh timestamp (unix seconds)
#[derive(Debug, Clone)]
pub struct VendorEntry {
    pub vendor: String,
    pub fetched_at: i64,
}

/// On-disk value: either `[vendor, timestamp]` or a legacy bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Stamped(String, f64),
    Legacy(String),
}

/// The persisted OUI-to-vendor map
#[derive(Debug)]
pub struct VendorCache {
    path: PathBuf,
    entries: HashMap<String, VendorEntry>,
}

impl VendorCache {
    /// Load the cache from `path`, or start empty when the file is missing or
    /// unreadable. A broken cache file degrades the cache, it never blocks
    /// vendor resolution.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read vendor cache, starting empty");
                HashMap::new()
            }
        };
        Self { path, entries }
    }

    fn read_entries(path: &Path) -> Result<HashMap<String, VendorEntry>, VendorCacheError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(path)?;
        let raw: HashMap<String, StoredEntry> = serde_json::from_str(&content)?;
        let now = chrono::Utc::now().timestamp();
        Ok(raw
            .into_iter()
            .map(|(oui, stored)| {
                let entry = match stored {
                    StoredEntry::Stamped(vendor, ts) => VendorEntry {
                        vendor,
                        fetched_at: ts as i64,
                    },
                    // Legacy entries predate timestamps; treat as freshly fetched.
                    StoredEntry::Legacy(vendor) => VendorEntry {
                        vendor,
                        fetched_at: now,
                    },
                };
                (oui, entry)
            })
            .collect())
    }

    /// Look up a vendor by OUI. Entries older than the TTL are treated as
    /// absent, forcing a refresh rather than serving a stale name.
    pub fn get(&self, oui: &str, now: i64) -> Option<&str> {
        self.entries
            .get(oui)
            .filter(|entry| now - entry.fetched_at < CACHE_TTL_SECS)
            .map(|entry| entry.vendor.as_str())
    }

    /// Insert a freshly resolved vendor and persist the whole map. A write
    /// failure is logged and the in-memory entry is kept.
    pub fn insert(&mut self, oui: String, vendor: String, now: i64) {
        self.entries.insert(oui, VendorEntry { vendor, fetched_at: now });
        if let Err(e) = self.save() {
            warn!(path = %self.path.display(), error = %e, "Failed to persist vendor cache");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Whole-map rewrite through a temporary file so a concurrent reader
    // never observes a partially written cache.
    fn save(&self) -> Result<(), VendorCacheError> {
        let raw: HashMap<&str, (&str, i64)> = self
            .entries
            .iter()
            .map(|(oui, entry)| (oui.as_str(), (entry.vendor.as_str(), entry.fetched_at)))
            .collect();
        let content = serde_json::to_string(&raw)?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
