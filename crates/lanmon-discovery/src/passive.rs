//! Passive inventory built from router ARP and DHCP feeds
//!
//! Devices are keyed by normalized MAC. Each cycle merges both feeds into
//! the inventory, then evicts entries that have been silent for a day and
//! were absent from the cycle's feeds. A background worker repeats the
//! cycle on a fixed interval.

use anyhow::Result;
use chrono::{DateTime, Utc};
use lanmon_core::device::{normalize_mac, DiscoveredDevice, FeedSource};
use lanmon_core::vendor::classify;
use lanmon_core::DeviceClass;
use lanmon_routeros::{ArpEntry, DhcpLease};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::resolver::VendorResolver;

/// How often the background worker merges the feeds
pub const SCAN_INTERVAL: Duration = Duration::from_secs(20);

/// Source of ARP and DHCP observations, normally a router API session
#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    async fn arp_entries(&self) -> Result<Vec<ArpEntry>>;
    async fn dhcp_leases(&self) -> Result<Vec<DhcpLease>>;
}

/// One observation from either feed, before merging
struct Observation {
    mac: String,
    ip: IpAddr,
    hostname: Option<String>,
    vendor: Option<String>,
    device_class: Option<DeviceClass>,
    source: FeedSource,
    source_device_id: String,
}

impl Observation {
    fn from_arp(entry: ArpEntry) -> Self {
        Self {
            mac: entry.mac,
            ip: entry.ip,
            hostname: None,
            vendor: entry.vendor,
            device_class: entry.device_class,
            source: FeedSource::Arp,
            source_device_id: entry.device_id,
        }
    }

    fn from_lease(lease: DhcpLease) -> Self {
        Self {
            mac: lease.mac,
            ip: lease.ip,
            hostname: lease.hostname,
            vendor: lease.vendor,
            device_class: lease.device_class,
            source: FeedSource::Dhcp,
            source_device_id: lease.device_id,
        }
    }
}

/// Continuously merged view of everything the router has seen on the LAN
pub struct PassiveDiscovery {
    feed: Arc<dyn FeedProvider>,
    resolver: Arc<VendorResolver>,
    inventory: Arc<RwLock<HashMap<String, DiscoveredDevice>>>,
    interval: Duration,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop_notify: Notify,
}

impl PassiveDiscovery {
    pub fn new(feed: Arc<dyn FeedProvider>, resolver: Arc<VendorResolver>) -> Self {
        Self::with_interval(feed, resolver, SCAN_INTERVAL)
    }

    pub fn with_interval(
        feed: Arc<dyn FeedProvider>,
        resolver: Arc<VendorResolver>,
        interval: Duration,
    ) -> Self {
        Self {
            feed,
            resolver,
            inventory: Arc::new(RwLock::new(HashMap::new())),
            interval,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            stop_notify: Notify::new(),
        }
    }

    /// Fetch both feeds and merge them into the inventory, then evict stale
    /// absentees. Returns the devices created this cycle.
    pub async fn run_cycle(&self) -> Result<Vec<DiscoveredDevice>> {
        self.run_cycle_at(Utc::now()).await
    }

    async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<Vec<DiscoveredDevice>> {
        let arp = self.feed.arp_entries().await?;
        let leases = self.feed.dhcp_leases().await?;

        let mut inventory = self.inventory.write().await;
        let mut seen = HashSet::new();
        let mut created = Vec::new();

        for observation in arp
            .into_iter()
            .map(Observation::from_arp)
            .chain(leases.into_iter().map(Observation::from_lease))
        {
            self.observe(&mut inventory, &mut seen, &mut created, observation, now)
                .await;
        }

        let before = inventory.len();
        inventory.retain(|mac, device| !device.is_stale(now) || seen.contains(mac));
        let evicted = before - inventory.len();
        if evicted > 0 {
            info!(evicted, "Evicted stale devices");
        }

        Ok(created)
    }

    async fn observe(
        &self,
        inventory: &mut HashMap<String, DiscoveredDevice>,
        seen: &mut HashSet<String>,
        created: &mut Vec<DiscoveredDevice>,
        observation: Observation,
        now: DateTime<Utc>,
    ) {
        let Some(mac) = normalize_mac(&observation.mac) else {
            if !observation.mac.is_empty() {
                debug!(mac = %observation.mac, "Skipping entry with unusable MAC");
            }
            return;
        };
        seen.insert(mac.clone());

        if let Some(device) = inventory.get_mut(&mac) {
            device.observe(observation.ip, now);
            // DHCP is the only feed that knows hostnames, and a hostname
            // already learned is never overwritten.
            if device.hostname.is_empty() {
                if let Some(hostname) = observation.hostname {
                    device.hostname = hostname;
                }
            }
            return;
        }

        let (vendor, device_class) = match observation.vendor {
            Some(vendor) => {
                let class = observation
                    .device_class
                    .unwrap_or_else(|| classify(&vendor));
                (vendor, class)
            }
            // Vendor resolution runs once, when the device is first seen.
            None => self.resolver.lookup_classified(&mac).await,
        };

        let hostname = match observation.source {
            FeedSource::Dhcp => observation.hostname.unwrap_or_default(),
            FeedSource::Arp => String::new(),
        };

        let device = DiscoveredDevice::new(
            mac.clone(),
            observation.ip,
            hostname,
            vendor,
            device_class,
            observation.source,
            observation.source_device_id,
            now,
        );
        info!(mac = %mac, ip = %observation.ip, vendor = %device.vendor, "Discovered new device");
        created.push(device.clone());
        inventory.insert(mac, device);
    }

    /// Snapshot of the inventory, newest first. With `only_new` set, only
    /// devices still inside the new-device window are returned.
    pub async fn list(&self, only_new: bool) -> Vec<DiscoveredDevice> {
        let inventory = self.inventory.read().await;
        let mut devices: Vec<_> = inventory
            .values()
            .filter(|d| !only_new || d.is_new)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.first_seen.cmp(&a.first_seen));
        devices
    }

    pub async fn get(&self, mac: &str) -> Option<DiscoveredDevice> {
        let mac = normalize_mac(mac)?;
        self.inventory.read().await.get(&mac).cloned()
    }

    /// Start the background worker. Calling this while already running is a
    /// no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Passive discovery already running");
            return;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!(interval_secs = this.interval.as_secs(), "Passive discovery started");
            while this.running.load(Ordering::SeqCst) {
                if let Err(e) = this.run_cycle().await {
                    error!(error = %e, "Discovery cycle failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(this.interval) => {}
                    _ = this.stop_notify.notified() => {}
                }
            }
            info!("Passive discovery stopped");
        });
        *self.worker.lock().await = Some(handle);
    }

    /// Stop the background worker. The cycle in progress, if any, finishes
    /// before the worker exits.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Discovery worker did not shut down cleanly");
            }
        }
    }
}
