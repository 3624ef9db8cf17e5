//! Active scanning of address ranges for RouterOS API endpoints
//!
//! Each host in a range is probed under a bounded worker pool: a plain TCP
//! connect first, then an authenticated API session, then identity and
//! resource queries. Hosts that refuse the connection or reject the login
//! simply yield no candidate; only a malformed range fails a scan.

use anyhow::Result;
use lanmon_core::device::ProbeCandidate;
use lanmon_core::store::{DeviceStore, NewMonitoredDevice};
use lanmon_routeros::{Credentials, RouterConnector};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default size of the probe worker pool
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Default per-host probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid network range {range:?}: {reason}")]
    InvalidRange { range: String, reason: String },
}

/// One address range to scan, with the credentials to try against it
#[derive(Debug, Clone)]
pub struct ScanTarget {
    /// CIDR notation, e.g. `192.168.88.0/24`
    pub range: String,
    pub credentials: Credentials,
    pub port: u16,
    pub timeout: Duration,
}

impl ScanTarget {
    pub fn new(range: &str, credentials: Credentials, port: u16) -> Self {
        Self {
            range: range.to_string(),
            credentials,
            port,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Expand a CIDR range into its usable host addresses, network and broadcast
/// excluded. Host bits below the prefix are masked off rather than rejected.
pub fn expand_range(range: &str) -> Result<Vec<Ipv4Addr>, ScanError> {
    let invalid = |reason: &str| ScanError::InvalidRange {
        range: range.to_string(),
        reason: reason.to_string(),
    };

    let (addr_part, prefix_part) = range
        .split_once('/')
        .ok_or_else(|| invalid("expected CIDR notation"))?;
    let addr: Ipv4Addr = addr_part
        .trim()
        .parse()
        .map_err(|_| invalid("not an IPv4 address"))?;
    let prefix_len: u8 = prefix_part
        .trim()
        .parse()
        .map_err(|_| invalid("bad prefix length"))?;
    if prefix_len > 32 {
        return Err(invalid("prefix length must be 0-32"));
    }

    let mask = (!((1u64 << (32 - prefix_len)) - 1)) as u32;
    let network = u32::from(addr) & mask;
    let broadcast = network | !mask;

    Ok((network.saturating_add(1)..broadcast)
        .map(Ipv4Addr::from)
        .collect())
}

/// Result of a discovery run merged against the monitored set
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub total_found: usize,
    pub new_devices: usize,
    pub existing_devices: usize,
    pub devices: Vec<ProbeCandidate>,
}

/// Concurrent scanner for RouterOS API endpoints
pub struct Scanner {
    connector: Arc<dyn RouterConnector>,
    concurrency: usize,
    resolve_hostnames: bool,
}

impl Scanner {
    pub fn new(connector: Arc<dyn RouterConnector>) -> Self {
        Self {
            connector,
            concurrency: DEFAULT_CONCURRENCY,
            resolve_hostnames: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Enable best-effort reverse DNS on found candidates.
    pub fn with_hostname_resolution(mut self, enabled: bool) -> Self {
        self.resolve_hostnames = enabled;
        self
    }

    /// Scan one range. Unreachable or unauthenticated hosts yield no
    /// candidate; a malformed range fails the invocation before any probe
    /// starts. Results are collected in completion order.
    pub async fn scan(&self, target: &ScanTarget) -> Result<Vec<ProbeCandidate>, ScanError> {
        let hosts = expand_range(&target.range)?;
        info!(range = %target.range, hosts = hosts.len(), "Starting discovery scan");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for host in hosts {
            let semaphore = Arc::clone(&semaphore);
            let connector = Arc::clone(&self.connector);
            let credentials = target.credentials.clone();
            let port = target.port;
            let timeout = target.timeout;
            let resolve_hostnames = self.resolve_hostnames;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                probe_host(connector, host, port, credentials, timeout, resolve_hostnames).await
            });
        }

        let mut found = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Some(candidate)) => {
                    info!(host = %candidate.host, name = %candidate.name, "Found RouterOS device");
                    found.push(candidate);
                }
                Ok(None) => {}
                // A panicked probe is dropped; its siblings keep running.
                Err(e) => warn!(error = %e, "Probe task failed"),
            }
        }

        info!(range = %target.range, found = found.len(), "Scan complete");
        Ok(found)
    }

    /// Scan several ranges sequentially, concatenating results. A range that
    /// fails to scan is logged and the remaining ranges still proceed.
    pub async fn scan_multiple(&self, targets: &[ScanTarget]) -> Vec<ProbeCandidate> {
        let mut all = Vec::new();
        for target in targets {
            match self.scan(target).await {
                Ok(candidates) => all.extend(candidates),
                Err(e) => warn!(range = %target.range, error = %e, "Skipping range"),
            }
        }
        all
    }

    /// Scan all targets and add previously unknown candidates to the
    /// monitored set, tagged with `site_id`. Candidates whose host is
    /// already monitored are counted but not re-added.
    pub async fn run_discovery(
        &self,
        targets: &[ScanTarget],
        store: &dyn DeviceStore,
        site_id: &str,
    ) -> Result<ScanSummary> {
        let candidates = self.scan_multiple(targets).await;
        let existing = store.list().await?;

        let mut new_devices = 0;
        let mut existing_devices = 0;
        let mut devices = Vec::with_capacity(candidates.len());

        for mut candidate in candidates {
            let host = candidate.host.to_string();
            if existing.iter().any(|d| d.host == host) {
                existing_devices += 1;
                devices.push(candidate);
                continue;
            }

            candidate.site_id = Some(site_id.to_string());
            store
                .create(NewMonitoredDevice::from_candidate(&candidate))
                .await?;
            info!(name = %candidate.name, host = %host, "Added newly discovered device");
            new_devices += 1;
            devices.push(candidate);
        }

        Ok(ScanSummary {
            total_found: devices.len(),
            new_devices,
            existing_devices,
            devices,
        })
    }
}

async fn probe_host(
    connector: Arc<dyn RouterConnector>,
    host: Ipv4Addr,
    port: u16,
    credentials: Credentials,
    timeout: Duration,
    resolve_hostname: bool,
) -> Option<ProbeCandidate> {
    let addr = SocketAddr::new(IpAddr::V4(host), port);

    // Cheap reachability check before attempting a login.
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => {}
        _ => return None,
    }

    let session = match connector
        .connect(IpAddr::V4(host), port, &credentials, timeout)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            // A rejected login is indistinguishable here from some other
            // service listening on the API port; both are skipped.
            debug!(host = %host, port, error = %e, "API login failed");
            return None;
        }
    };

    let identity = match session.identity().await {
        Ok(identity) => identity,
        Err(e) => {
            debug!(host = %host, error = %e, "Identity query failed");
            return None;
        }
    };
    let resources = match session.resources().await {
        Ok(resources) => resources,
        Err(e) => {
            debug!(host = %host, error = %e, "Resource query failed");
            return None;
        }
    };

    let hostname = if resolve_hostname {
        reverse_lookup(IpAddr::V4(host)).await
    } else {
        None
    };

    Some(ProbeCandidate {
        id: Uuid::new_v4().to_string(),
        name: if identity.name.is_empty() {
            format!("device-{}", host)
        } else {
            identity.name
        },
        host: IpAddr::V4(host),
        port,
        username: credentials.username,
        password: credentials.password,
        board_name: resources.board_name,
        version: resources.version,
        hostname,
        enabled: true,
        use_ssl: false,
        site_id: None,
    })
}

/// Best-effort reverse DNS, off the async runtime since the resolver blocks.
async fn reverse_lookup(ip: IpAddr) -> Option<String> {
    tokio::task::spawn_blocking(move || {
        dns_lookup::lookup_addr(&ip)
            .ok()
            .filter(|name| name != &ip.to_string())
    })
    .await
    .ok()
    .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lanmon_core::store::{MonitoredDevice, StoreError};
    use lanmon_routeros::{
        ApiError, ArpEntry, DhcpLease, RouterIdentity, RouterResources, RouterSession,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockConnector {
        accept: IpAddr,
        connects: AtomicUsize,
    }

    impl MockConnector {
        fn accepting(accept: IpAddr) -> Self {
            Self {
                accept,
                connects: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RouterConnector for MockConnector {
        async fn connect(
            &self,
            host: IpAddr,
            _port: u16,
            credentials: &Credentials,
            _timeout: Duration,
        ) -> Result<Box<dyn RouterSession>, ApiError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if host == self.accept {
                Ok(Box::new(MockSession))
            } else {
                Err(ApiError::LoginRejected(credentials.username.clone()))
            }
        }
    }

    struct MockSession;

    #[async_trait]
    impl RouterSession for MockSession {
        async fn identity(&self) -> Result<RouterIdentity, ApiError> {
            Ok(RouterIdentity {
                name: "gateway".to_string(),
            })
        }

        async fn resources(&self) -> Result<RouterResources, ApiError> {
            Ok(RouterResources {
                board_name: "RB4011".to_string(),
                version: "7.14.2".to_string(),
            })
        }

        async fn arp_table(&self) -> Result<Vec<ArpEntry>, ApiError> {
            Ok(Vec::new())
        }

        async fn dhcp_leases(&self) -> Result<Vec<DhcpLease>, ApiError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MockStore {
        devices: std::sync::Mutex<Vec<MonitoredDevice>>,
        next_id: AtomicUsize,
    }

    #[async_trait]
    impl DeviceStore for MockStore {
        async fn list(&self) -> Result<Vec<MonitoredDevice>, StoreError> {
            Ok(self.devices.lock().unwrap().clone())
        }

        async fn create(&self, record: NewMonitoredDevice) -> Result<String, StoreError> {
            let id = format!("dev-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.devices
                .lock()
                .unwrap()
                .push(record.into_monitored(id.clone()));
            Ok(id)
        }
    }

    #[test]
    fn test_expand_range() {
        let hosts = expand_range("192.168.1.0/29").unwrap();
        assert_eq!(hosts.len(), 6);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hosts[5], Ipv4Addr::new(192, 168, 1, 6));

        // Host bits are masked off, not rejected.
        let hosts = expand_range("192.168.1.77/24").unwrap();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], Ipv4Addr::new(192, 168, 1, 1));

        // /31 and /32 have no usable hosts.
        assert!(expand_range("10.0.0.0/31").unwrap().is_empty());
        assert!(expand_range("10.0.0.1/32").unwrap().is_empty());
    }

    #[test]
    fn test_expand_range_rejects_malformed_input() {
        assert!(expand_range("300.1.1.0/24").is_err());
        assert!(expand_range("192.168.1.0/33").is_err());
        assert!(expand_range("192.168.1.0").is_err());
        assert!(expand_range("garbage/24").is_err());
    }

    /// One listener on 127.0.0.5 plays the part of the only live API port in
    /// a /29; every other loopback host refuses the connection.
    async fn fixture_target() -> (tokio::net::TcpListener, ScanTarget) {
        let listener = tokio::net::TcpListener::bind("127.0.0.5:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = ScanTarget::new("127.0.0.0/29", Credentials::default(), port)
            .with_timeout(Duration::from_millis(500));
        (listener, target)
    }

    #[tokio::test]
    async fn test_scan_finds_single_fixture_host() {
        let (_listener, target) = fixture_target().await;
        let accept = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 5));

        for concurrency in [1, 5, 50] {
            let connector = Arc::new(MockConnector::accepting(accept));
            let scanner = Scanner::new(Arc::clone(&connector) as Arc<dyn RouterConnector>)
                .with_concurrency(concurrency);

            let found = scanner.scan(&target).await.unwrap();
            assert_eq!(found.len(), 1, "concurrency {}", concurrency);

            let candidate = &found[0];
            assert_eq!(candidate.host, accept);
            assert_eq!(candidate.name, "gateway");
            assert_eq!(candidate.board_name, "RB4011");
            assert_eq!(candidate.version, "7.14.2");
            assert_eq!(candidate.port, target.port);
            assert!(candidate.enabled);
            assert!(!candidate.id.is_empty());

            // Only the host with an open port reached the login stage.
            assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_invalid_range_fails_before_probing() {
        let connector = Arc::new(MockConnector::accepting(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        let scanner = Scanner::new(Arc::clone(&connector) as Arc<dyn RouterConnector>);

        let target = ScanTarget::new("not-a-range/24", Credentials::default(), 8728);
        assert!(matches!(
            scanner.scan(&target).await,
            Err(ScanError::InvalidRange { .. })
        ));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scan_multiple_skips_bad_range() {
        let (_listener, target) = fixture_target().await;
        let accept = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 5));
        let connector = Arc::new(MockConnector::accepting(accept));
        let scanner = Scanner::new(connector as Arc<dyn RouterConnector>);

        let bad = ScanTarget::new("bogus", Credentials::default(), target.port);
        let found = scanner.scan_multiple(&[bad, target]).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_run_discovery_summary() {
        let (_listener, target) = fixture_target().await;
        let accept = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 5));
        let connector = Arc::new(MockConnector::accepting(accept));
        let scanner = Scanner::new(connector as Arc<dyn RouterConnector>);
        let store = MockStore::default();

        let summary = scanner
            .run_discovery(std::slice::from_ref(&target), &store, "site-1")
            .await
            .unwrap();
        assert_eq!(summary.total_found, 1);
        assert_eq!(summary.new_devices, 1);
        assert_eq!(summary.existing_devices, 0);
        assert_eq!(summary.devices[0].site_id.as_deref(), Some("site-1"));
        assert_eq!(store.list().await.unwrap().len(), 1);

        // A second run finds the same host already monitored.
        let summary = scanner
            .run_discovery(std::slice::from_ref(&target), &store, "site-1")
            .await
            .unwrap();
        assert_eq!(summary.new_devices, 0);
        assert_eq!(summary.existing_devices, 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
