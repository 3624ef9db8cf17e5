//! Rate-limited MAC vendor resolution with provider failover
//!
//! Lookups hit the persisted cache first; on a miss the configured providers
//! are queried in priority order, with a minimum one-second spacing between
//! any two external sweeps. The cache, the backing file, and the last-request
//! instant sit behind a single mutex so concurrent lookups cannot interleave
//! external requests.

use anyhow::Context;
use async_trait::async_trait;
use lanmon_core::vendor::{classify, normalize_oui, VendorCache, UNKNOWN_VENDOR};
use lanmon_core::DeviceClass;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Minimum spacing between two external provider sweeps.
pub const REQUEST_INTERVAL: Duration = Duration::from_secs(1);

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = "lanmon/0.1";

/// An external OUI lookup service
#[async_trait]
pub trait VendorProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means the provider answered but had no vendor for this OUI.
    async fn fetch(&self, oui: &str) -> anyhow::Result<Option<String>>;
}

/// How a provider encodes its response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// The body is the vendor name itself
    PlainText,
    /// `{"success": bool, "data": {"vendor": ...}}`
    JsonEnvelope,
}

/// HTTP GET provider: the OUI is appended to the base URL
pub struct HttpVendorProvider {
    name: String,
    base_url: String,
    format: ResponseFormat,
    client: reqwest::Client,
}

impl HttpVendorProvider {
    pub fn new(name: &str, base_url: &str, format: ResponseFormat) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            format,
            client,
        })
    }
}

#[derive(Deserialize)]
struct EnvelopeRsp {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    vendor: Option<String>,
}

fn parse_envelope(body: &str) -> Option<String> {
    let rsp: EnvelopeRsp = serde_json::from_str(body).ok()?;
    if !rsp.success {
        return None;
    }
    rsp.data.and_then(|d| d.vendor).filter(|v| !v.is_empty())
}

#[async_trait]
impl VendorProvider for HttpVendorProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, oui: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/{}", self.base_url, oui);
        let response = self.client.get(&url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("{} returned HTTP {}", self.name, response.status());
        }
        let body = response.text().await?;
        Ok(match self.format {
            ResponseFormat::PlainText => {
                let vendor = body.trim().to_string();
                if vendor.is_empty() {
                    None
                } else {
                    Some(vendor)
                }
            }
            ResponseFormat::JsonEnvelope => parse_envelope(&body),
        })
    }
}

/// The stock provider chain, queried in order: macvendors (plain text) then
/// maclookup (JSON envelope).
pub fn default_providers() -> anyhow::Result<Vec<Box<dyn VendorProvider>>> {
    Ok(vec![
        Box::new(HttpVendorProvider::new(
            "macvendors",
            "https://api.macvendors.com",
            ResponseFormat::PlainText,
        )?),
        Box::new(HttpVendorProvider::new(
            "maclookup",
            "https://api.maclookup.app/v2/macs",
            ResponseFormat::JsonEnvelope,
        )?),
    ])
}

struct ResolverState {
    cache: VendorCache,
    last_request: Option<Instant>,
}

/// Vendor resolution service shared by the active and passive paths
pub struct VendorResolver {
    state: Mutex<ResolverState>,
    providers: Vec<Box<dyn VendorProvider>>,
}

impl VendorResolver {
    pub fn new(cache_path: impl Into<PathBuf>, providers: Vec<Box<dyn VendorProvider>>) -> Self {
        Self {
            state: Mutex::new(ResolverState {
                cache: VendorCache::load(cache_path),
                last_request: None,
            }),
            providers,
        }
    }

    /// Resolve the vendor name for a MAC address.
    ///
    /// Returns `"Unknown"` when the address is malformed or every provider
    /// fails; the sentinel is never cached, so a later lookup retries online.
    pub async fn lookup(&self, mac: &str) -> String {
        let Some(oui) = normalize_oui(mac) else {
            return UNKNOWN_VENDOR.to_string();
        };

        // The lock covers the cache read, the spacing check, and the provider
        // sweep; the check-then-sleep must be atomic across callers.
        let mut state = self.state.lock().await;
        let now = chrono::Utc::now().timestamp();
        if let Some(vendor) = state.cache.get(&oui, now) {
            return vendor.to_string();
        }

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < REQUEST_INTERVAL {
                tokio::time::sleep(REQUEST_INTERVAL - elapsed).await;
            }
        }

        let vendor = self.sweep_providers(&oui).await;
        state.last_request = Some(Instant::now());

        match vendor {
            Some(vendor) => {
                state
                    .cache
                    .insert(oui, vendor.clone(), chrono::Utc::now().timestamp());
                vendor
            }
            None => UNKNOWN_VENDOR.to_string(),
        }
    }

    /// Resolve the vendor and derive the device class in one step.
    pub async fn lookup_classified(&self, mac: &str) -> (String, DeviceClass) {
        let vendor = self.lookup(mac).await;
        let class = if vendor == UNKNOWN_VENDOR {
            DeviceClass::Other
        } else {
            classify(&vendor)
        };
        (vendor, class)
    }

    async fn sweep_providers(&self, oui: &str) -> Option<String> {
        for provider in &self.providers {
            match provider.fetch(oui).await {
                Ok(Some(vendor)) => {
                    debug!(provider = provider.name(), oui, vendor = %vendor, "Vendor resolved");
                    return Some(vendor);
                }
                Ok(None) => {
                    debug!(provider = provider.name(), oui, "Provider had no entry");
                }
                Err(e) => {
                    warn!(provider = provider.name(), oui, error = %e, "Vendor provider query failed");
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    enum MockResponse {
        Vendor(&'static str),
        Fail,
    }

    struct MockProvider {
        name: &'static str,
        response: MockResponse,
        calls: Arc<AtomicUsize>,
        stamps: Arc<std::sync::Mutex<Vec<Instant>>>,
    }

    impl MockProvider {
        fn new(name: &'static str, response: MockResponse) -> (Box<dyn VendorProvider>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider = Box::new(Self {
                name,
                response,
                calls: Arc::clone(&calls),
                stamps: Arc::new(std::sync::Mutex::new(Vec::new())),
            });
            (provider, calls)
        }

        fn with_stamps(
            name: &'static str,
            response: MockResponse,
            stamps: Arc<std::sync::Mutex<Vec<Instant>>>,
        ) -> Box<dyn VendorProvider> {
            Box::new(Self {
                name,
                response,
                calls: Arc::new(AtomicUsize::new(0)),
                stamps,
            })
        }
    }

    #[async_trait]
    impl VendorProvider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, _oui: &str) -> anyhow::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.stamps.lock().unwrap().push(Instant::now());
            match self.response {
                MockResponse::Vendor(v) => Ok(Some(v.to_string())),
                MockResponse::Fail => anyhow::bail!("HTTP 500"),
            }
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_external_call() {
        let dir = TempDir::new().unwrap();
        let (provider, calls) = MockProvider::new("mock", MockResponse::Vendor("Acme"));
        let resolver = VendorResolver::new(dir.path().join("vendors.json"), vec![provider]);

        assert_eq!(resolver.lookup("aa:bb:cc:00:11:22").await, "Acme");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Same OUI, different tail: served from cache.
        assert_eq!(resolver.lookup("AA:BB:CC:99:88:77").await, "Acme");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vendors.json");
        // Timestamp 0 is far beyond the 30-day TTL.
        std::fs::write(&path, r#"{"AABBCC":["Stale Corp",0]}"#).unwrap();

        let (provider, calls) = MockProvider::new("mock", MockResponse::Vendor("Fresh Inc"));
        let resolver = VendorResolver::new(&path, vec![provider]);

        assert_eq!(resolver.lookup("AABBCC001122").await, "Fresh Inc");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_calls_spaced_one_second_apart() {
        let dir = TempDir::new().unwrap();
        let stamps = Arc::new(std::sync::Mutex::new(Vec::new()));
        let provider =
            MockProvider::with_stamps("mock", MockResponse::Vendor("Acme"), Arc::clone(&stamps));
        let resolver = VendorResolver::new(dir.path().join("vendors.json"), vec![provider]);

        resolver.lookup("AA:BB:CC:00:00:01").await;
        resolver.lookup("DD:EE:FF:00:00:02").await;

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 2);
        let spacing = stamps[1] - stamps[0];
        assert!(spacing >= REQUEST_INTERVAL, "spacing was {:?}", spacing);
        assert!(spacing < REQUEST_INTERVAL + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failover_and_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vendors.json");
        let (primary, primary_calls) = MockProvider::new("primary", MockResponse::Fail);
        let (secondary, secondary_calls) = MockProvider::new("secondary", MockResponse::Vendor("Acme"));
        let resolver = VendorResolver::new(&path, vec![primary, secondary]);

        assert_eq!(resolver.lookup("aa:bb:cc:00:11:22").await, "Acme");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);

        // The result must have been written through to the cache file.
        let reloaded = VendorCache::load(&path);
        let now = chrono::Utc::now().timestamp();
        assert_eq!(reloaded.get("AABBCC", now), Some("Acme"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_not_cached() {
        let dir = TempDir::new().unwrap();
        let (provider, calls) = MockProvider::new("mock", MockResponse::Fail);
        let resolver = VendorResolver::new(dir.path().join("vendors.json"), vec![provider]);

        assert_eq!(resolver.lookup("AABBCC001122").await, UNKNOWN_VENDOR);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The sentinel is not cached, so the next lookup goes online again.
        assert_eq!(resolver.lookup("AABBCC001122").await, UNKNOWN_VENDOR);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_malformed_mac_is_unknown_without_any_call() {
        let dir = TempDir::new().unwrap();
        let (provider, calls) = MockProvider::new("mock", MockResponse::Vendor("Acme"));
        let resolver = VendorResolver::new(dir.path().join("vendors.json"), vec![provider]);

        assert_eq!(resolver.lookup("12").await, UNKNOWN_VENDOR);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_parse_envelope() {
        assert_eq!(
            parse_envelope(r#"{"success":true,"data":{"vendor":"Acme"}}"#).as_deref(),
            Some("Acme")
        );
        assert_eq!(parse_envelope(r#"{"success":false,"data":{"vendor":"Acme"}}"#), None);
        assert_eq!(parse_envelope(r#"{"success":true,"data":{}}"#), None);
        assert_eq!(parse_envelope(r#"{"success":true,"data":{"vendor":""}}"#), None);
        assert_eq!(parse_envelope("not json"), None);
    }

    #[tokio::test]
    async fn test_classified_lookup() {
        let dir = TempDir::new().unwrap();
        let (provider, _calls) = MockProvider::new("mock", MockResponse::Vendor("MikroTik"));
        let resolver = VendorResolver::new(dir.path().join("vendors.json"), vec![provider]);

        let (vendor, class) = resolver.lookup_classified("4C:5E:0C:12:34:56").await;
        assert_eq!(vendor, "MikroTik");
        assert_eq!(class, DeviceClass::NetworkEquipment);
    }
}
