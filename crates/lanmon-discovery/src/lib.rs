//! lanmon Discovery - the device discovery and lifecycle engine
//!
//! Two complementary paths feed the inventory:
//! - the active [`scanner`] probes address ranges for reachable RouterOS
//!   API endpoints and returns structured device candidates
//! - the [`passive`] store ingests ARP and DHCP lease tables from already
//!   monitored routers, ages the resulting inventory, and supports
//!   promotion into the monitored set
//!
//! Both paths resolve unknown vendors through the rate-limited, persisted
//! [`resolver`].

pub mod passive;
mod promote;
pub mod resolver;
pub mod scanner;

pub use passive::{FeedProvider, PassiveDiscovery, SCAN_INTERVAL};
pub use resolver::{
    default_providers, HttpVendorProvider, ResponseFormat, VendorProvider, VendorResolver,
    REQUEST_INTERVAL,
};
pub use scanner::{expand_range, ScanError, ScanSummary, ScanTarget, Scanner};
