//! lanmon RouterOS - typed contract for the RouterOS API client
//!
//! The wire protocol lives in the API client implementation; this crate
//! defines the session surface the discovery engine consumes: connect,
//! identity/resource queries, and the ARP and DHCP lease tables.

pub mod client;
pub mod types;

pub use client::{ApiError, RouterConnector, RouterSession};
pub use types::{
    ArpEntry, Credentials, DhcpLease, RouterIdentity, RouterResources, API_PORT, API_SSL_PORT,
    DEFAULT_USERNAME,
};
