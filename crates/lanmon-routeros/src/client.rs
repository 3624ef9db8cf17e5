//! Session traits implemented by the RouterOS API client

use crate::types::{ArpEntry, Credentials, DhcpLease, RouterIdentity, RouterResources};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("login rejected for user {0}")]
    LoginRejected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// An authenticated API session against one router
#[async_trait]
pub trait RouterSession: Send + Sync {
    async fn identity(&self) -> Result<RouterIdentity, ApiError>;

    async fn resources(&self) -> Result<RouterResources, ApiError>;

    async fn arp_table(&self) -> Result<Vec<ArpEntry>, ApiError>;

    async fn dhcp_leases(&self) -> Result<Vec<DhcpLease>, ApiError>;
}

/// Opens authenticated sessions; the discovery engine holds one connector
/// and uses it against every probed host.
#[async_trait]
pub trait RouterConnector: Send + Sync {
    async fn connect(
        &self,
        host: IpAddr,
        port: u16,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Box<dyn RouterSession>, ApiError>;
}
