use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::error::ProbeError;
use crate::types::ReachabilityReport;

/// One-shot reachability query.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn fetch(&self) -> Result<ReachabilityReport, ProbeError>;
}

/// Probes reachability by opening (and immediately closing) a TCP
/// connection to a well-known host.
///
/// A failed connect is reported as a disconnected link rather than an
/// error; only resolution problems surface as [`ProbeError`].
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn from_config(cfg: &tether_core::config::ProbeConfig) -> Self {
        Self::new(
            cfg.host.clone(),
            cfg.port,
            Duration::from_millis(cfg.timeout_ms),
        )
    }

    async fn resolve(&self) -> Result<SocketAddr, ProbeError> {
        let mut addrs = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| ProbeError::Failed(format!("resolve {}: {e}", self.host)))?;
        addrs
            .next()
            .ok_or_else(|| ProbeError::Failed(format!("no address for {}", self.host)))
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn fetch(&self) -> Result<ReachabilityReport, ProbeError> {
        let ms = self.timeout.as_millis() as u64;
        let addr = tokio::time::timeout(self.timeout, self.resolve())
            .await
            .map_err(|_| ProbeError::Timeout { ms })??;

        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Ok(ReachabilityReport::online("tcp")),
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "probe connect failed");
                Ok(ReachabilityReport::offline())
            }
            Err(_) => {
                debug!(%addr, ms, "probe connect timed out");
                Ok(ReachabilityReport::offline())
            }
        }
    }
}
