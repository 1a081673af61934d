pub mod dns;
pub mod exec;
pub mod httpx;
pub mod nmap;
pub mod nuclei;
pub mod ping;
pub mod subdomain;

pub use dns::DnsScanner;
pub use httpx::HttpxScanner;
pub use nmap::NmapScanner;
pub use nuclei::NucleiScanner;
pub use ping::PingScanner;
pub use subdomain::SubdomainScanner;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Settings;
use crate::models::{ScanResults, Service, Target, TargetKind};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The underlying tool is missing or failed its version check; the scan
    /// fails without retry.
    #[error("scanner unavailable: {0}")]
    Unavailable(String),

    /// The tool ran but exited without usable output.
    #[error("scan tool failed: {message}")]
    Tool { message: String, retryable: bool },

    #[error("failed to parse tool output: {0}")]
    Parse(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error("scan unit deadline exceeded")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }
}

/// Adapted unit of work handed to a scanner: the scanned target's durable id
/// plus the concrete value to point the tool at. Service scans additionally
/// carry the endpoint.
#[derive(Debug, Clone)]
pub struct ScanInput {
    pub target_id: Uuid,
    pub kind: TargetKind,
    pub value: String,
    pub service_id: Option<Uuid>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
}

impl ScanInput {
    pub fn host(target: &Target) -> Self {
        Self {
            target_id: target.id,
            kind: target.kind,
            value: target.value.clone(),
            service_id: None,
            port: None,
            protocol: None,
        }
    }

    pub fn endpoint(service: &Service, host: &Target) -> Self {
        Self {
            target_id: host.id,
            kind: host.kind,
            value: host.value.clone(),
            service_id: Some(service.id),
            port: u16::try_from(service.port).ok(),
            protocol: Some(service.protocol.clone()),
        }
    }
}

/// Capability contract every scanner adapter implements.
///
/// Adapters drive an external tool over one target or service at a time,
/// translate its output into `ScanResults`, and must abort the tool promptly
/// when the cancellation token fires.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-shot readiness probe; `ScanError::Unavailable` when the tool is
    /// missing.
    async fn initialize(&self) -> Result<(), ScanError>;

    fn supports_target_kind(&self, kind: TargetKind) -> bool;

    fn supports_services(&self) -> bool {
        false
    }

    /// Returns `None` when this scanner cannot handle the target.
    fn adapt_target(&self, target: &Target) -> Option<ScanInput> {
        if self.supports_target_kind(target.kind) {
            Some(ScanInput::host(target))
        } else {
            None
        }
    }

    /// Returns `None` when this scanner cannot handle the service.
    fn adapt_service(&self, _service: &Service, _host: &Target) -> Option<ScanInput> {
        None
    }

    async fn scan(
        &self,
        cancel: &CancellationToken,
        input: &ScanInput,
        params: &Value,
    ) -> Result<ScanResults, ScanError>;
}

/// Name-keyed map of scanner adapters; new adapters register at startup.
#[derive(Default)]
pub struct ScannerRegistry {
    scanners: HashMap<&'static str, Arc<dyn Scanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scanner: Arc<dyn Scanner>) {
        self.scanners.insert(scanner.name(), scanner);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Scanner>> {
        self.scanners.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.scanners.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Registry with all built-in adapters, configured from settings.
pub fn default_registry(settings: &Settings) -> ScannerRegistry {
    let mut registry = ScannerRegistry::new();
    registry.register(Arc::new(NmapScanner::new(settings.nmap_path.clone())));
    registry.register(Arc::new(DnsScanner::new()));
    registry.register(Arc::new(SubdomainScanner::new(
        settings.subfinder_path.clone(),
    )));
    registry.register(Arc::new(HttpxScanner::new(settings.httpx_path.clone())));
    registry.register(Arc::new(NucleiScanner::new(
        settings.nuclei_path.clone(),
        settings.nuclei_templates_path.clone(),
    )));
    registry.register(Arc::new(PingScanner::new(settings.ping_path.clone())));
    registry
}

/// Read a string parameter from a scan's free-form parameter object.
pub(crate) fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}
