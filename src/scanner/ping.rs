use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{exec, ScanError, ScanInput, Scanner};
use crate::models::{Finding, ScanResults, Severity, TargetKind};

/// Liveness probe via the system ping binary. A reply produces a single
/// host-up finding; silence produces nothing.
pub struct PingScanner {
    bin_path: String,
}

impl PingScanner {
    pub fn new(bin_path: String) -> Self {
        Self { bin_path }
    }
}

#[async_trait]
impl Scanner for PingScanner {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn initialize(&self) -> Result<(), ScanError> {
        // `ping` exits non-zero without a destination but still identifies
        // itself on stderr.
        exec::check_binary(&self.bin_path, "-V", "ping").await
    }

    fn supports_target_kind(&self, kind: TargetKind) -> bool {
        matches!(kind, TargetKind::Ip | TargetKind::Domain)
    }

    async fn scan(
        &self,
        cancel: &CancellationToken,
        input: &ScanInput,
        params: &Value,
    ) -> Result<ScanResults, ScanError> {
        let count = params
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(1)
            .clamp(1, 10)
            .to_string();

        let mut command = Command::new(&self.bin_path);
        command.args(["-c", &count, "-W", "2", &input.value]);

        let output = exec::run_tool(cancel, Duration::from_secs(60), command).await?;

        let mut results = ScanResults::default();
        if output.success {
            let mut finding = Finding::candidate(
                format!("Host {} is up", input.value),
                format!("{} responded to an ICMP echo request.", input.value),
                Severity::Info,
                "host_up",
                json!({"target": input.value}),
            );
            finding.target_id = input.target_id;
            results.findings.push(finding);
        } else {
            tracing::debug!(target_value = %input.value, "no ICMP reply");
        }

        Ok(results)
    }
}
