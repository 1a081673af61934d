use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{exec, param_str, ScanError, ScanInput, Scanner};
use crate::models::{
    Finding, RelationKind, ScanResults, Severity, Target, TargetKind, TargetRelation,
};

/// Subdomain enumeration via subfinder. Every discovered subdomain becomes a
/// candidate domain target with a `parent_of` relation from the scanned
/// domain.
pub struct SubdomainScanner {
    bin_path: String,
}

impl SubdomainScanner {
    pub fn new(bin_path: String) -> Self {
        Self { bin_path }
    }
}

#[async_trait]
impl Scanner for SubdomainScanner {
    fn name(&self) -> &'static str {
        "subdomain"
    }

    async fn initialize(&self) -> Result<(), ScanError> {
        exec::check_binary(&self.bin_path, "-version", "subfinder").await
    }

    fn supports_target_kind(&self, kind: TargetKind) -> bool {
        kind == TargetKind::Domain
    }

    async fn scan(
        &self,
        cancel: &CancellationToken,
        input: &ScanInput,
        params: &Value,
    ) -> Result<ScanResults, ScanError> {
        let mut command = Command::new(&self.bin_path);
        command.args(["-d", &input.value, "-silent"]);
        if params
            .get("recursive")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            command.arg("-recursive");
        }
        if let Some(sources) = param_str(params, "sources") {
            command.args(["-sources", sources]);
        }

        let output = exec::run_tool(cancel, Duration::from_secs(1800), command).await?;

        if !output.success {
            return Err(ScanError::tool(format!(
                "subfinder exited with an error: {}",
                output.stderr.trim()
            )));
        }

        Ok(collect_results(input, &output.stdout))
    }
}

fn collect_results(input: &ScanInput, stdout: &str) -> ScanResults {
    let mut results = ScanResults::default();
    let mut discovered = 0usize;

    for line in stdout.lines() {
        let subdomain = line.trim().trim_end_matches('.').to_ascii_lowercase();
        if subdomain.is_empty() || subdomain == input.value {
            continue;
        }
        // Tools occasionally emit unrelated names; keep only children of the
        // scanned domain.
        if !subdomain.ends_with(&format!(".{}", input.value)) {
            continue;
        }

        discovered += 1;

        let candidate = Target::candidate(
            TargetKind::Domain,
            &subdomain,
            json!({
                "discovered_from": input.value,
                "discovery_scan": "subdomain",
            }),
        );
        let candidate_id = candidate.id;
        results.new_targets.push(candidate);

        results.target_relations.push(TargetRelation::candidate(
            input.target_id,
            candidate_id,
            RelationKind::ParentOf,
            json!({"discovery_scan": "subdomain"}),
        ));
    }

    let mut summary = Finding::candidate(
        format!("{} subdomain(s) discovered for {}", discovered, input.value),
        format!(
            "Subdomain enumeration discovered {} subdomain(s) of {}.",
            discovered, input.value
        ),
        Severity::Info,
        "subdomain_enumeration",
        json!({
            "domain": input.value,
            "count": discovered,
        }),
    );
    summary.target_id = input.target_id;
    results.findings.push(summary);

    results
}
