use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{exec, param_str, ScanError, ScanInput, Scanner};
use crate::models::{Finding, ScanResults, Severity, TargetKind};

/// Vulnerability template engine via nuclei. Each matched template becomes a
/// finding typed by its template id, so repeated matches of the same template
/// against the same target dedupe on ingestion.
pub struct NucleiScanner {
    bin_path: String,
    templates_path: Option<String>,
}

impl NucleiScanner {
    pub fn new(bin_path: String, templates_path: Option<String>) -> Self {
        Self {
            bin_path,
            templates_path,
        }
    }

    fn probe_url(input: &ScanInput) -> String {
        match input.port {
            Some(port) => {
                let scheme = if matches!(port, 443 | 8443) {
                    "https"
                } else {
                    "http"
                };
                format!("{}://{}:{}", scheme, input.value, port)
            }
            None => input.value.clone(),
        }
    }
}

#[async_trait]
impl Scanner for NucleiScanner {
    fn name(&self) -> &'static str {
        "nuclei"
    }

    async fn initialize(&self) -> Result<(), ScanError> {
        exec::check_binary(&self.bin_path, "-version", "nuclei").await
    }

    fn supports_target_kind(&self, kind: TargetKind) -> bool {
        matches!(kind, TargetKind::Ip | TargetKind::Domain)
    }

    fn supports_services(&self) -> bool {
        true
    }

    fn adapt_service(
        &self,
        service: &crate::models::Service,
        host: &crate::models::Target,
    ) -> Option<ScanInput> {
        if service.protocol != "tcp" {
            return None;
        }
        Some(ScanInput::endpoint(service, host))
    }

    async fn scan(
        &self,
        cancel: &CancellationToken,
        input: &ScanInput,
        params: &Value,
    ) -> Result<ScanResults, ScanError> {
        let url = Self::probe_url(input);

        let mut command = Command::new(&self.bin_path);
        command.args(["-u", &url, "-jsonl", "-silent"]);

        if let Some(templates) = param_str(params, "templates").or(self.templates_path.as_deref()) {
            command.args(["-t", templates]);
        }
        if let Some(severity) = param_str(params, "severity") {
            command.args(["-severity", severity]);
        }
        if let Some(tags) = param_str(params, "tags") {
            command.args(["-tags", tags]);
        }

        let output = exec::run_tool(cancel, Duration::from_secs(3600), command).await?;

        let mut results = ScanResults::default();
        for line in output.stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event: NucleiEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable nuclei line");
                    continue;
                }
            };

            results.findings.push(finding_from_event(input, &event));
        }

        if results.findings.is_empty() && !output.success {
            return Err(ScanError::tool(format!(
                "nuclei exited with an error and no findings: {}",
                output.stderr.trim()
            )));
        }

        Ok(results)
    }
}

fn finding_from_event(input: &ScanInput, event: &NucleiEvent) -> Finding {
    let severity = event
        .info
        .severity
        .as_deref()
        .map(Severity::parse_lossy)
        .unwrap_or(Severity::Unknown);

    let title = event
        .info
        .name
        .clone()
        .unwrap_or_else(|| event.template_id.clone());

    let mut finding = Finding::candidate(
        title,
        event.info.description.clone().unwrap_or_default(),
        severity,
        &event.template_id,
        json!({
            "template_id": event.template_id,
            "matched_at": event.matched_at,
            "matcher_name": event.matcher_name,
            "tags": event.info.tags,
            "reference": event.info.reference,
        }),
    );
    finding.service_id = input.service_id;
    finding
}

#[derive(Debug, Deserialize)]
struct NucleiEvent {
    #[serde(rename = "template-id")]
    template_id: String,
    #[serde(default)]
    info: NucleiInfo,
    #[serde(default, rename = "matched-at")]
    matched_at: Option<String>,
    #[serde(default, rename = "matcher-name")]
    matcher_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NucleiInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    reference: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const EVENT_LINE: &str = r#"{"template-id":"wordpress-login-detect","info":{"name":"WordPress Login Page","severity":"info","description":"Detects the WordPress login page.","tags":["wordpress","cms"]},"matched-at":"https://example.com/wp-login.php"}"#;

    #[test]
    fn event_maps_to_finding_typed_by_template() {
        let input = ScanInput {
            target_id: Uuid::new_v4(),
            kind: TargetKind::Domain,
            value: "example.com".to_string(),
            service_id: None,
            port: None,
            protocol: None,
        };

        let event: NucleiEvent = serde_json::from_str(EVENT_LINE).unwrap();
        let finding = finding_from_event(&input, &event);

        assert_eq!(finding.finding_type, "wordpress-login-detect");
        assert_eq!(finding.title, "WordPress Login Page");
        assert_eq!(finding.severity, Severity::Info);
        assert_eq!(
            finding.details["matched_at"],
            "https://example.com/wp-login.php"
        );
    }

    #[test]
    fn service_scan_propagates_service_id() {
        let service_id = Uuid::new_v4();
        let input = ScanInput {
            target_id: Uuid::new_v4(),
            kind: TargetKind::Ip,
            value: "10.0.0.1".to_string(),
            service_id: Some(service_id),
            port: Some(443),
            protocol: Some("tcp".to_string()),
        };

        let event: NucleiEvent = serde_json::from_str(EVENT_LINE).unwrap();
        let finding = finding_from_event(&input, &event);

        assert_eq!(finding.service_id, Some(service_id));
    }

    #[test]
    fn unknown_severity_is_lossy() {
        let line = r#"{"template-id":"x","info":{"severity":"catastrophic"}}"#;
        let event: NucleiEvent = serde_json::from_str(line).unwrap();
        let input = ScanInput {
            target_id: Uuid::new_v4(),
            kind: TargetKind::Ip,
            value: "10.0.0.1".to_string(),
            service_id: None,
            port: None,
            protocol: None,
        };

        let finding = finding_from_event(&input, &event);
        assert_eq!(finding.severity, Severity::Unknown);
    }
}
