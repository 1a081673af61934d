use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{exec, ScanError, ScanInput, Scanner};
use crate::models::{
    Application, Certificate, Finding, ScanResults, Service, Severity, TargetKind,
};

lazy_static! {
    /// "nginx/1.20.1", "Apache/2.4.57 (Debian)" and the like.
    static ref SERVER_VERSION: Regex =
        Regex::new(r"^([A-Za-z][\w .-]*?)[/ ]v?(\d[\w.-]*)").unwrap();
}

/// Split a Server header value into product and version.
fn parse_webserver(webserver: &str) -> (String, String) {
    match SERVER_VERSION.captures(webserver) {
        Some(captures) => (
            captures[1].trim().to_string(),
            captures[2].trim().to_string(),
        ),
        None => (webserver.trim().to_string(), String::new()),
    }
}

/// HTTP fingerprinting via httpx. Emits one service per probed endpoint,
/// applications for detected technologies, certificates from TLS metadata,
/// and a fingerprint finding per response.
pub struct HttpxScanner {
    bin_path: String,
}

impl HttpxScanner {
    pub fn new(bin_path: String) -> Self {
        Self { bin_path }
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
impl Scanner for HttpxScanner {
    fn name(&self) -> &'static str {
        "httpx"
    }

    async fn initialize(&self) -> Result<(), ScanError> {
        exec::check_binary(&self.bin_path, "-version", "httpx").await
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
        _params: &Value,
    ) -> Result<ScanResults, ScanError> {
        let url = Self::probe_url(input);

        let mut command = Command::new(&self.bin_path);
        command.args([
            "-u",
            &url,
            "-json",
            "-silent",
            "-title",
            "-status-code",
            "-tech-detect",
            "-web-server",
            "-tls-grab",
        ]);

        let output = exec::run_tool(cancel, Duration::from_secs(600), command).await?;

        let mut results = ScanResults::default();
        for line in output.stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let probe: HttpxProbe = match serde_json::from_str(line) {
                Ok(probe) => probe,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable httpx line");
                    continue;
                }
            };

            collect_probe(input, &probe, line, &mut results);
        }

        if results.is_empty() && !output.success {
            return Err(ScanError::tool(format!(
                "httpx produced no results: {}",
                output.stderr.trim()
            )));
        }

        Ok(results)
    }
}

fn collect_probe(input: &ScanInput, probe: &HttpxProbe, raw: &str, results: &mut ScanResults) {
    let port = probe
        .port
        .as_deref()
        .and_then(|p| p.parse::<u16>().ok())
        .or(input.port)
        .unwrap_or(80);
    let is_tls = probe.scheme.as_deref() == Some("https") || matches!(port, 443 | 8443);

    // Service scans update the already-known endpoint; host scans mint a
    // candidate service for the stitcher to dedupe.
    let mut service = Service::candidate(input.target_id, port, "tcp");
    if let Some(service_id) = input.service_id {
        service.id = service_id;
    }
    service.service_name = if is_tls { "https" } else { "http" }.to_string();
    service.title = probe.title.clone().unwrap_or_default();
    service.banner = probe.webserver.clone().unwrap_or_default();
    if let Some(webserver) = &probe.webserver {
        let (_, version) = parse_webserver(webserver);
        service.version = version;
    }
    service.raw_info = serde_json::from_str(raw).unwrap_or_else(|_| json!({}));
    let service_provisional_id = service.id;
    results.services.push(service);

    for tech in &probe.tech {
        let mut application =
            Application::candidate(tech.clone(), tech.to_ascii_lowercase(), probe.url.clone());
        application.service_id = Some(service_provisional_id);
        application.metadata = json!({
            "detected_by": "httpx",
            "url": probe.url,
        });
        results.applications.push(application);
    }

    if let Some(tls) = &probe.tls {
        let mut certificate = Certificate::candidate(
            tls.issuer_cn.clone().unwrap_or_default(),
            tls.subject_cn.clone().unwrap_or_default(),
        );
        certificate.service_id = Some(service_provisional_id);
        certificate.issued_at = tls.not_before.as_deref().and_then(parse_timestamp);
        certificate.expires_at = tls.not_after.as_deref().and_then(parse_timestamp);
        certificate.details = json!({
            "subject_an": tls.subject_an,
            "host": probe.url,
        });
        results.certificates.push(certificate);
    }

    let status = probe.status_code.unwrap_or_default();
    let mut finding = Finding::candidate(
        format!(
            "HTTP service at {} ({})",
            probe.url,
            probe.webserver.as_deref().unwrap_or("unknown server")
        ),
        format!(
            "httpx fingerprinted {} with status {}.",
            probe.url, status
        ),
        Severity::Info,
        "http_fingerprint",
        json!({
            "url": probe.url,
            "status_code": status,
            "title": probe.title,
            "webserver": probe.webserver,
            "tech": probe.tech,
        }),
    );
    finding.service_id = Some(service_provisional_id);
    results.findings.push(finding);
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

#[derive(Debug, Deserialize)]
struct HttpxProbe {
    url: String,
    #[serde(default)]
    scheme: Option<String>,
    #[serde(default)]
    port: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    webserver: Option<String>,
    #[serde(default, rename = "status_code")]
    status_code: Option<u16>,
    #[serde(default)]
    tech: Vec<String>,
    #[serde(default)]
    tls: Option<HttpxTls>,
}

#[derive(Debug, Deserialize)]
struct HttpxTls {
    #[serde(default)]
    subject_cn: Option<String>,
    #[serde(default)]
    issuer_cn: Option<String>,
    #[serde(default)]
    not_before: Option<String>,
    #[serde(default)]
    not_after: Option<String>,
    #[serde(default)]
    subject_an: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const PROBE_LINE: &str = r#"{"url":"https://example.com:443","scheme":"https","port":"443","title":"Example","webserver":"nginx/1.20.1","status_code":200,"tech":["Nginx","WordPress"],"tls":{"subject_cn":"example.com","issuer_cn":"R3","not_before":"2024-01-01T00:00:00Z","not_after":"2024-04-01T00:00:00Z","subject_an":["example.com","www.example.com"]}}"#;

    fn host_input() -> ScanInput {
        ScanInput {
            target_id: Uuid::new_v4(),
            kind: TargetKind::Domain,
            value: "example.com".to_string(),
            service_id: None,
            port: None,
            protocol: None,
        }
    }

    #[test]
    fn probe_produces_service_applications_and_certificate() {
        let input = host_input();
        let probe: HttpxProbe = serde_json::from_str(PROBE_LINE).unwrap();
        let mut results = ScanResults::default();

        collect_probe(&input, &probe, PROBE_LINE, &mut results);

        assert_eq!(results.services.len(), 1);
        let service = &results.services[0];
        assert_eq!(service.port, 443);
        assert_eq!(service.service_name, "https");
        assert_eq!(service.title, "Example");

        assert_eq!(results.applications.len(), 2);
        assert!(results
            .applications
            .iter()
            .any(|a| a.name == "WordPress" && a.app_type == "wordpress"));
        assert!(results
            .applications
            .iter()
            .all(|a| a.service_id == Some(service.id)));

        assert_eq!(results.certificates.len(), 1);
        let certificate = &results.certificates[0];
        assert_eq!(certificate.domain, "example.com");
        assert_eq!(certificate.issuer, "R3");
        assert!(certificate.expires_at.is_some());
    }

    #[test]
    fn finding_references_the_provisional_service() {
        let input = host_input();
        let probe: HttpxProbe = serde_json::from_str(PROBE_LINE).unwrap();
        let mut results = ScanResults::default();

        collect_probe(&input, &probe, PROBE_LINE, &mut results);

        let finding = &results.findings[0];
        assert_eq!(finding.finding_type, "http_fingerprint");
        assert_eq!(finding.service_id, Some(results.services[0].id));
    }

    #[test]
    fn service_scan_keeps_the_durable_service_id() {
        let service_id = Uuid::new_v4();
        let input = ScanInput {
            target_id: Uuid::new_v4(),
            kind: TargetKind::Domain,
            value: "example.com".to_string(),
            service_id: Some(service_id),
            port: Some(8080),
            protocol: Some("tcp".to_string()),
        };

        let line = r#"{"url":"http://example.com:8080","port":"8080","status_code":404}"#;
        let probe: HttpxProbe = serde_json::from_str(line).unwrap();
        let mut results = ScanResults::default();

        collect_probe(&input, &probe, line, &mut results);

        assert_eq!(results.services[0].id, service_id);
        assert_eq!(results.findings[0].service_id, Some(service_id));
    }

    #[test]
    fn webserver_header_splits_into_product_and_version() {
        assert_eq!(
            parse_webserver("nginx/1.20.1"),
            ("nginx".to_string(), "1.20.1".to_string())
        );
        assert_eq!(
            parse_webserver("Apache/2.4.57 (Debian)"),
            ("Apache".to_string(), "2.4.57".to_string())
        );
        assert_eq!(
            parse_webserver("CustomServer"),
            ("CustomServer".to_string(), String::new())
        );
    }

    #[test]
    fn probe_url_uses_https_for_tls_ports() {
        let mut input = host_input();
        input.port = Some(443);
        assert_eq!(
            HttpxScanner::probe_url(&input),
            "https://example.com:443"
        );

        input.port = Some(8080);
        assert_eq!(HttpxScanner::probe_url(&input), "http://example.com:8080");

        input.port = None;
        assert_eq!(HttpxScanner::probe_url(&input), "example.com");
    }
}
