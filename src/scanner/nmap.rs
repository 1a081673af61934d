use std::collections::{HashMap, HashSet};
use std::time::Duration;

use lazy_static::lazy_static;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{exec, param_str, ScanError, ScanInput, Scanner};
use crate::models::{
    Finding, RelationKind, ScanResults, Service, Severity, Target, TargetKind, TargetRelation,
};

lazy_static! {
    /// Ports whose exposure is worth an explicit finding.
    static ref HIGH_RISK_PORTS: HashMap<u16, &'static str> = {
        let mut m = HashMap::new();
        m.insert(21, "ftp");
        m.insert(23, "telnet");
        m.insert(135, "msrpc");
        m.insert(139, "netbios");
        m.insert(445, "smb");
        m.insert(1433, "mssql");
        m.insert(1521, "oracle");
        m.insert(3306, "mysql");
        m.insert(3389, "rdp");
        m.insert(5432, "postgresql");
        m.insert(5900, "vnc");
        m.insert(6379, "redis");
        m.insert(9200, "elasticsearch");
        m.insert(27017, "mongodb");
        m
    };
}

/// Port and service discovery via nmap. CIDR targets expand into candidate
/// IP targets linked back to the block with `contains` relations; PTR
/// hostnames become candidate domain targets with `resolves_to` relations.
pub struct NmapScanner {
    bin_path: String,
}

impl NmapScanner {
    pub fn new(bin_path: String) -> Self {
        Self { bin_path }
    }

    fn build_args(&self, input: &ScanInput, params: &Value) -> Vec<String> {
        let scan_type = param_str(params, "scan_type").unwrap_or("basic");
        let port_range = param_str(params, "port_range").unwrap_or("1-1000");
        let timing = param_str(params, "timing").unwrap_or("4");

        let mut args = vec!["-oX".to_string(), "-".to_string(), format!("-T{timing}")];

        match scan_type {
            "quick" => args.push("-F".to_string()),
            "comprehensive" => {
                args.extend([
                    "--top-ports".to_string(),
                    "2000".to_string(),
                    "-sV".to_string(),
                ]);
            }
            "service" => {
                args.extend(["-sV".to_string(), "-p".to_string(), port_range.to_string()]);
            }
            "all_ports" => args.push("-p-".to_string()),
            _ => args.extend(["-p".to_string(), port_range.to_string()]),
        }

        args.push(input.value.clone());
        args
    }
}

#[async_trait]
impl Scanner for NmapScanner {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn initialize(&self) -> Result<(), ScanError> {
        exec::check_binary(&self.bin_path, "--version", "nmap").await
    }

    fn supports_target_kind(&self, kind: TargetKind) -> bool {
        matches!(kind, TargetKind::Ip | TargetKind::Cidr | TargetKind::Domain)
    }

    async fn scan(
        &self,
        cancel: &CancellationToken,
        input: &ScanInput,
        params: &Value,
    ) -> Result<ScanResults, ScanError> {
        let mut command = Command::new(&self.bin_path);
        command.args(self.build_args(input, params));

        let output = exec::run_tool(cancel, Duration::from_secs(3600), command).await?;

        if !output.stdout.contains("<nmaprun") {
            return Err(ScanError::tool(format!(
                "nmap produced no XML output: {}",
                output.stderr.trim()
            )));
        }

        let run: NmapRun = quick_xml::de::from_str(&output.stdout)
            .map_err(|e| ScanError::Parse(format!("nmap XML: {e}")))?;

        Ok(collect_results(input, params, run))
    }
}

fn collect_results(input: &ScanInput, params: &Value, run: NmapRun) -> ScanResults {
    let is_cidr = input.kind == TargetKind::Cidr;
    let scan_type = param_str(params, "scan_type").unwrap_or("basic").to_string();
    let mut results = ScanResults::default();
    let mut live_hosts = 0usize;

    for host in &run.hosts {
        if host.status.state != "up" {
            continue;
        }
        live_hosts += 1;

        let ip_address = host.address.addr.clone();

        // For a CIDR block each live host becomes its own candidate target;
        // otherwise discoveries attach to the scanned target directly.
        let host_target_id = if is_cidr {
            let candidate = Target::candidate(
                TargetKind::Ip,
                &ip_address,
                json!({
                    "discovered_from": input.value,
                    "discovery_scan": "nmap",
                }),
            );
            let candidate_id = candidate.id;
            results.new_targets.push(candidate);

            results.target_relations.push(TargetRelation::candidate(
                input.target_id,
                candidate_id,
                RelationKind::Contains,
                json!({"discovery_scan": "nmap"}),
            ));

            candidate_id
        } else {
            input.target_id
        };

        if let Some(hostnames) = &host.hostnames {
            let mut seen = HashSet::new();
            for hostname in &hostnames.hostnames {
                if hostname.name.is_empty()
                    || !matches!(hostname.kind.as_str(), "user" | "PTR")
                    || !seen.insert(hostname.name.clone())
                {
                    continue;
                }

                let domain = Target::candidate(
                    TargetKind::Domain,
                    &hostname.name,
                    json!({
                        "discovered_from": ip_address,
                        "discovery_scan": "nmap",
                        "hostname_type": hostname.kind,
                    }),
                );
                let domain_id = domain.id;
                results.new_targets.push(domain);

                results.target_relations.push(TargetRelation::candidate(
                    domain_id,
                    host_target_id,
                    RelationKind::ResolvesTo,
                    json!({"discovery_scan": "nmap"}),
                ));
            }
        }

        let mut open_ports = 0usize;
        if let Some(ports) = &host.ports {
            for port in &ports.ports {
                if port.state.state != "open" {
                    continue;
                }
                open_ports += 1;
                results
                    .services
                    .push(service_from_port(host_target_id, &ip_address, port));

                if let Some(label) = HIGH_RISK_PORTS.get(&port.port_id) {
                    let mut finding = Finding::candidate(
                        format!("Exposed {} service on {}:{}", label, ip_address, port.port_id),
                        format!(
                            "Port {}/{} ({}) is reachable from the scan origin.",
                            port.port_id, port.protocol, label
                        ),
                        Severity::Medium,
                        "exposed_service",
                        json!({
                            "target": ip_address,
                            "port": port.port_id,
                            "protocol": port.protocol,
                            "service": label,
                        }),
                    );
                    finding.target_id = host_target_id;
                    results.findings.push(finding);
                }
            }
        }

        results.findings.push(host_summary_finding(
            host_target_id,
            &ip_address,
            open_ports,
            &scan_type,
        ));
    }

    if is_cidr && live_hosts == 0 {
        let mut finding = Finding::candidate(
            format!("No live hosts found in {}", input.value),
            format!(
                "Nmap did not discover any live hosts in {} with the current scan parameters.",
                input.value
            ),
            Severity::Low,
            "no_live_hosts",
            json!({"target": input.value, "scan_type": scan_type}),
        );
        finding.target_id = input.target_id;
        results.findings.push(finding);
    }

    results
}

fn service_from_port(target_id: Uuid, ip_address: &str, port: &NmapPort) -> Service {
    let (name, product, version, extra_info) = match &port.service {
        Some(service) => (
            service.name.clone(),
            service.product.clone(),
            service.version.clone(),
            service.extra_info.clone(),
        ),
        None => Default::default(),
    };

    let mut service = Service::candidate(target_id, port.port_id, &port.protocol);
    service.service_name = name.clone();
    service.version = version.clone();
    service.title = if name.is_empty() {
        format!("Port {}", port.port_id)
    } else {
        format!("{} service on port {}", name, port.port_id)
    };
    service.description = match (&product[..], &version[..]) {
        ("", _) => format!("Service detected on port {}/{}.", port.port_id, port.protocol),
        (product, "") => format!(
            "Service detected on port {}/{}: {}.",
            port.port_id, port.protocol, product
        ),
        (product, version) => format!(
            "Service detected on port {}/{}: {} {}.",
            port.port_id, port.protocol, product, version
        ),
    };
    service.banner = extra_info.clone();
    service.raw_info = json!({
        "product": product,
        "version": version,
        "extra_info": extra_info,
        "state": port.state.state,
        "reason": port.state.reason,
        "target_value": ip_address,
    });
    service
}

fn host_summary_finding(
    target_id: Uuid,
    ip_address: &str,
    open_ports: usize,
    scan_type: &str,
) -> Finding {
    let mut finding = if open_ports > 0 {
        Finding::candidate(
            format!("Host {} has {} open port(s)", ip_address, open_ports),
            format!(
                "Nmap discovered {} open port(s) on host {}.",
                open_ports, ip_address
            ),
            Severity::Info,
            "port_summary",
            json!({
                "target": ip_address,
                "open_port_count": open_ports,
                "scan_type": scan_type,
            }),
        )
    } else {
        Finding::candidate(
            format!("No open ports found on {}", ip_address),
            format!(
                "Nmap did not discover any open ports on host {} within the scanned range.",
                ip_address
            ),
            Severity::Low,
            "no_open_ports",
            json!({"target": ip_address, "scan_type": scan_type}),
        )
    };
    finding.target_id = target_id;
    finding
}

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<NmapHost>,
}

#[derive(Debug, Deserialize)]
struct NmapHost {
    status: NmapStatus,
    address: NmapAddress,
    #[serde(default)]
    hostnames: Option<NmapHostnames>,
    #[serde(default)]
    ports: Option<NmapPorts>,
}

#[derive(Debug, Deserialize)]
struct NmapStatus {
    #[serde(rename = "@state")]
    state: String,
    #[serde(rename = "@reason", default)]
    #[allow(dead_code)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct NmapAddress {
    #[serde(rename = "@addr")]
    addr: String,
}

#[derive(Debug, Deserialize)]
struct NmapHostnames {
    #[serde(rename = "hostname", default)]
    hostnames: Vec<NmapHostname>,
}

#[derive(Debug, Deserialize)]
struct NmapHostname {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct NmapPorts {
    #[serde(rename = "port", default)]
    ports: Vec<NmapPort>,
}

#[derive(Debug, Deserialize)]
struct NmapPort {
    #[serde(rename = "@protocol")]
    protocol: String,
    #[serde(rename = "@portid")]
    port_id: u16,
    state: NmapPortState,
    #[serde(default)]
    service: Option<NmapServiceInfo>,
}

#[derive(Debug, Deserialize)]
struct NmapPortState {
    #[serde(rename = "@state")]
    state: String,
    #[serde(rename = "@reason", default)]
    reason: String,
}

#[derive(Debug, Deserialize, Default)]
struct NmapServiceInfo {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@product", default)]
    product: String,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "@extrainfo", default)]
    extra_info: String,
}
