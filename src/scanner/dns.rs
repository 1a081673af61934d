use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{ScanError, ScanInput, Scanner};
use crate::models::{
    DnsRecord, Finding, RelationKind, ScanResults, Severity, Target, TargetKind, TargetRelation,
};

const DEFAULT_RECORD_TYPES: &[RecordType] = &[
    RecordType::A,
    RecordType::AAAA,
    RecordType::CNAME,
    RecordType::MX,
    RecordType::TXT,
    RecordType::NS,
];

/// DNS record resolution. Domains are queried for the common record types;
/// IP targets get a reverse (PTR) lookup. Resolved addresses become
/// candidate IP targets linked with `resolves_to` relations.
pub struct DnsScanner;

impl DnsScanner {
    pub fn new() -> Self {
        Self
    }

    fn resolver(&self) -> Result<TokioAsyncResolver, ScanError> {
        match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => Ok(resolver),
            Err(_) => Ok(TokioAsyncResolver::tokio(
                ResolverConfig::default(),
                ResolverOpts::default(),
            )),
        }
    }

    fn record_types(params: &Value) -> Vec<RecordType> {
        let requested = params.get("record_types").and_then(Value::as_array);
        match requested {
            Some(types) if !types.is_empty() => types
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|t| t.to_uppercase().parse().ok())
                .collect(),
            _ => DEFAULT_RECORD_TYPES.to_vec(),
        }
    }
}

impl Default for DnsScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scanner for DnsScanner {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn initialize(&self) -> Result<(), ScanError> {
        self.resolver().map(|_| ())
    }

    fn supports_target_kind(&self, kind: TargetKind) -> bool {
        matches!(kind, TargetKind::Domain | TargetKind::Ip)
    }

    async fn scan(
        &self,
        cancel: &CancellationToken,
        input: &ScanInput,
        params: &Value,
    ) -> Result<ScanResults, ScanError> {
        let resolver = self.resolver()?;
        let mut results = ScanResults::default();

        if let Ok(ip) = input.value.parse::<IpAddr>() {
            reverse_lookup(cancel, &resolver, input, ip, &mut results).await?;
        } else {
            forward_lookup(
                cancel,
                &resolver,
                input,
                &Self::record_types(params),
                &mut results,
            )
            .await?;
        }

        let record_count = results.dns_records.len();
        let mut summary = Finding::candidate(
            format!("{} DNS record(s) for {}", record_count, input.value),
            format!(
                "DNS resolution discovered {} record(s) for {}.",
                record_count, input.value
            ),
            Severity::Info,
            "dns_summary",
            json!({
                "target": input.value,
                "record_count": record_count,
            }),
        );
        summary.target_id = input.target_id;
        results.findings.push(summary);

        Ok(results)
    }
}

async fn forward_lookup(
    cancel: &CancellationToken,
    resolver: &TokioAsyncResolver,
    input: &ScanInput,
    record_types: &[RecordType],
    results: &mut ScanResults,
) -> Result<(), ScanError> {
    for &record_type in record_types {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Cancelled),
            lookup = resolver.lookup(input.value.clone(), record_type) => lookup,
        };

        let lookup = match lookup {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::debug!(
                    target_value = %input.value,
                    record_type = %record_type,
                    error = %e,
                    "DNS lookup returned no records"
                );
                continue;
            }
        };

        for record in lookup.iter() {
            let value = record.to_string();
            let mut dns_record = DnsRecord::candidate(record_type.to_string(), &value);
            dns_record.details = json!({"query": input.value});
            results.dns_records.push(dns_record);

            // A/AAAA answers surface new host targets.
            if matches!(record_type, RecordType::A | RecordType::AAAA) {
                if value.parse::<IpAddr>().is_ok() {
                    let candidate = Target::candidate(
                        TargetKind::Ip,
                        &value,
                        json!({
                            "discovered_from": input.value,
                            "discovery_scan": "dns",
                        }),
                    );
                    let candidate_id = candidate.id;
                    results.new_targets.push(candidate);

                    results.target_relations.push(TargetRelation::candidate(
                        input.target_id,
                        candidate_id,
                        RelationKind::ResolvesTo,
                        json!({"record_type": record_type.to_string()}),
                    ));
                }
            }
        }
    }

    Ok(())
}

async fn reverse_lookup(
    cancel: &CancellationToken,
    resolver: &TokioAsyncResolver,
    input: &ScanInput,
    ip: IpAddr,
    results: &mut ScanResults,
) -> Result<(), ScanError> {
    let lookup = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ScanError::Cancelled),
        lookup = resolver.reverse_lookup(ip) => lookup,
    };

    let lookup = match lookup {
        Ok(lookup) => lookup,
        Err(e) => {
            tracing::debug!(ip = %ip, error = %e, "reverse DNS lookup failed");
            return Ok(());
        }
    };

    for name in lookup.iter() {
        let hostname = name.to_string().trim_end_matches('.').to_string();
        if hostname.is_empty() {
            continue;
        }

        let mut dns_record = DnsRecord::candidate("PTR", &hostname);
        dns_record.details = json!({"query": ip.to_string()});
        results.dns_records.push(dns_record);

        let candidate = Target::candidate(
            TargetKind::Domain,
            &hostname,
            json!({
                "discovered_from": ip.to_string(),
                "discovery_scan": "dns",
            }),
        );
        let candidate_id = candidate.id;
        results.new_targets.push(candidate);

        results.target_relations.push(TargetRelation::candidate(
            candidate_id,
            input.target_id,
            RelationKind::ResolvesTo,
            json!({"record_type": "PTR"}),
        ));
    }

    Ok(())
}
