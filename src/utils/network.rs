use std::net::IpAddr;

use crate::error::ApiError;
use crate::models::TargetKind;

/// Number of host addresses a CIDR block expands to.
pub fn cidr_host_count(cidr: &str) -> Result<u128, ApiError> {
    let network: ipnet::IpNet = cidr
        .parse()
        .map_err(|e| ApiError::Validation(format!("Invalid CIDR: {}", e)))?;

    let host_bits = u32::from(network.max_prefix_len() - network.prefix_len());
    Ok(match host_bits {
        0 => 1,
        bits if bits >= 128 => u128::MAX,
        bits => 1u128 << bits,
    })
}

/// Validate a target value against its declared kind. CIDR blocks are also
/// bounded so a stray `/0` cannot flood the scan pipeline.
pub fn validate_target_value(
    kind: TargetKind,
    value: &str,
    max_cidr_hosts: u32,
) -> Result<(), ApiError> {
    match kind {
        TargetKind::Ip => {
            value
                .parse::<IpAddr>()
                .map_err(|e| ApiError::Validation(format!("Invalid IP address: {}", e)))?;
        }
        TargetKind::Cidr => {
            let hosts = cidr_host_count(value)?;
            if hosts > u128::from(max_cidr_hosts) {
                return Err(ApiError::Validation(format!(
                    "CIDR range {} expands to {} hosts, exceeding limit of {}",
                    value, hosts, max_cidr_hosts
                )));
            }
        }
        TargetKind::Domain => {
            if value.is_empty() || value.contains(char::is_whitespace) || !value.contains('.') {
                return Err(ApiError::Validation(format!(
                    "Invalid domain name: {}",
                    value
                )));
            }
        }
    }
    Ok(())
}
