//! Validated record updates

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::validation::{self, APEX_HOST};

/// DNS record type managed by access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A record (IPv4)
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Infer the record type from an address literal: `:` means AAAA
    pub fn infer(address: &str) -> Self {
        if address.contains(':') {
            RecordType::Aaaa
        } else {
            RecordType::A
        }
    }

    /// Record type matching a parsed address
    pub fn for_ip(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }

    /// Wire name used by every vendor API
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upsert request for a single `(host, domain, type)` record
///
/// Constructed only through [`RecordUpdate::new`], which rejects malformed
/// input before any backend sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    domain: String,
    host: String,
    address: IpAddr,
    record_type: RecordType,
}

impl RecordUpdate {
    /// Validate and build an update request
    ///
    /// When `record_type` is `None` it is inferred from the literal. An
    /// explicit type that disagrees with the address family is rejected.
    pub fn new(
        domain: &str,
        host: &str,
        address: &str,
        record_type: Option<RecordType>,
    ) -> Result<Self> {
        validation::validate_domain(domain)?;
        validation::validate_host(host)?;
        let ip = validation::parse_address(address)?;

        let inferred = RecordType::infer(address);
        let record_type = record_type.unwrap_or(inferred);
        if record_type != RecordType::for_ip(&ip) {
            return Err(Error::invalid_input(format!(
                "record type {} does not match address {}",
                record_type, address
            )));
        }

        Ok(Self {
            domain: domain.to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            address: ip,
            record_type,
        })
    }

    /// Build from an already-parsed address
    pub fn for_ip(domain: &str, host: &str, address: IpAddr) -> Result<Self> {
        Self::new(domain, host, &address.to_string(), None)
    }

    /// Zone name
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Host token relative to the zone (`@` for the apex)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Address to publish
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Record type
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Fully-qualified record name without trailing dot
    pub fn fqdn(&self) -> String {
        join_name(&self.host, &self.domain)
    }
}

/// Validate `host` and `domain` and return the record's FQDN
pub fn record_name(domain: &str, host: &str) -> Result<String> {
    validation::validate_domain(domain)?;
    validation::validate_host(host)?;
    Ok(join_name(
        &host.to_ascii_lowercase(),
        &domain.to_ascii_lowercase(),
    ))
}

fn join_name(host: &str, domain: &str) -> String {
    if host == APEX_HOST {
        domain.to_string()
    } else {
        format!("{}.{}", host, domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_record_type_from_literal() {
        let v4 = RecordUpdate::new("example.com", "peer0", "198.51.100.4", None).unwrap();
        assert_eq!(v4.record_type(), RecordType::A);

        let v6 = RecordUpdate::new("example.com", "peer0", "2001:db8::4", None).unwrap();
        assert_eq!(v6.record_type(), RecordType::Aaaa);
        assert_eq!(v6.fqdn(), "peer0.example.com");
    }

    #[test]
    fn rejects_mismatched_type() {
        let err = RecordUpdate::new("example.com", "peer0", "198.51.100.4", Some(RecordType::Aaaa))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn apex_and_case() {
        let apex = RecordUpdate::new("Example.COM", "@", "198.51.100.4", None).unwrap();
        assert_eq!(apex.fqdn(), "example.com");
        assert_eq!(apex.host(), "@");
    }

    #[test]
    fn serde_names_match_wire_format() {
        assert_eq!(serde_json::to_string(&RecordType::Aaaa).unwrap(), "\"AAAA\"");
        assert_eq!(serde_json::to_string(&RecordType::A).unwrap(), "\"A\"");
    }
}
