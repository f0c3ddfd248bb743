//! Syntactic validation of record inputs
//!
//! Every backend request is built from a [`crate::record::RecordUpdate`], and
//! the only way to obtain one is through these checks. A malformed host token
//! therefore never reaches a vendor request path.

use std::net::IpAddr;

use crate::error::{Error, Result};

/// Maximum total length of a domain name (RFC 1035)
pub const MAX_DOMAIN_LENGTH: usize = 253;

/// Maximum length of a single label (RFC 1035)
pub const MAX_LABEL_LENGTH: usize = 63;

/// Host token that addresses the zone apex
pub const APEX_HOST: &str = "@";

/// Validate a zone/domain name such as `example.com`
///
/// Requires at least two labels and a non-numeric top-level label.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::invalid_input("domain cannot be empty"));
    }

    if domain.len() > MAX_DOMAIN_LENGTH {
        return Err(Error::invalid_input(format!(
            "domain too long: {} chars (max {})",
            domain.len(),
            MAX_DOMAIN_LENGTH
        )));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::invalid_input(format!(
            "domain '{}' must contain at least two labels",
            domain
        )));
    }

    for label in &labels {
        validate_label(label, domain)?;
    }

    if labels
        .last()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(Error::invalid_input(format!(
            "domain '{}' has a numeric top-level label",
            domain
        )));
    }

    Ok(())
}

/// Validate a host token relative to a zone, e.g. `peer3` or `www.lab`
///
/// `@` is accepted for the zone apex.
pub fn validate_host(host: &str) -> Result<()> {
    if host == APEX_HOST {
        return Ok(());
    }

    if host.is_empty() {
        return Err(Error::invalid_input("host cannot be empty"));
    }

    if host.len() > MAX_DOMAIN_LENGTH {
        return Err(Error::invalid_input(format!(
            "host too long: {} chars",
            host.len()
        )));
    }

    for label in host.split('.') {
        validate_label(label, host)?;
    }

    Ok(())
}

/// Parse an address literal destined for an A/AAAA record
///
/// Rejects surrounding whitespace, the unspecified address and multicast.
pub fn parse_address(address: &str) -> Result<IpAddr> {
    let ip: IpAddr = address
        .parse()
        .map_err(|_| Error::invalid_input(format!("'{}' is not an IP address", address)))?;

    if ip.is_unspecified() || ip.is_multicast() {
        return Err(Error::invalid_input(format!(
            "'{}' cannot be published as a host address",
            address
        )));
    }

    Ok(ip)
}

fn validate_label(label: &str, whole: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::invalid_input(format!("'{}' has an empty label", whole)));
    }

    if label.len() > MAX_LABEL_LENGTH {
        return Err(Error::invalid_input(format!(
            "label '{}' too long: {} chars (max {})",
            label,
            label.len(),
            MAX_LABEL_LENGTH
        )));
    }

    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::invalid_input(format!(
            "label '{}' contains invalid characters (allowed: a-z, 0-9, '-')",
            label
        )));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(Error::invalid_input(format!(
            "label '{}' cannot start or end with a hyphen",
            label
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_domains() {
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("lab.example.co.uk").is_ok());
        assert!(validate_domain("xn--bcher-kva.example").is_ok());
    }

    #[test]
    fn rejects_malformed_domains() {
        for bad in [
            "",
            "localhost",
            "example..com",
            "-bad.com",
            "bad-.com",
            "exa mple.com",
            "example.com.",
            "example.com/zones",
            "example.com?name=x",
            "10.0.0.1",
        ] {
            assert!(
                matches!(validate_domain(bad), Err(Error::InvalidInput(_))),
                "expected {:?} to be rejected",
                bad
            );
        }
        assert!(validate_domain(&format!("{}.com", "a".repeat(64))).is_err());
    }

    #[test]
    fn host_tokens() {
        assert!(validate_host("peer0").is_ok());
        assert!(validate_host("www.lab").is_ok());
        assert!(validate_host(APEX_HOST).is_ok());

        for bad in ["", "peer 0", "peer0\r\nX-Injected: 1", "a/b", "../x", "peer_0", "-p"] {
            assert!(validate_host(bad).is_err(), "expected {:?} to be rejected", bad);
        }
    }

    #[test]
    fn address_literals() {
        assert_eq!(parse_address("203.0.113.7").unwrap().to_string(), "203.0.113.7");
        assert!(parse_address("2001:db8::1").unwrap().is_ipv6());

        for bad in ["", " 1.2.3.4", "1.2.3", "256.1.1.1", "0.0.0.0", "::", "ff02::1", "host"] {
            assert!(parse_address(bad).is_err(), "expected {:?} to be rejected", bad);
        }
    }
}
