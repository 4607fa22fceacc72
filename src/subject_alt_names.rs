//! Subject alternative name derivation for node certificates
//!
//! A node's configured address tokens are classified into IP and DNS entries.
//! Wildcard host names (`*.nodes.example.com`) are carried as DNS entries
//! verbatim. The transport certificate additionally starts with a registeredID
//! entry for the cluster's node OID ("internal name"); HTTP certificates only
//! carry it when configured to.
//!
//! Ordering follows the configured token order: it defines the byte layout of
//! the SAN extension.

use std::collections::HashSet;
use std::net::IpAddr;

use openssl::error::ErrorStack;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Extension, X509v3Context};

use crate::errors::{Result, ToolError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SanEntry {
    RegisteredId(String),
    Dns(String),
    Ip(IpAddr),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAltNames {
    entries: Vec<SanEntry>,
}

impl SubjectAltNames {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[SanEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the non-critical SAN extension, `None` when there is nothing to carry.
    pub fn to_extension(
        &self,
        context: &X509v3Context,
    ) -> std::result::Result<Option<X509Extension>, ErrorStack> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let mut san = SubjectAlternativeName::new();
        for entry in &self.entries {
            match entry {
                SanEntry::RegisteredId(oid) => san.rid(oid),
                SanEntry::Dns(name) => san.dns(name),
                SanEntry::Ip(ip) => san.ip(&ip.to_string()),
            };
        }
        san.build(context).map(Some)
    }

    fn push(&mut self, entry: SanEntry, seen: &mut HashSet<SanEntry>) {
        if seen.insert(entry.clone()) {
            self.entries.push(entry);
        }
    }
}

/// Inputs for one expansion: which node, which addresses, and whether the
/// internal node OID belongs in the result.
#[derive(Debug, Clone, Copy)]
pub struct SanRequest<'a> {
    pub node: &'a str,
    pub addresses: &'a [String],
    pub node_oid: Option<&'a str>,
    pub include_internal: bool,
}

pub fn expand(request: SanRequest<'_>) -> Result<SubjectAltNames> {
    let mut names = SubjectAltNames::empty();
    let mut seen = HashSet::new();

    if request.include_internal {
        if let Some(oid) = request.node_oid.filter(|oid| !oid.trim().is_empty()) {
            let oid = oid.trim();
            validate_oid(request.node, oid)?;
            names.push(SanEntry::RegisteredId(oid.to_string()), &mut seen);
        }
    }

    for token in request.addresses {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let entry = classify(request.node, token)?;
        names.push(entry, &mut seen);
    }

    Ok(names)
}

fn classify(node: &str, token: &str) -> Result<SanEntry> {
    let literal = token
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(token);
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(SanEntry::Ip(ip));
    }
    validate_dns(node, token)?;
    Ok(SanEntry::Dns(token.to_string()))
}

fn validate_dns(node: &str, token: &str) -> Result<()> {
    let invalid = |reason: &str| -> Result<()> {
        Err(ToolError::configuration(format!(
            "invalid address pattern {token:?} for node {node}: {reason}"
        )))
    };

    if token.len() > 2 && token.starts_with('/') && token.ends_with('/') {
        return invalid("regular expressions cannot be used as certificate names");
    }

    let labels: Vec<&str> = token.trim_end_matches('.').split('.').collect();
    if labels.iter().any(|label| label.is_empty()) {
        return invalid("empty label");
    }
    if let Some(label) = labels.iter().find(|label| {
        !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '*'))
    }) {
        return invalid(&format!("label {label:?} contains characters not allowed in host names"));
    }

    let wildcards = token.matches('*').count();
    if wildcards == 0 {
        return Ok(());
    }
    if wildcards > 1 {
        return invalid("only one wildcard is allowed");
    }
    if !labels[0].contains('*') {
        return invalid("wildcards are only allowed in the leftmost label");
    }
    if labels.len() < 3 {
        return invalid("a wildcard needs at least two labels after it");
    }
    Ok(())
}

fn validate_oid(node: &str, oid: &str) -> Result<()> {
    let well_formed = oid.split('.').count() >= 2
        && oid
            .split('.')
            .all(|arc| !arc.is_empty() && arc.chars().all(|c| c.is_ascii_digit()));
    if well_formed {
        Ok(())
    } else {
        Err(ToolError::configuration(format!(
            "invalid node OID {oid:?} for node {node}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn transport(addrs: &[String]) -> SanRequest<'_> {
        SanRequest {
            node: "node1",
            addresses: addrs,
            node_oid: Some("1.2.3.4.5.5"),
            include_internal: true,
        }
    }

    #[test]
    fn classifies_dns_and_ip_in_input_order() {
        let addrs = addresses(&["node1.example.com", "10.0.0.5", "::1", "node1"]);
        let names = expand(transport(&addrs)).unwrap();
        assert_eq!(
            names.entries(),
            &[
                SanEntry::RegisteredId("1.2.3.4.5.5".into()),
                SanEntry::Dns("node1.example.com".into()),
                SanEntry::Ip("10.0.0.5".parse().unwrap()),
                SanEntry::Ip("::1".parse().unwrap()),
                SanEntry::Dns("node1".into()),
            ]
        );
    }

    #[test]
    fn http_excludes_internal_names() {
        let addrs = addresses(&["node1.example.com"]);
        let names = expand(SanRequest {
            include_internal: false,
            ..transport(&addrs)
        })
        .unwrap();
        assert_eq!(names.entries(), &[SanEntry::Dns("node1.example.com".into())]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let addrs = addresses(&["a.example.com", "10.0.0.1", "a.example.com", "10.0.0.1", "[10.0.0.1]"]);
        let names = expand(SanRequest {
            node_oid: None,
            ..transport(&addrs)
        })
        .unwrap();
        assert_eq!(
            names.entries(),
            &[
                SanEntry::Dns("a.example.com".into()),
                SanEntry::Ip("10.0.0.1".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn wildcard_hosts_are_kept_verbatim() {
        let addrs = addresses(&["*.nodes.example.com", "web*.example.com"]);
        let names = expand(SanRequest {
            node_oid: None,
            ..transport(&addrs)
        })
        .unwrap();
        assert_eq!(
            names.entries(),
            &[
                SanEntry::Dns("*.nodes.example.com".into()),
                SanEntry::Dns("web*.example.com".into()),
            ]
        );
    }

    #[test]
    fn invalid_patterns_name_node_and_token() {
        for bad in ["a.*.example.com", "*.com", "**.example.com", "/node[0-9]+/", "bad host.example.com", "a..b"] {
            let addrs = addresses(&[bad]);
            let err = expand(transport(&addrs)).unwrap_err().to_string();
            assert!(err.contains("node1"), "{err}");
            assert!(err.contains(bad), "{err}");
        }
    }

    #[test]
    fn expansion_is_deterministic() {
        let addrs = addresses(&["b.example.com", "10.1.1.1", "a.example.com", "fe80::1"]);
        let first = expand(transport(&addrs)).unwrap();
        let second = expand(transport(&addrs)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_oid_is_rejected() {
        let addrs = addresses(&["node1.example.com"]);
        let err = expand(SanRequest {
            node_oid: Some("1.2.x"),
            ..transport(&addrs)
        })
        .unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }
}
