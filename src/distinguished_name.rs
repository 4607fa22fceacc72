//! Distinguished name parsing
//!
//! DNs are configured as RFC 4514 style strings (`CN=node1.example.com,OU=Ops,O=Example Com\, Inc.`).
//! Attributes keep their configured order when materialized into an [`X509Name`].

use std::fmt;

use openssl::x509::{X509Name, X509NameBuilder};

use crate::errors::{Result, ToolError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    attributes: Vec<(String, String)>,
}

impl DistinguishedName {
    /// Parse a comma separated DN. `\` escapes the next character.
    pub fn parse(dn: &str) -> Result<Self> {
        if dn.trim().is_empty() {
            return Err(ToolError::configuration("empty distinguished name"));
        }

        let mut attributes = Vec::new();
        for component in split_unescaped(dn) {
            let (key, value) = component.split_once('=').ok_or_else(|| {
                ToolError::configuration(format!(
                    "invalid distinguished name {dn:?}: component {component:?} has no '='"
                ))
            })?;
            let key = key.trim();
            let value = unescape(value.trim());
            if key.is_empty() || value.is_empty() {
                return Err(ToolError::configuration(format!(
                    "invalid distinguished name {dn:?}: empty attribute in {component:?}"
                )));
            }
            attributes.push((key.to_string(), value));
        }

        Ok(Self { attributes })
    }

    pub fn common_name(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("CN"))
            .map(|(_, value)| value.as_str())
    }

    /// Insert `CN=<entity>-<suffix>` as first RDN when no CN is present
    pub fn with_default_common_name(mut self, entity: &str, suffix: &str) -> Self {
        if self.common_name().is_none() {
            self.attributes
                .insert(0, ("CN".to_string(), format!("{entity}-{suffix}")));
        }
        self
    }

    pub fn to_x509_name(&self) -> Result<X509Name> {
        let mut name_builder = X509NameBuilder::new()
            .map_err(|e| ToolError::configuration(format!("Failed to create name builder: {e}")))?;
        for (key, value) in &self.attributes {
            let field = canonical_field(key);
            name_builder
                .append_entry_by_text(field, value)
                .map_err(|e| {
                    ToolError::configuration(format!(
                        "invalid attribute {key}={value:?} in distinguished name {self}: {e}"
                    ))
                })?;
        }
        Ok(name_builder.build())
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.attributes.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={}", escape(value))?;
        }
        Ok(())
    }
}

/// Maps the LDAP attribute spellings OpenSSL lacks short names for.
fn canonical_field(key: &str) -> &str {
    match key.to_ascii_uppercase().as_str() {
        "E" | "EMAIL" => "emailAddress",
        "S" => "ST",
        _ => key,
    }
}

fn split_unescaped(dn: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut chars = dn.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' | ';' => components.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    components.push(current);
    components
        .into_iter()
        .map(|component| component.trim().to_string())
        .filter(|component| !component.is_empty())
        .collect()
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
