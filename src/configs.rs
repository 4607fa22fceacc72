use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::certificate_builder::SubjectSpec;
use crate::distinguished_name::DistinguishedName;
use crate::passwords::PasswordSpec;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ToolConfig {
    pub ca: Option<CaConfig>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CaConfig {
    pub root: Option<CaCertificateConfig>,
    pub intermediate: Option<CaCertificateConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CaCertificateConfig {
    pub dn: Option<String>,
    pub keysize: Option<u32>,
    pub validity_days: Option<u32>,
    pub pk_password: Option<String>,
    /// File base for the CA's `.key`/`.pem` pair; any extension is replaced
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Defaults {
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,
    #[serde(default = "default_keysize")]
    pub keysize: u32,
    #[serde(default)]
    pub pk_password: Option<String>,
    #[serde(default = "default_generated_password_length")]
    pub generated_password_length: usize,
    #[serde(default = "default_true")]
    pub http_enabled: bool,
    #[serde(default)]
    pub reuse_transport_certificates_for_http: bool,
    #[serde(default)]
    pub http_include_internal_names: bool,
    #[serde(default = "default_signature_algorithm")]
    pub signature_algorithm: String,
    #[serde(default = "default_node_oid")]
    pub node_oid: Option<String>,
    #[serde(default)]
    pub nodes_dn: Vec<String>,
    #[serde(default)]
    pub verify_hostnames: bool,
    #[serde(default)]
    pub resolve_hostnames: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            validity_days: default_validity_days(),
            keysize: default_keysize(),
            pk_password: None,
            generated_password_length: default_generated_password_length(),
            http_enabled: true,
            reuse_transport_certificates_for_http: false,
            http_include_internal_names: false,
            signature_algorithm: default_signature_algorithm(),
            node_oid: default_node_oid(),
            nodes_dn: Vec::new(),
            verify_hostnames: false,
            resolve_hostnames: false,
        }
    }
}

fn default_validity_days() -> u32 {
    730 // 2 years
}

pub(crate) fn default_ca_validity_days() -> u32 {
    3650 // 10 years
}

fn default_keysize() -> u32 {
    2048
}

fn default_generated_password_length() -> usize {
    12
}

fn default_true() -> bool {
    true
}

fn default_signature_algorithm() -> String {
    "SHA256withRSA".to_string()
}

fn default_node_oid() -> Option<String> {
    Some("1.2.3.4.5.5".to_string())
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NodeConfig {
    pub name: Option<String>,
    pub dn: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    pub keysize: Option<u32>,
    pub validity_days: Option<u32>,
    pub pk_password: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClientConfig {
    pub name: Option<String>,
    pub dn: String,
    pub keysize: Option<u32>,
    pub validity_days: Option<u32>,
    pub pk_password: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

impl NodeConfig {
    pub fn subject(&self, defaults: &Defaults) -> SubjectSpec {
        subject_spec(
            self.name.as_deref(),
            &self.addresses,
            &self.dn,
            self.keysize,
            self.validity_days,
            self.pk_password.as_deref(),
            defaults,
            "node",
        )
    }
}

impl ClientConfig {
    pub fn subject(&self, defaults: &Defaults) -> SubjectSpec {
        subject_spec(
            self.name.as_deref(),
            &[],
            &self.dn,
            self.keysize,
            self.validity_days,
            self.pk_password.as_deref(),
            defaults,
            "client",
        )
    }
}

impl CaCertificateConfig {
    pub fn subject(&self, defaults: &Defaults, file_base: &str) -> SubjectSpec {
        SubjectSpec {
            entity: file_base.to_string(),
            distinguished_name: self.dn.clone().unwrap_or_default(),
            addresses: Vec::new(),
            key_size_bits: self.keysize.unwrap_or(defaults.keysize),
            validity_days: self.validity_days.unwrap_or_else(default_ca_validity_days),
            password: PasswordSpec::resolve(self.pk_password.as_deref(), None),
        }
    }

    /// `<file base>.<extension>` under `target`, the default base when none is configured
    pub fn configured_file(&self, target: &Path, default_base: &str, extension: &str) -> PathBuf {
        match &self.file {
            Some(file) => target.join(file.with_extension(extension)),
            None => target.join(format!("{default_base}.{extension}")),
        }
    }
}

fn subject_spec(
    name: Option<&str>,
    addresses: &[String],
    dn: &str,
    keysize: Option<u32>,
    validity_days: Option<u32>,
    pk_password: Option<&str>,
    defaults: &Defaults,
    fallback: &str,
) -> SubjectSpec {
    SubjectSpec {
        entity: file_name_base(name, dn, fallback),
        distinguished_name: dn.to_string(),
        addresses: addresses.to_vec(),
        key_size_bits: keysize.unwrap_or(defaults.keysize),
        validity_days: validity_days.unwrap_or(defaults.validity_days),
        password: PasswordSpec::resolve(pk_password, defaults.pk_password.as_deref()),
    }
}

/// Explicit name, else the DN's CN with characters unsafe in file names replaced
fn file_name_base(name: Option<&str>, dn: &str, fallback: &str) -> String {
    if let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) {
        return name.to_string();
    }
    let common_name = DistinguishedName::parse(dn)
        .ok()
        .and_then(|dn| dn.common_name().map(str::to_string));
    match common_name {
        Some(cn) => cn
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
        None => fallback.to_string(),
    }
}

impl ToolConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: ToolConfig = toml::from_str(&config_str)
            .context(format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[ca.root]
dn = "CN=root.ca.example.com,OU=CA,O=Example Com\\, Inc.,DC=example,DC=com"
keysize = 4096
pk_password = "auto"

[ca.intermediate]
dn = "CN=signing.ca.example.com,OU=CA,O=Example Com\\, Inc.,DC=example,DC=com"
file = "my-signing-ca.pem"

[defaults]
validity_days = 365
pk_password = "auto"
reuse_transport_certificates_for_http = true
nodes_dn = ["CN=*.example.com,OU=Ops,O=Example Com\\, Inc.,DC=example,DC=com"]

[[nodes]]
name = "node1"
dn = "CN=node1.example.com,OU=Ops,O=Example Com\\, Inc.,DC=example,DC=com"
addresses = ["node1.example.com", "10.0.0.5"]

[[nodes]]
dn = "CN=node 2,OU=Ops"
pk_password = "secret"
validity_days = 10

[[clients]]
name = "admin"
dn = "CN=admin,OU=Ops"
admin = true
"#;

    #[test]
    fn parses_full_config() {
        let config: ToolConfig = toml::from_str(SAMPLE).unwrap();
        let ca = config.ca.as_ref().unwrap();
        assert_eq!(ca.root.as_ref().unwrap().keysize, Some(4096));
        assert!(config.defaults.http_enabled);
        assert!(config.defaults.reuse_transport_certificates_for_http);
        assert_eq!(config.defaults.signature_algorithm, "SHA256withRSA");
        assert_eq!(config.defaults.node_oid.as_deref(), Some("1.2.3.4.5.5"));
        assert_eq!(config.nodes.len(), 2);
        assert!(config.clients[0].admin);
    }

    #[test]
    fn entity_subjects_apply_defaults() {
        let config: ToolConfig = toml::from_str(SAMPLE).unwrap();
        let node1 = config.nodes[0].subject(&config.defaults);
        assert_eq!(node1.entity, "node1");
        assert_eq!(node1.addresses, ["node1.example.com", "10.0.0.5"]);
        assert_eq!(node1.validity_days, 365);
        assert_eq!(node1.key_size_bits, 2048);
        assert_eq!(node1.password, PasswordSpec::AutoGenerate);

        let node2 = config.nodes[1].subject(&config.defaults);
        assert_eq!(node2.entity, "node_2");
        assert_eq!(node2.validity_days, 10);
        assert_eq!(node2.password, PasswordSpec::Explicit("secret".into()));
    }

    #[test]
    fn ca_files_follow_configured_base() {
        let config: ToolConfig = toml::from_str(SAMPLE).unwrap();
        let ca = config.ca.unwrap();
        let target = Path::new("/out");
        assert_eq!(
            ca.intermediate.as_ref().unwrap().configured_file(target, "signing-ca", "key"),
            PathBuf::from("/out/my-signing-ca.key")
        );
        assert_eq!(
            ca.root.as_ref().unwrap().configured_file(target, "root-ca", "pem"),
            PathBuf::from("/out/root-ca.pem")
        );
        let root = ca.root.unwrap().subject(&config.defaults, "root-ca");
        assert_eq!(root.validity_days, 3650);
        assert_eq!(root.key_size_bits, 4096);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: ToolConfig = toml::from_str("").unwrap();
        assert!(config.ca.is_none());
        assert_eq!(config.defaults.validity_days, 730);
        assert!(config.nodes.is_empty());
    }
}
