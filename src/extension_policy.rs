//! X.509v3 extension templates per certificate role
//!
//! Every certificate shape the tool produces is one row of this table:
//!
//! | Role            | Key usage                                          | Extended key usage     | Basic constraints     |
//! |-----------------|----------------------------------------------------|------------------------|-----------------------|
//! | Root CA         | keyCertSign, cRLSign, digitalSignature             | -                      | CA=true               |
//! | Intermediate CA | keyCertSign, cRLSign, digitalSignature             | -                      | CA=true, pathlen=0    |
//! | Node transport  | digitalSignature, nonRepudiation, keyEncipherment  | serverAuth, clientAuth | CA=false, pathlen=0   |
//! | Node HTTP       | digitalSignature, nonRepudiation, keyEncipherment  | serverAuth             | CA=false, pathlen=0   |
//! | Client          | digitalSignature, nonRepudiation, keyEncipherment  | clientAuth             | CA=false, pathlen=0   |
//!
//! Basic constraints, key usage and extended key usage are critical. Authority and
//! subject key identifiers and subject alternative names are non-critical.

use std::fmt;

use openssl::error::ErrorStack;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::X509Extension;

const INTERMEDIATE_CA_PATH_LENGTH: u32 = 0;
const LEAF_PATH_LENGTH: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateRole {
    RootCa,
    IntermediateCa,
    NodeTransport,
    NodeHttp,
    Client,
}

impl CertificateRole {
    /// Suffix used for the default CN when a leaf DN carries none
    pub fn dn_suffix(self) -> Option<&'static str> {
        match self {
            CertificateRole::NodeTransport | CertificateRole::NodeHttp => Some("node"),
            CertificateRole::Client => Some("client"),
            CertificateRole::RootCa | CertificateRole::IntermediateCa => None,
        }
    }
}

impl fmt::Display for CertificateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CertificateRole::RootCa => "root CA certificate",
            CertificateRole::IntermediateCa => "intermediate CA certificate",
            CertificateRole::NodeTransport => "transport certificate",
            CertificateRole::NodeHttp => "HTTP certificate",
            CertificateRole::Client => "client certificate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsageBit {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    KeyCertSign,
    CrlSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    ServerAuth,
    ClientAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraintsSpec {
    pub ca: bool,
    pub path_len: Option<u32>,
}

/// Fixed extension template for one [`CertificateRole`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPolicy {
    pub role: CertificateRole,
    pub key_usage: &'static [KeyUsageBit],
    pub extended_key_usage: &'static [KeyPurpose],
    pub basic_constraints: BasicConstraintsSpec,
    pub include_san: bool,
}

const CA_KEY_USAGE: &[KeyUsageBit] = &[
    KeyUsageBit::KeyCertSign,
    KeyUsageBit::CrlSign,
    KeyUsageBit::DigitalSignature,
];

const LEAF_KEY_USAGE: &[KeyUsageBit] = &[
    KeyUsageBit::DigitalSignature,
    KeyUsageBit::NonRepudiation,
    KeyUsageBit::KeyEncipherment,
];

const LEAF_CONSTRAINTS: BasicConstraintsSpec = BasicConstraintsSpec {
    ca: false,
    path_len: Some(LEAF_PATH_LENGTH),
};

impl ExtensionPolicy {
    pub fn for_role(role: CertificateRole) -> Self {
        match role {
            CertificateRole::RootCa => Self {
                role,
                key_usage: CA_KEY_USAGE,
                extended_key_usage: &[],
                basic_constraints: BasicConstraintsSpec {
                    ca: true,
                    path_len: None,
                },
                include_san: false,
            },
            CertificateRole::IntermediateCa => Self {
                role,
                key_usage: CA_KEY_USAGE,
                extended_key_usage: &[],
                basic_constraints: BasicConstraintsSpec {
                    ca: true,
                    path_len: Some(INTERMEDIATE_CA_PATH_LENGTH),
                },
                include_san: false,
            },
            CertificateRole::NodeTransport => Self {
                role,
                key_usage: LEAF_KEY_USAGE,
                extended_key_usage: &[KeyPurpose::ServerAuth, KeyPurpose::ClientAuth],
                basic_constraints: LEAF_CONSTRAINTS,
                include_san: true,
            },
            CertificateRole::NodeHttp => Self {
                role,
                key_usage: LEAF_KEY_USAGE,
                extended_key_usage: &[KeyPurpose::ServerAuth],
                basic_constraints: LEAF_CONSTRAINTS,
                include_san: true,
            },
            CertificateRole::Client => Self {
                role,
                key_usage: LEAF_KEY_USAGE,
                extended_key_usage: &[KeyPurpose::ClientAuth],
                basic_constraints: LEAF_CONSTRAINTS,
                include_san: false,
            },
        }
    }

    /// Basic constraints, key usage and (if any) extended key usage, all critical,
    /// in the order they are appended to certificates and requests.
    ///
    /// Key identifiers and SANs need a builder context and are added by the
    /// certificate builder.
    pub fn constraint_extensions(&self) -> Result<Vec<X509Extension>, ErrorStack> {
        let mut extensions = Vec::with_capacity(3);

        let mut bc = BasicConstraints::new();
        bc.critical();
        if self.basic_constraints.ca {
            bc.ca();
        }
        if let Some(path_len) = self.basic_constraints.path_len {
            bc.pathlen(path_len);
        }
        extensions.push(bc.build()?);

        let mut ku = KeyUsage::new();
        ku.critical();
        for bit in self.key_usage {
            match bit {
                KeyUsageBit::DigitalSignature => ku.digital_signature(),
                KeyUsageBit::NonRepudiation => ku.non_repudiation(),
                KeyUsageBit::KeyEncipherment => ku.key_encipherment(),
                KeyUsageBit::KeyCertSign => ku.key_cert_sign(),
                KeyUsageBit::CrlSign => ku.crl_sign(),
            };
        }
        extensions.push(ku.build()?);

        if !self.extended_key_usage.is_empty() {
            let mut eku = ExtendedKeyUsage::new();
            eku.critical();
            for purpose in self.extended_key_usage {
                match purpose {
                    KeyPurpose::ServerAuth => eku.server_auth(),
                    KeyPurpose::ClientAuth => eku.client_auth(),
                };
            }
            extensions.push(eku.build()?);
        }

        Ok(extensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_roles_share_key_usage_and_constraints() {
        for role in [
            CertificateRole::NodeTransport,
            CertificateRole::NodeHttp,
            CertificateRole::Client,
        ] {
            let policy = ExtensionPolicy::for_role(role);
            assert_eq!(policy.key_usage, LEAF_KEY_USAGE);
            assert!(!policy.basic_constraints.ca);
            assert_eq!(policy.basic_constraints.path_len, Some(0));
        }
    }

    #[test]
    fn extended_key_usage_per_role() {
        assert_eq!(
            ExtensionPolicy::for_role(CertificateRole::NodeTransport).extended_key_usage,
            &[KeyPurpose::ServerAuth, KeyPurpose::ClientAuth]
        );
        assert_eq!(
            ExtensionPolicy::for_role(CertificateRole::NodeHttp).extended_key_usage,
            &[KeyPurpose::ServerAuth]
        );
        assert_eq!(
            ExtensionPolicy::for_role(CertificateRole::Client).extended_key_usage,
            &[KeyPurpose::ClientAuth]
        );
    }

    #[test]
    fn only_node_roles_carry_san() {
        assert!(ExtensionPolicy::for_role(CertificateRole::NodeTransport).include_san);
        assert!(ExtensionPolicy::for_role(CertificateRole::NodeHttp).include_san);
        assert!(!ExtensionPolicy::for_role(CertificateRole::Client).include_san);
        assert!(!ExtensionPolicy::for_role(CertificateRole::RootCa).include_san);
    }

    #[test]
    fn ca_roles_have_no_extended_key_usage() {
        let root = ExtensionPolicy::for_role(CertificateRole::RootCa);
        assert!(root.basic_constraints.ca);
        assert_eq!(root.basic_constraints.path_len, None);
        assert_eq!(root.constraint_extensions().unwrap().len(), 2);

        let intermediate = ExtensionPolicy::for_role(CertificateRole::IntermediateCa);
        assert_eq!(intermediate.basic_constraints.path_len, Some(0));
    }

    #[test]
    fn leaf_policy_materializes_three_extensions() {
        let policy = ExtensionPolicy::for_role(CertificateRole::Client);
        assert_eq!(policy.constraint_extensions().unwrap().len(), 3);
    }

    #[test]
    fn default_cn_suffix() {
        assert_eq!(CertificateRole::NodeHttp.dn_suffix(), Some("node"));
        assert_eq!(CertificateRole::Client.dn_suffix(), Some("client"));
        assert_eq!(CertificateRole::RootCa.dn_suffix(), None);
    }
}
