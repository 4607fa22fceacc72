//! Certificate and CSR generation
//!
//! One builder serves every certificate shape. The [`ExtensionPolicy`] picks the
//! constraint extensions, the [`BuildMode`] picks between a certificate signed
//! by the [`SigningContext`] and a PKCS#10 request signed by the fresh key.
//!
//! Extension order in signed leaves:
//! ```text
//! authorityKeyIdentifier, subjectKeyIdentifier, basicConstraints (critical),
//! keyUsage (critical), extendedKeyUsage (critical), subjectAltName
//! ```
//! Requests carry the same set minus the key identifiers in their
//! extensionRequest attribute. Self-signed roots put the subject key
//! identifier first so the authority key identifier can refer to it.

use std::fmt;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::{AuthorityKeyIdentifier, SubjectKeyIdentifier};
use openssl::x509::{X509Builder, X509Extension, X509NameRef, X509Ref, X509Req, X509ReqRef, X509};

use crate::distinguished_name::DistinguishedName;
use crate::errors::{BuildScope, Result, ToolError};
use crate::extension_policy::{CertificateRole, ExtensionPolicy};
use crate::passwords::PasswordSpec;
use crate::signing_context::{Signer, SigningContext};
use crate::subject_alt_names::SubjectAltNames;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const X509_REQ_VERSION_1: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    SignedCertificate,
    SigningRequest,
}

/// What to issue for one node, client or CA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSpec {
    /// Entity name, also the file name base
    pub entity: String,
    pub distinguished_name: String,
    pub addresses: Vec<String>,
    pub key_size_bits: u32,
    pub validity_days: u32,
    pub password: PasswordSpec,
}

pub enum Issued {
    Certificate(X509),
    Request(X509Req),
}

// X509Req has no Debug of its own
impl fmt::Debug for Issued {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issued::Certificate(certificate) => f.debug_tuple("Certificate").field(certificate).finish(),
            Issued::Request(request) => f
                .debug_struct("Request")
                .field("subject", &request.subject_name())
                .finish_non_exhaustive(),
        }
    }
}

/// Freshly generated key plus the certificate or request issued for it
#[derive(Debug)]
pub struct CertificateArtifact {
    pub entity: String,
    pub role: CertificateRole,
    pub mode: BuildMode,
    pub private_key: PKey<Private>,
    pub issued: Issued,
    /// Allocated only for signed certificates
    pub serial: Option<u64>,
    /// Certificates following the issued one in its `.pem` file
    pub chain: Vec<X509>,
}

impl CertificateArtifact {
    pub fn certificate(&self) -> Option<&X509> {
        match &self.issued {
            Issued::Certificate(certificate) => Some(certificate),
            Issued::Request(_) => None,
        }
    }

    pub fn request(&self) -> Option<&X509Req> {
        match &self.issued {
            Issued::Request(request) => Some(request),
            Issued::Certificate(_) => None,
        }
    }

    /// PEM text of the issued object: certificate followed by its chain, or the request
    pub fn to_pem(&self) -> Result<Vec<u8>> {
        let scope = BuildScope::new(self.entity.as_str(), self.role);
        match &self.issued {
            Issued::Certificate(certificate) => {
                let mut pem = certificate
                    .to_pem()
                    .map_err(scope.err("Failed to encode certificate"))?;
                for chained in &self.chain {
                    pem.extend(
                        chained
                            .to_pem()
                            .map_err(scope.err("Failed to encode chain certificate"))?,
                    );
                }
                Ok(pem)
            }
            Issued::Request(request) => request
                .to_pem()
                .map_err(scope.err("Failed to encode certificate request")),
        }
    }

    /// Turns the artifact into the signer of later certificates
    pub fn into_signer(self) -> Result<Signer> {
        match self.issued {
            Issued::Certificate(certificate) => Signer::new(certificate, self.private_key),
            Issued::Request(_) => Err(ToolError::configuration(format!(
                "a certificate request for {} cannot sign certificates",
                self.entity
            ))),
        }
    }
}

/// Subject DN as it appears in the issued object
pub fn subject_dn(
    subject: &SubjectSpec,
    role: CertificateRole,
    mode: BuildMode,
) -> Result<DistinguishedName> {
    let dn = DistinguishedName::parse(&subject.distinguished_name)?;
    match (mode, role.dn_suffix()) {
        (BuildMode::SignedCertificate, Some(suffix)) => {
            Ok(dn.with_default_common_name(&subject.entity, suffix))
        }
        _ => Ok(dn),
    }
}

/// Issues a certificate or request for `subject` shaped by `policy`.
///
/// Signed certificates need a signer in `context` and take the next serial.
/// In signed mode a leaf DN without CN gets `CN=<entity>-<suffix>`; requests
/// keep the configured DN verbatim.
pub fn issue(
    context: &mut SigningContext,
    subject: &SubjectSpec,
    policy: &ExtensionPolicy,
    sans: &SubjectAltNames,
    mode: BuildMode,
) -> Result<CertificateArtifact> {
    let scope = BuildScope::new(subject.entity.as_str(), policy.role);
    let subject_name = subject_dn(subject, policy.role, mode)?.to_x509_name()?;

    let private_key = generate_key(&scope, subject.key_size_bits)?;
    let digest = context.defaults().signature_algorithm.digest();

    let (issued, serial, chain) = match mode {
        BuildMode::SignedCertificate => {
            let serial = context.next_serial();
            let signer = context.signer().ok_or_else(|| {
                ToolError::configuration(format!(
                    "no signing CA is available to sign the {} for {}",
                    policy.role,
                    scope.entity()
                ))
            })?;
            let certificate = build_certificate(
                &scope,
                CertificateParts {
                    subject_name: &subject_name,
                    private_key: &private_key,
                    issuer: Some(signer),
                    policy,
                    sans,
                    validity_days: subject.validity_days,
                    serial,
                    digest,
                },
            )?;
            (
                Issued::Certificate(certificate),
                Some(serial),
                vec![signer.certificate().clone()],
            )
        }
        BuildMode::SigningRequest => {
            let request = build_request(&scope, &subject_name, &private_key, policy, sans, digest)?;
            (Issued::Request(request), None, Vec::new())
        }
    };

    Ok(CertificateArtifact {
        entity: subject.entity.clone(),
        role: policy.role,
        mode,
        private_key,
        issued,
        serial,
        chain,
    })
}

/// Self-signed root CA certificate, DN used verbatim
pub fn issue_root(context: &mut SigningContext, subject: &SubjectSpec) -> Result<CertificateArtifact> {
    let policy = ExtensionPolicy::for_role(CertificateRole::RootCa);
    let scope = BuildScope::new(subject.entity.as_str(), policy.role);
    let subject_name = DistinguishedName::parse(&subject.distinguished_name)?.to_x509_name()?;
    let private_key = generate_key(&scope, subject.key_size_bits)?;
    let serial = context.next_serial();

    let certificate = build_certificate(
        &scope,
        CertificateParts {
            subject_name: &subject_name,
            private_key: &private_key,
            issuer: None,
            policy: &policy,
            sans: &SubjectAltNames::empty(),
            validity_days: subject.validity_days,
            serial,
            digest: context.defaults().signature_algorithm.digest(),
        },
    )?;

    Ok(CertificateArtifact {
        entity: subject.entity.clone(),
        role: policy.role,
        mode: BuildMode::SignedCertificate,
        private_key,
        issued: Issued::Certificate(certificate),
        serial: Some(serial),
        chain: Vec::new(),
    })
}

/// Issues a certificate for a PKCS#10 request.
///
/// The request's self-signature must verify. Subject, public key and requested
/// extensions are copied; key identifiers and the serial come from `context`.
pub fn sign_request(
    context: &mut SigningContext,
    entity: &str,
    role: CertificateRole,
    request: &X509ReqRef,
    validity_days: u32,
) -> Result<X509> {
    let scope = BuildScope::new(entity, role);

    let public_key = request
        .public_key()
        .map_err(scope.err("Failed to read request public key"))?;
    let verified = request
        .verify(&public_key)
        .map_err(scope.err("Failed to verify request signature"))?;
    if !verified {
        return Err(ToolError::configuration(format!(
            "certificate request for {entity} carries an invalid signature"
        )));
    }
    let requested = request
        .extensions()
        .map_err(scope.err("Failed to read requested extensions"))?;

    let serial = context.next_serial();
    let digest = context.defaults().signature_algorithm.digest();
    let signer = context.signer().ok_or_else(|| {
        ToolError::configuration(format!(
            "no signing CA is available to sign the request for {entity}"
        ))
    })?;

    let mut builder = certificate_skeleton(
        &scope,
        request.subject_name(),
        signer.certificate().subject_name(),
        &public_key,
        validity_days,
        serial,
    )?;
    append_key_identifiers(&scope, &mut builder, Some(signer.certificate()))?;
    for extension in requested {
        builder
            .append_extension(extension)
            .map_err(scope.err("Failed to add requested extension"))?;
    }
    builder
        .sign(signer.private_key(), digest)
        .map_err(scope.err("Failed to sign certificate"))?;

    Ok(builder.build())
}

fn generate_key(scope: &BuildScope, bits: u32) -> Result<PKey<Private>> {
    let rsa = Rsa::generate(bits).map_err(scope.err("Failed to generate RSA keypair"))?;
    PKey::from_rsa(rsa).map_err(scope.err("Failed to create private key"))
}

struct CertificateParts<'a> {
    subject_name: &'a X509NameRef,
    private_key: &'a PKey<Private>,
    /// `None` for a self-signed certificate
    issuer: Option<&'a Signer>,
    policy: &'a ExtensionPolicy,
    sans: &'a SubjectAltNames,
    validity_days: u32,
    serial: u64,
    digest: MessageDigest,
}

fn build_certificate(scope: &BuildScope, parts: CertificateParts<'_>) -> Result<X509> {
    let issuer_name = match parts.issuer {
        Some(signer) => signer.certificate().subject_name(),
        None => parts.subject_name,
    };
    let mut builder = certificate_skeleton(
        scope,
        parts.subject_name,
        issuer_name,
        parts.private_key,
        parts.validity_days,
        parts.serial,
    )?;

    let issuer_certificate = parts.issuer.map(|signer| &**signer.certificate());
    append_key_identifiers(scope, &mut builder, issuer_certificate)?;

    for extension in parts
        .policy
        .constraint_extensions()
        .map_err(scope.err("Failed to build constraint extensions"))?
    {
        builder
            .append_extension(extension)
            .map_err(scope.err("Failed to add constraint extension"))?;
    }

    if parts.policy.include_san {
        let san = parts
            .sans
            .to_extension(&builder.x509v3_context(issuer_certificate, None))
            .map_err(scope.err("Failed to build SubjectAlternativeName"))?;
        if let Some(san) = san {
            builder
                .append_extension(san)
                .map_err(scope.err("Failed to add SubjectAlternativeName"))?;
        }
    }

    let signing_key = match parts.issuer {
        Some(signer) => signer.private_key(),
        None => parts.private_key,
    };
    builder
        .sign(signing_key, parts.digest)
        .map_err(scope.err("Failed to sign certificate"))?;

    Ok(builder.build())
}

/// Version, serial, names, validity window and public key
fn certificate_skeleton<T: HasPublic>(
    scope: &BuildScope,
    subject_name: &X509NameRef,
    issuer_name: &X509NameRef,
    public_key: &PKeyRef<T>,
    validity_days: u32,
    serial: u64,
) -> Result<X509Builder> {
    let mut builder = X509::builder().map_err(scope.err("Failed to create X509 builder"))?;

    builder
        .set_version(X509_VERSION_3)
        .map_err(scope.err("Failed to set version"))?;

    let serial = BigNum::from_slice(&serial.to_be_bytes())
        .and_then(|serial| serial.to_asn1_integer())
        .map_err(scope.err("Failed to encode serial number"))?;
    builder
        .set_serial_number(&serial)
        .map_err(scope.err("Failed to set serial number"))?;

    builder
        .set_subject_name(subject_name)
        .map_err(scope.err("Failed to set subject"))?;
    builder
        .set_issuer_name(issuer_name)
        .map_err(scope.err("Failed to set issuer"))?;

    let not_before = Asn1Time::days_from_now(0).map_err(scope.err("Failed to create not_before"))?;
    builder
        .set_not_before(&not_before)
        .map_err(scope.err("Failed to set not_before"))?;
    let not_after =
        Asn1Time::days_from_now(validity_days).map_err(scope.err("Failed to create not_after"))?;
    builder
        .set_not_after(&not_after)
        .map_err(scope.err("Failed to set not_after"))?;

    builder
        .set_pubkey(public_key)
        .map_err(scope.err("Failed to set public key"))?;

    Ok(builder)
}

fn append_key_identifiers(
    scope: &BuildScope,
    builder: &mut X509Builder,
    issuer: Option<&X509Ref>,
) -> Result<()> {
    let subject_key_id = |builder: &X509Builder| -> std::result::Result<X509Extension, ErrorStack> {
        SubjectKeyIdentifier::new().build(&builder.x509v3_context(issuer, None))
    };
    let authority_key_id = |builder: &X509Builder| -> std::result::Result<X509Extension, ErrorStack> {
        AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&builder.x509v3_context(issuer, None))
    };

    if issuer.is_some() {
        let aki = authority_key_id(&*builder).map_err(scope.err("Failed to build AuthorityKeyIdentifier"))?;
        builder
            .append_extension(aki)
            .map_err(scope.err("Failed to add AuthorityKeyIdentifier"))?;
        let ski = subject_key_id(&*builder).map_err(scope.err("Failed to build SubjectKeyIdentifier"))?;
        builder
            .append_extension(ski)
            .map_err(scope.err("Failed to add SubjectKeyIdentifier"))?;
    } else {
        let ski = subject_key_id(&*builder).map_err(scope.err("Failed to build SubjectKeyIdentifier"))?;
        builder
            .append_extension(ski)
            .map_err(scope.err("Failed to add SubjectKeyIdentifier"))?;
        let aki = authority_key_id(&*builder).map_err(scope.err("Failed to build AuthorityKeyIdentifier"))?;
        builder
            .append_extension(aki)
            .map_err(scope.err("Failed to add AuthorityKeyIdentifier"))?;
    }
    Ok(())
}

fn build_request(
    scope: &BuildScope,
    subject_name: &X509NameRef,
    private_key: &PKey<Private>,
    policy: &ExtensionPolicy,
    sans: &SubjectAltNames,
    digest: MessageDigest,
) -> Result<X509Req> {
    let mut builder = X509Req::builder().map_err(scope.err("Failed to create request builder"))?;
    builder
        .set_version(X509_REQ_VERSION_1)
        .map_err(scope.err("Failed to set request version"))?;
    builder
        .set_subject_name(subject_name)
        .map_err(scope.err("Failed to set subject"))?;
    builder
        .set_pubkey(private_key)
        .map_err(scope.err("Failed to set public key"))?;

    let mut extensions = Stack::new().map_err(scope.err("Failed to create extension stack"))?;
    for extension in policy
        .constraint_extensions()
        .map_err(scope.err("Failed to build constraint extensions"))?
    {
        extensions
            .push(extension)
            .map_err(scope.err("Failed to add constraint extension"))?;
    }
    if policy.include_san {
        let san = sans
            .to_extension(&builder.x509v3_context(None))
            .map_err(scope.err("Failed to build SubjectAlternativeName"))?;
        if let Some(san) = san {
            extensions
                .push(san)
                .map_err(scope.err("Failed to add SubjectAlternativeName"))?;
        }
    }
    builder
        .add_extensions(&extensions)
        .map_err(scope.err("Failed to add requested extensions"))?;

    builder
        .sign(private_key, digest)
        .map_err(scope.err("Failed to sign certificate request"))?;

    Ok(builder.build())
}
