//! Node configuration snippet rendering
//!
//! Each emitted node gets `<node>_elasticsearch_config_snippet.yml` with the
//! Search Guard TLS settings for its files. Paths are plain file names since
//! the snippet is copied into the node's config directory together with them.
//! Values are single-quoted YAML scalars.

use std::fmt::Write;

use crate::result_config::{HttpConfig, NodeResultConfig, PemConfig};

pub const SNIPPET_SUFFIX: &str = "_elasticsearch_config_snippet.yml";
const TRUSTED_CA_PLACEHOLDER: &str = "<add path to trusted ca>";

/// Run-wide values repeated in every snippet
#[derive(Debug, Clone, Default)]
pub struct SnippetSettings {
    pub nodes_dn: Vec<String>,
    pub admin_dn: Vec<String>,
    pub verify_hostnames: bool,
    pub resolve_hostnames: bool,
}

pub fn snippet_file_name(node: &str) -> String {
    format!("{node}{SNIPPET_SUFFIX}")
}

pub fn render(entry: &NodeResultConfig, settings: &SnippetSettings) -> String {
    let mut out = String::new();
    if entry.pending_signature {
        out.push_str(&pending_comment(entry));
    }

    let transport_placeholder = format!("<path to transport certificate for {}>", entry.node);
    push_pem(&mut out, "transport", &entry.transport, &transport_placeholder);
    push_value(
        &mut out,
        "searchguard.ssl.transport.enforce_hostname_verification",
        &settings.verify_hostnames.to_string(),
    );
    push_value(
        &mut out,
        "searchguard.ssl.transport.resolve_hostname",
        &settings.resolve_hostnames.to_string(),
    );

    match &entry.http {
        HttpConfig::Issued(pem) => {
            push_value(&mut out, "searchguard.ssl.http.enabled", "true");
            let placeholder = format!("<path to HTTP certificate for {}>", entry.node);
            push_pem(&mut out, "http", pem, &placeholder);
        }
        HttpConfig::Reused(pem) => {
            push_value(&mut out, "searchguard.ssl.http.enabled", "true");
            push_pem(&mut out, "http", pem, &transport_placeholder);
        }
        HttpConfig::Disabled => push_value(&mut out, "searchguard.ssl.http.enabled", "false"),
    }

    push_list(&mut out, "searchguard.nodes_dn", &settings.nodes_dn);
    push_list(&mut out, "searchguard.authcz.admin_dn", &settings.admin_dn);
    out
}

fn pending_comment(entry: &NodeResultConfig) -> String {
    let requests = entry.request_files.join(" and ");
    format!(
        "# Configuration snippet for node {node}\n\
         # Pass {requests} to your PKI to get the certificates signed, then copy them\n\
         # together with the .key files into the config directory of the node.\n\
         # Replace the certificate and trusted CA placeholders below with the file names you received.\n\
         # Without a PKI, run this tool with --create-ca and --create-cert instead.\n\n",
        node = entry.node,
    )
}

fn push_pem(out: &mut String, layer: &str, pem: &PemConfig, certificate_placeholder: &str) {
    push_quoted(
        out,
        &format!("searchguard.ssl.{layer}.pemcert_filepath"),
        pem.certificate.as_deref().unwrap_or(certificate_placeholder),
    );
    push_quoted(
        out,
        &format!("searchguard.ssl.{layer}.pemkey_filepath"),
        &pem.private_key,
    );
    if let Some(password) = pem.password() {
        push_quoted(
            out,
            &format!("searchguard.ssl.{layer}.pemkey_password"),
            password,
        );
    }
    push_quoted(
        out,
        &format!("searchguard.ssl.{layer}.pemtrustedcas_filepath"),
        pem.trusted_cas.as_deref().unwrap_or(TRUSTED_CA_PLACEHOLDER),
    );
}

fn push_value(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "{key}: {value}");
}

fn push_quoted(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "{key}: {}", quote(value));
}

fn push_list(out: &mut String, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    let _ = writeln!(out, "{key}:");
    for value in values {
        let _ = writeln!(out, "- {}", quote(value));
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passwords::PasswordSpec;
    use crate::result_config::NodeState;

    fn settings() -> SnippetSettings {
        SnippetSettings {
            nodes_dn: vec!["CN=node*.example.com,OU=Ops".into()],
            admin_dn: vec!["CN=admin,O=O'Brien".into()],
            verify_hostnames: true,
            resolve_hostnames: false,
        }
    }

    fn signed_entry(http: fn(&PemConfig) -> HttpConfig) -> NodeResultConfig {
        let password = PasswordSpec::Explicit("pw".into()).materialize(12).unwrap();
        let transport = PemConfig::new(
            Some("node1.pem".into()),
            "node1.key",
            password.as_ref(),
            Some("root-ca.pem".into()),
        );
        let http = http(&transport);
        NodeResultConfig {
            node: "node1".into(),
            state: NodeState::after_http(&http),
            pending_signature: false,
            request_files: Vec::new(),
            http,
            transport,
        }
    }

    #[test]
    fn signed_snippet_lists_files_and_dns() {
        let entry = signed_entry(|_| {
            HttpConfig::Issued(PemConfig::new(
                Some("node1_http.pem".into()),
                "node1_http.key",
                None,
                Some("root-ca.pem".into()),
            ))
        });
        let text = render(&entry, &settings());
        assert_eq!(
            text,
            "searchguard.ssl.transport.pemcert_filepath: 'node1.pem'\n\
             searchguard.ssl.transport.pemkey_filepath: 'node1.key'\n\
             searchguard.ssl.transport.pemkey_password: 'pw'\n\
             searchguard.ssl.transport.pemtrustedcas_filepath: 'root-ca.pem'\n\
             searchguard.ssl.transport.enforce_hostname_verification: true\n\
             searchguard.ssl.transport.resolve_hostname: false\n\
             searchguard.ssl.http.enabled: true\n\
             searchguard.ssl.http.pemcert_filepath: 'node1_http.pem'\n\
             searchguard.ssl.http.pemkey_filepath: 'node1_http.key'\n\
             searchguard.ssl.http.pemtrustedcas_filepath: 'root-ca.pem'\n\
             searchguard.nodes_dn:\n\
             - 'CN=node*.example.com,OU=Ops'\n\
             searchguard.authcz.admin_dn:\n\
             - 'CN=admin,O=O''Brien'\n"
        );
    }

    #[test]
    fn reused_http_repeats_transport_files() {
        let entry = signed_entry(HttpConfig::reusing);
        let text = render(&entry, &SnippetSettings::default());
        assert!(text.contains("searchguard.ssl.http.pemcert_filepath: 'node1.pem'"));
        assert!(text.contains("searchguard.ssl.http.pemkey_filepath: 'node1.key'"));
        assert!(!text.contains("nodes_dn"));
    }

    #[test]
    fn disabled_http_only_sets_flag() {
        let entry = signed_entry(|_| HttpConfig::Disabled);
        let text = render(&entry, &SnippetSettings::default());
        assert!(text.contains("searchguard.ssl.http.enabled: false"));
        assert!(!text.contains("searchguard.ssl.http.pemcert_filepath"));
    }

    #[test]
    fn pending_snippet_uses_placeholders() {
        let entry = NodeResultConfig {
            node: "node1".into(),
            state: NodeState::HttpIssued,
            pending_signature: true,
            request_files: vec!["node1.csr".into(), "node1_http.csr".into()],
            transport: PemConfig::new(None, "node1.key", None, None),
            http: HttpConfig::Issued(PemConfig::new(None, "node1_http.key", None, None)),
        };
        let text = render(&entry, &SnippetSettings::default());
        assert!(text.starts_with("# Configuration snippet for node node1\n"));
        assert!(text.contains("node1.csr and node1_http.csr"));
        assert!(text.contains(
            "searchguard.ssl.transport.pemcert_filepath: '<path to transport certificate for node1>'"
        ));
        assert!(text.contains(
            "searchguard.ssl.http.pemcert_filepath: '<path to HTTP certificate for node1>'"
        ));
        assert!(text.contains("pemtrustedcas_filepath: '<add path to trusted ca>'"));
    }

    #[test]
    fn snippet_file_is_named_after_node() {
        assert_eq!(snippet_file_name("node1"), "node1_elasticsearch_config_snippet.yml");
    }
}
