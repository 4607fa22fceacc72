//! Run orchestration
//!
//! [`run`] sets up the signing context (create, load, or request-only), walks the
//! configured nodes and clients in order, then renders one config snippet per
//! node from the completed results. A failing entity is recorded in the
//! [`RunReport`] and the run moves on. Only errors that leave no entity
//! processable (bad defaults, unusable CA) end the run early.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::certificate_builder::{subject_dn, BuildMode, SubjectSpec};
use crate::commands::create_ca::handle_create_ca;
use crate::commands::create_client::handle_create_client;
use crate::commands::create_node::handle_create_node;
use crate::commands::EntityOutcome;
use crate::config_snippet::{render, snippet_file_name, SnippetSettings};
use crate::configs::{CaConfig, ToolConfig};
use crate::dn_patterns::{any_matches, parse_all, DnPattern};
use crate::errors::{Result, ToolError};
use crate::extension_policy::CertificateRole;
use crate::output_writer::OutputWriter;
use crate::result_config::{NodeState, ResultConfigAccumulator};
use crate::signing_context::{IssuanceDefaults, SigningContext};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub target_directory: PathBuf,
    pub create_ca: bool,
    pub create_cert: bool,
    pub create_csr: bool,
    pub overwrite: bool,
}

#[derive(Debug)]
pub struct EntityFailure {
    pub entity: String,
    pub error: ToolError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub certificates_generated: usize,
    pub csrs_generated: usize,
    pub password_auto_generated: bool,
    /// Entities left alone because their files already existed
    pub skipped: Vec<String>,
    pub failures: Vec<EntityFailure>,
    pub snippets: Vec<PathBuf>,
    /// Final state of every node written in this run
    pub node_states: Vec<(String, NodeState)>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb<T>(&mut self, entity: &str, outcome: EntityOutcome<T>) -> Option<T> {
        match outcome {
            EntityOutcome::Written(issuance, value) => {
                self.certificates_generated += issuance.certificates;
                self.csrs_generated += issuance.requests;
                self.password_auto_generated |= issuance.password_generated;
                Some(value)
            }
            EntityOutcome::Skipped(existing) => {
                info!(
                    "Skipping {entity}: {} already exists (use --overwrite to replace)",
                    existing.display()
                );
                self.skipped.push(entity.to_string());
                None
            }
        }
    }

    fn fail(&mut self, entity: &str, error: ToolError) {
        warn!("Failed to generate {entity}: {error}");
        self.failures.push(EntityFailure {
            entity: entity.to_string(),
            error,
        });
    }

    pub fn log_summary(&self, target: &Path) {
        info!(
            "{} certificates and {} certificate signing requests generated in {}",
            self.certificates_generated,
            self.csrs_generated,
            target.display()
        );
        if !self.skipped.is_empty() {
            info!("Skipped (files already present): {}", self.skipped.join(", "));
        }
        if self.password_auto_generated {
            warn!(
                "Private key passwords were generated, see the *.readme files in {}",
                target.display()
            );
        }
        for failure in &self.failures {
            error!("{}: {}", failure.entity, failure.error);
        }
    }
}

pub fn run(config: &ToolConfig, options: &RunOptions) -> Result<RunReport> {
    if options.create_csr && (options.create_ca || options.create_cert) {
        return Err(ToolError::configuration(
            "--create-csr cannot be combined with --create-ca or --create-cert",
        ));
    }
    if !(options.create_ca || options.create_cert || options.create_csr) {
        return Err(ToolError::configuration(
            "nothing to do: pass --create-ca, --create-cert or --create-csr",
        ));
    }

    let issuance = IssuanceDefaults::from_config(&config.defaults)?;
    let node_patterns = parse_all(&config.defaults.nodes_dn)?;
    let writer = OutputWriter::new(options.overwrite);
    let target = options.target_directory.as_path();
    let no_ca = CaConfig::default();
    let ca = config.ca.as_ref().unwrap_or(&no_ca);
    let mut report = RunReport::default();

    let (mut context, mode) = if options.create_csr {
        (
            SigningContext::for_requests(target, issuance),
            BuildMode::SigningRequest,
        )
    } else if options.create_ca {
        let (context, outcome) = handle_create_ca(ca, &config.defaults, issuance, target, &writer)?;
        report.absorb("CA", outcome);
        (context, BuildMode::SignedCertificate)
    } else {
        (
            SigningContext::load(ca, issuance, target)?,
            BuildMode::SignedCertificate,
        )
    };

    if !(options.create_cert || options.create_csr) {
        return Ok(report);
    }

    let mut results = ResultConfigAccumulator::new();
    let nodes: Vec<SubjectSpec> = config
        .nodes
        .iter()
        .map(|node| node.subject(&config.defaults))
        .collect();
    for node in &nodes {
        match handle_create_node(&mut context, &writer, node, mode) {
            Ok(outcome) => {
                if let Some(entry) = report.absorb(&node.entity, outcome) {
                    results.record(entry);
                }
            }
            Err(error) => report.fail(&node.entity, error),
        }
    }

    let mut admin_dn = Vec::new();
    for client in &config.clients {
        let subject = client.subject(&config.defaults);
        if client.admin {
            admin_dn.extend(issued_dn(&subject, CertificateRole::Client, mode, "admin_dn"));
        }
        match handle_create_client(&mut context, &writer, &subject, mode) {
            Ok(outcome) => {
                report.absorb(&subject.entity, outcome);
            }
            Err(error) => report.fail(&subject.entity, error),
        }
    }

    context.release_signer();

    let settings = SnippetSettings {
        nodes_dn: nodes_dn(&nodes, &config.defaults.nodes_dn, &node_patterns, mode),
        admin_dn,
        verify_hostnames: context.defaults().verify_hostnames,
        resolve_hostnames: context.defaults().resolve_hostnames,
    };
    let mut snapshot = results.finish();
    for entry in snapshot.entries_mut() {
        let path = target.join(snippet_file_name(&entry.node));
        match writer.write_derived(&path, &render(entry, &settings)) {
            Ok(()) => {
                entry.config_emitted();
                report.snippets.push(path);
            }
            Err(error) => report.fail(&entry.node, error),
        }
        report.node_states.push((entry.node.clone(), entry.state));
    }

    Ok(report)
}

/// Configured patterns, or every node DN when none are configured
fn nodes_dn(
    nodes: &[SubjectSpec],
    configured: &[String],
    patterns: &[DnPattern],
    mode: BuildMode,
) -> Vec<String> {
    let node_dns: Vec<String> = nodes
        .iter()
        .filter_map(|node| issued_dn(node, CertificateRole::NodeTransport, mode, "nodes_dn"))
        .collect();

    if patterns.is_empty() {
        return node_dns;
    }
    for dn in node_dns.iter().filter(|dn| !any_matches(patterns, dn)) {
        warn!("Node DN {dn} does not match any nodes_dn pattern");
    }
    configured.to_vec()
}

/// DN of `subject` as issued, or `None` with a warning when it does not parse
fn issued_dn(subject: &SubjectSpec, role: CertificateRole, mode: BuildMode, list: &str) -> Option<String> {
    match subject_dn(subject, role, mode) {
        Ok(dn) => Some(dn.to_string()),
        Err(error) => {
            warn!("Leaving {} out of {list}: {error}", subject.entity);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::{CaCertificateConfig, NodeConfig};
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> RunOptions {
        RunOptions {
            target_directory: dir.path().to_path_buf(),
            create_ca: true,
            create_cert: true,
            ..RunOptions::default()
        }
    }

    #[test]
    fn csr_mode_conflicts_with_signing() {
        let dir = TempDir::new().unwrap();
        let options = RunOptions {
            create_csr: true,
            ..options(&dir)
        };
        let err = run(&ToolConfig::default(), &options).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn an_action_is_required() {
        let err = run(&ToolConfig::default(), &RunOptions::default()).unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn loading_without_ca_files_fails_the_run() {
        let dir = TempDir::new().unwrap();
        let config = ToolConfig {
            ca: Some(CaConfig {
                root: Some(CaCertificateConfig::default()),
                intermediate: None,
            }),
            ..ToolConfig::default()
        };
        let options = RunOptions {
            create_ca: false,
            ..options(&dir)
        };
        assert!(run(&config, &options).is_err());
    }

    #[test]
    fn bad_node_fails_alone() {
        let dir = TempDir::new().unwrap();
        let config = ToolConfig {
            ca: Some(CaConfig {
                root: Some(CaCertificateConfig {
                    dn: Some("CN=root.ca.example.com".into()),
                    ..Default::default()
                }),
                intermediate: None,
            }),
            nodes: vec![
                NodeConfig {
                    name: Some("bad".into()),
                    dn: "CN=bad.example.com".into(),
                    addresses: vec!["bad..example.com".into()],
                    ..Default::default()
                },
                NodeConfig {
                    name: Some("good".into()),
                    dn: "CN=good.example.com".into(),
                    addresses: vec!["good.example.com".into()],
                    ..Default::default()
                },
            ],
            ..ToolConfig::default()
        };

        let report = run(&config, &options(&dir)).unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity, "bad");
        assert!(!dir.path().join("bad.key").exists());
        assert!(dir.path().join("good.key").exists());
        assert_eq!(report.snippets, [dir.path().join("good_elasticsearch_config_snippet.yml")]);
        assert_eq!(report.node_states, [("good".to_string(), NodeState::ConfigEmitted)]);
        // root + good transport + good http
        assert_eq!(report.certificates_generated, 3);
    }

    #[test]
    fn node_dns_are_listed_when_no_patterns_are_configured() {
        let nodes = vec![SubjectSpec {
            entity: "node1".into(),
            distinguished_name: "OU=Ops,O=Example Com".into(),
            addresses: Vec::new(),
            key_size_bits: 2048,
            validity_days: 30,
            password: crate::passwords::PasswordSpec::None,
        }];
        assert_eq!(
            nodes_dn(&nodes, &[], &[], BuildMode::SignedCertificate),
            ["CN=node1-node,OU=Ops,O=Example Com"]
        );
        let configured = vec!["CN=*.example.com".to_string()];
        let patterns = parse_all(&configured).unwrap();
        assert_eq!(
            nodes_dn(&nodes, &configured, &patterns, BuildMode::SignedCertificate),
            configured
        );
    }

    #[test]
    fn unparsable_dn_is_left_out() {
        let node = |entity: &str, dn: &str| SubjectSpec {
            entity: entity.into(),
            distinguished_name: dn.into(),
            addresses: Vec::new(),
            key_size_bits: 2048,
            validity_days: 30,
            password: crate::passwords::PasswordSpec::None,
        };
        let nodes = vec![node("broken", "not a dn"), node("node1", "CN=node1,O=Example Com")];
        assert_eq!(
            issued_dn(&nodes[0], CertificateRole::NodeTransport, BuildMode::SignedCertificate, "nodes_dn"),
            None
        );
        assert_eq!(
            nodes_dn(&nodes, &[], &[], BuildMode::SignedCertificate),
            ["CN=node1,O=Example Com"]
        );
    }
}
