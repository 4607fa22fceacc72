//! Output file emission
//!
//! The files of one entity (key, certificate, HTTP key, HTTP certificate, or the
//! CSR variants) form an [`OutputGroup`]. A group is committed all or nothing:
//! every path is checked before the first write, and a failed write puts back
//! whatever the same commit already touched. Files created by the commit are
//! removed, overwritten files and appended notes get their previous contents.
//!
//! Private keys are PKCS#8 PEM, encrypted with AES-256-CBC whenever a password is
//! in effect and written in the clear otherwise. Key files get mode 0600 on Unix.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use openssl::pkey::{PKey, Private};
use openssl::symm::Cipher;

use crate::certificate_builder::CertificateArtifact;
use crate::errors::{BuildScope, Result, ToolError};
use crate::passwords::KeyPassword;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    PrivateKey,
    Public,
}

#[derive(Debug)]
struct PendingFile {
    path: PathBuf,
    contents: Vec<u8>,
    kind: FileKind,
}

/// Text appended to a shared note file such as a readme
#[derive(Debug)]
struct PendingNote {
    path: PathBuf,
    header: String,
    text: String,
}

/// Encoded files of one entity, written together or not at all
#[derive(Debug)]
pub struct OutputGroup {
    entity: String,
    files: Vec<PendingFile>,
    notes: Vec<PendingNote>,
}

impl OutputGroup {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            files: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Private key of `artifact`, encrypted when `password` is given
    pub fn add_private_key(
        &mut self,
        path: impl Into<PathBuf>,
        artifact: &CertificateArtifact,
        password: Option<&KeyPassword>,
    ) -> Result<()> {
        let scope = BuildScope::new(artifact.entity.as_str(), artifact.role);
        let contents = encode_private_key(&scope, &artifact.private_key, password)?;
        self.files.push(PendingFile {
            path: path.into(),
            contents,
            kind: FileKind::PrivateKey,
        });
        Ok(())
    }

    /// Certificate with its chain, or the request, as PEM
    pub fn add_issued(&mut self, path: impl Into<PathBuf>, artifact: &CertificateArtifact) -> Result<()> {
        self.files.push(PendingFile {
            path: path.into(),
            contents: artifact.to_pem()?,
            kind: FileKind::Public,
        });
        Ok(())
    }

    /// Appends `text` to the note at `path` when the group is committed.
    /// `header` is written first if the note does not exist yet.
    pub fn add_note(&mut self, path: impl Into<PathBuf>, header: &str, text: impl Into<String>) {
        self.notes.push(PendingNote {
            path: path.into(),
            header: header.to_string(),
            text: text.into(),
        });
    }

    /// Paths of the files checked against overwriting; notes are append-only
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|file| file.path.as_path())
    }
}

pub fn encode_private_key(
    scope: &BuildScope,
    private_key: &PKey<Private>,
    password: Option<&KeyPassword>,
) -> Result<Vec<u8>> {
    match password {
        Some(password) => private_key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.expose().as_bytes())
            .map_err(scope.err("Failed to convert private key to encrypted PKCS#8")),
        None => private_key
            .private_key_to_pem_pkcs8()
            .map_err(scope.err("Failed to convert private key to PKCS#8")),
    }
}

/// `Password for <key path>: <password>`
pub fn disclosure_line(key_path: &Path, password: &KeyPassword) -> String {
    format!("{}{}\n", disclosure_prefix(key_path), password.expose())
}

/// Password disclosed for `key_path` in the text of a readme, latest entry first
pub fn disclosed_password<'a>(notes: &'a str, key_path: &Path) -> Option<&'a str> {
    let prefix = disclosure_prefix(key_path);
    notes
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
}

fn disclosure_prefix(key_path: &Path) -> String {
    format!("Password for {}: ", key_path.display())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputWriter {
    overwrite: bool,
}

impl OutputWriter {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    /// First path of `paths` that already exists, unless overwriting is allowed
    pub fn would_overwrite<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> Option<&'a Path> {
        if self.overwrite {
            return None;
        }
        paths.into_iter().find(|path| path.exists())
    }

    /// Writes every file of `group`, then appends its notes.
    ///
    /// Returns `Ok(false)` without touching the filesystem when a target already
    /// exists. On a write failure everything touched so far is restored.
    pub fn try_write_group(&self, group: OutputGroup) -> Result<bool> {
        if let Some(existing) = self.would_overwrite(group.paths()) {
            info!(
                "Skipping {}: {} already exists (use --overwrite to replace)",
                group.entity,
                existing.display()
            );
            return Ok(false);
        }

        let mut touched: Vec<Touched<'_>> = Vec::with_capacity(group.files.len() + group.notes.len());
        if let Err(e) = commit(&group, &mut touched) {
            roll_back(&touched);
            return Err(e);
        }

        for file in &group.files {
            info!("Wrote {}", file.path.display());
        }
        for note in &group.notes {
            debug!("Appended to {}", note.path.display());
        }
        Ok(true)
    }

    /// Rewrites a file derived from other outputs, such as a config snippet
    pub fn write_derived(&self, path: &Path, contents: &str) -> Result<()> {
        ensure_parent(path)?;
        fs::write(path, contents).map_err(ToolError::output(path))?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}

/// A path the current commit is about to change, with what it held before
struct Touched<'a> {
    path: &'a Path,
    previous: Option<Vec<u8>>,
}

fn commit<'a>(group: &'a OutputGroup, touched: &mut Vec<Touched<'a>>) -> Result<()> {
    for file in &group.files {
        touched.push(Touched {
            path: &file.path,
            previous: previous_contents(&file.path)?,
        });
        write_file(file)?;
    }
    for note in &group.notes {
        let previous = previous_contents(&note.path)?;
        let is_new = previous.is_none();
        touched.push(Touched {
            path: &note.path,
            previous,
        });
        append_note(note, is_new)?;
    }
    Ok(())
}

fn previous_contents(path: &Path) -> Result<Option<Vec<u8>>> {
    if path.is_file() {
        fs::read(path).map(Some).map_err(ToolError::output(path))
    } else {
        Ok(None)
    }
}

fn roll_back(touched: &[Touched<'_>]) {
    for entry in touched.iter().rev() {
        let restored = match &entry.previous {
            Some(contents) => fs::write(entry.path, contents),
            None => match fs::remove_file(entry.path) {
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = restored {
            warn!("Failed to roll back {}: {}", entry.path.display(), e);
        }
    }
}

fn append_note(note: &PendingNote, is_new: bool) -> Result<()> {
    ensure_parent(&note.path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&note.path)
        .map_err(ToolError::output(&note.path))?;
    if is_new {
        file.write_all(note.header.as_bytes())
            .map_err(ToolError::output(&note.path))?;
    }
    file.write_all(note.text.as_bytes())
        .map_err(ToolError::output(&note.path))
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(ToolError::output(parent))
        }
        _ => Ok(()),
    }
}

fn write_file(file: &PendingFile) -> Result<()> {
    ensure_parent(&file.path)?;
    fs::write(&file.path, &file.contents).map_err(ToolError::output(&file.path))?;

    // Set restrictive permissions (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if file.kind == FileKind::PrivateKey {
            fs::set_permissions(&file.path, fs::Permissions::from_mode(0o600))
                .map_err(ToolError::output(&file.path))?;
        }
    }

    Ok(())
}
