//! The on-disk configuration of a signing node.
//!
//! The file is a YAML document with everything under a top-level `config`
//! key: the node's transport keypair and bind address, the coordinator's
//! identity, and the key material mirrored from memory. The document is
//! always rewritten as a whole; [Config::save] goes through a temp file and
//! a rename so a crash never leaves a half-written config behind.

use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Directories searched for `config.yaml`, in order.
const SEARCH_DIRS: &[&str] = &["/etc/dtcnode", "."];

/// Name of the configuration file inside a search directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// The YAML document root; everything lives under `config`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Document {
    config: Config,
}

/// The node configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// The node's public transport key (Z85).
    pub public_key: String,
    /// The node's private transport key (Z85).
    pub private_key: String,
    /// Host the node binds to.
    pub host: String,
    /// Port the node binds to.
    pub port: u16,
    /// The one coordinator authorized to talk to this node.
    pub coordinator: CoordinatorConfig,
}

/// The coordinator's identity and the key material it has installed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// The coordinator's public transport key (Z85).
    pub public_key: String,
    /// Hostname or IP the coordinator connects from.
    pub host: String,
    /// Installed RSA keys.
    #[serde(default)]
    pub rsa_keys: Vec<KeyEntry>,
    /// Installed ECDSA keys.
    #[serde(default)]
    pub ecdsa_keys: Vec<KeyEntry>,
}

/// One key mirrored to disk.
///
/// The share and meta blobs are the payload encoding wrapped in base64; an
/// entry may carry empty blobs, which loads as a placeholder that cannot
/// sign until the coordinator reinstalls the material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// Key id as assigned by the coordinator.
    pub id: String,
    /// Base64 of the encoded key share.
    pub key_share: String,
    /// Base64 of the encoded key meta.
    pub key_meta_info: String,
}

/// The configuration could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No config file in any of the search directories.
    #[error("no {CONFIG_FILE_NAME} found in any of {SEARCH_DIRS:?}")]
    NotFound,
    /// The file exists but does not parse into a config document.
    #[error(transparent)]
    Parse(#[from] config::ConfigError),
}

/// The configuration could not be persisted.
#[derive(Debug, Error)]
pub enum SaveError {
    /// The document could not be serialized.
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] serde_yaml::Error),
    /// The document could not be written to disk.
    #[error("cannot write config: {0}")]
    Write(#[from] std::io::Error),
}

impl Config {
    /// Load the configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let source = config::File::from(path.to_path_buf()).format(config::FileFormat::Yaml);
        let document: Document =
            config::Config::builder().add_source(source).build()?.try_deserialize()?;
        Ok(document.config)
    }

    /// Locate `config.yaml` in the search directories.
    pub fn locate() -> Result<PathBuf, LoadError> {
        SEARCH_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(CONFIG_FILE_NAME))
            .find(|path| path.is_file())
            .ok_or(LoadError::NotFound)
    }

    /// Persist the whole configuration to `path`, atomically.
    ///
    /// The document is written next to the target and renamed over it, so
    /// readers either see the previous or the new version.
    pub fn save(&self, path: &Path) -> Result<(), SaveError> {
        let rendered = serde_yaml::to_string(&Document { config: self.clone() })?;
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile_in(directory)?;
        temp.file.write_all(rendered.as_bytes())?;
        temp.file.sync_all()?;
        fs::rename(&temp.path, path)?;
        temp.keep();
        Ok(())
    }
}

/// A temp file that removes itself unless kept.
struct TempFile {
    path: PathBuf,
    file: fs::File,
    kept: bool,
}

impl TempFile {
    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.kept {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn tempfile_in(directory: &Path) -> Result<TempFile, std::io::Error> {
    let pid = std::process::id();
    let mut attempt = 0u32;
    loop {
        let path = directory.join(format!(".{CONFIG_FILE_NAME}.{pid}.{attempt}.tmp"));
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok(TempFile { path, file, kept: false }),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => attempt = attempt.wrapping_add(1),
            Err(error) => return Err(error),
        }
    }
}
