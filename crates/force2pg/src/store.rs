//! Artifact storage between runs.
//!
//! Every object owns three artifacts, keyed by its main table name: the
//! create script, the lookup values and the documentation page. The create
//! and values artifacts double as the baseline of the next run. Migration
//! scripts are not per object; each run that changes anything writes one.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;
use tracing::debug;

use crate::{Config, Error, Result};

/// The per-object artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// CREATE TABLE script for the main and auxiliary tables
    Create,
    /// INSERTs for every lookup table row
    Values,
    /// Markdown documentation page
    Docs,
}

impl ArtifactKind {
    /// File name of this artifact for `table`.
    pub fn file_name(&self, table: &str) -> String {
        match self {
            ArtifactKind::Create => "create.sql".to_string(),
            ArtifactKind::Values => "values.sql".to_string(),
            ArtifactKind::Docs => format!("{}.md", table),
        }
    }
}

/// Reads and writes artifacts.
pub trait ArtifactStore {
    /// Read an artifact. A missing artifact is `Ok(None)`, not an error.
    fn read(&self, table: &str, kind: ArtifactKind) -> Result<Option<String>>;

    /// Write an artifact, replacing the previous one.
    fn write(&mut self, table: &str, kind: ArtifactKind, text: &str) -> Result<()>;

    /// Write a migration script and return where it went.
    fn write_updates(&mut self, text: &str) -> Result<Utf8PathBuf>;
}

/// Artifacts on disk: `<root>/<table>/<file>`, migration scripts as
/// `<root>/updates_<unix millis>.sql`.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: Utf8PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A store rooted at the configured output directory.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.output_dir.clone())
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Path of an artifact, whether or not it exists.
    pub fn path(&self, table: &str, kind: ArtifactKind) -> Utf8PathBuf {
        self.root.join(table).join(kind.file_name(table))
    }

    fn write_file(path: &Utf8Path, text: &str) -> Result<()> {
        let wrap = |source| Error::WriteArtifact {
            path: path.to_owned(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        fs::write(path, text).map_err(wrap)
    }
}

impl ArtifactStore for DirStore {
    fn read(&self, table: &str, kind: ArtifactKind) -> Result<Option<String>> {
        let path = self.path(table, kind);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%path, "no previous artifact");
                Ok(None)
            }
            Err(source) => Err(Error::ReadArtifact { path, source }),
        }
    }

    fn write(&mut self, table: &str, kind: ArtifactKind, text: &str) -> Result<()> {
        let path = self.path(table, kind);
        Self::write_file(&path, text)?;
        debug!(%path, bytes = text.len(), "wrote artifact");
        Ok(())
    }

    fn write_updates(&mut self, text: &str) -> Result<Utf8PathBuf> {
        let millis = Timestamp::now().as_millisecond();
        let mut path = self.root.join(format!("updates_{}.sql", millis));
        let mut attempt = 1;
        while path.exists() {
            path = self.root.join(format!("updates_{}_{}.sql", millis, attempt));
            attempt += 1;
        }
        Self::write_file(&path, text)?;
        Ok(path)
    }
}

/// Artifacts in memory, for tests and for embedding without a filesystem.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    artifacts: HashMap<(String, ArtifactKind), String>,
    updates: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current text of an artifact.
    pub fn get(&self, table: &str, kind: ArtifactKind) -> Option<&str> {
        self.artifacts
            .get(&(table.to_string(), kind))
            .map(String::as_str)
    }

    /// Every migration script written so far, oldest first.
    pub fn updates(&self) -> &[String] {
        &self.updates
    }
}

impl ArtifactStore for MemoryStore {
    fn read(&self, table: &str, kind: ArtifactKind) -> Result<Option<String>> {
        Ok(self.get(table, kind).map(str::to_string))
    }

    fn write(&mut self, table: &str, kind: ArtifactKind, text: &str) -> Result<()> {
        self.artifacts
            .insert((table.to_string(), kind), text.to_string());
        Ok(())
    }

    fn write_updates(&mut self, text: &str) -> Result<Utf8PathBuf> {
        self.updates.push(text.to_string());
        Ok(Utf8PathBuf::from(format!("updates_{}.sql", self.updates.len())))
    }
}
