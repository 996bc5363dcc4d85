//! YAML document store on the local filesystem.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rsw_core::{ConfigError, Document};

use crate::DocumentStore;

#[derive(Debug, Clone)]
pub struct YamlFileStore {
    path: PathBuf,
}

impl YamlFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentStore for YamlFileStore {
    async fn get(&self) -> Result<Option<Document>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read config document: {}", self.path.display())
                });
            }
        };
        let document = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Malformed(format!("{}: {e}", self.path.display())))?;
        Ok(Some(document))
    }

    async fn put(&self, document: &Document) -> Result<()> {
        let yaml =
            serde_yaml::to_string(document).context("Failed to serialize config document")?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, yaml.as_bytes()))
            .await
            .context("Config document writer task failed")?
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write through a temp file in the same directory, then rename over `path`,
/// so readers never observe a half-written document.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .context("Failed to write config document")?;
    tmp.as_file()
        .sync_all()
        .context("Failed to sync config document")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace config document: {}", path.display()))?;
    Ok(())
}
