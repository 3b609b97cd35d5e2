//! Buildpack packages built from a source checkout.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::info;

use crate::error::ScenarioError;

/// A zip of the buildpack source tree at `HEAD`.
///
/// The archive lives in a private temporary directory that is removed when
/// the package is dropped.
#[derive(Debug)]
pub struct BuildpackPackage {
    name: String,
    archive: PathBuf,
    digest: String,
    _dir: TempDir,
}

impl BuildpackPackage {
    /// Run `git archive` in `source_dir` to produce `<name>.zip`.
    pub async fn from_git_head(source_dir: &Path, name: &str) -> Result<Self, ScenarioError> {
        let dir = tempfile::tempdir()
            .map_err(|e| ScenarioError::Setup(format!("failed to create temp dir: {}", e)))?;
        let archive = dir.path().join(format!("{}.zip", name));

        let output = Command::new("git")
            .arg("archive")
            .arg("-o")
            .arg(&archive)
            .arg("HEAD")
            .current_dir(source_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ScenarioError::Setup(format!("failed to run git archive: {}", e)))?;

        if !output.status.success() {
            return Err(ScenarioError::Setup(format!(
                "git archive in {} failed ({}): {}",
                source_dir.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let bytes = tokio::fs::read(&archive).await.map_err(|e| {
            ScenarioError::Setup(format!("failed to read {}: {}", archive.display(), e))
        })?;
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&bytes)));

        info!(
            buildpack = %name,
            archive = %archive.display(),
            bytes = bytes.len(),
            digest = %digest,
            "packaged buildpack"
        );

        Ok(Self {
            name: name.to_string(),
            archive,
            digest,
            _dir: dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// SHA-256 of the archive, `sha256:`-prefixed.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}
