//! Object storage for job inputs and outputs.
//!
//! Artifacts are addressed by job id: the input of job `X` lives at
//! `inputs/X.json` and its output at `outputs/X.json`.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;

/// Errors raised by an artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("artifact store io error: {0}")]
    Io(#[from] io::Error),
}

/// Content store keyed by job id.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), ArtifactError>;

    async fn get(&self, key: &str) -> Result<Bytes, ArtifactError>;
}

/// Key of the persisted request payload of `job_id`.
#[inline]
pub fn input_key(job_id: &str) -> String {
    format!("inputs/{job_id}.json")
}

/// Key of the persisted result document of `job_id`.
#[inline]
pub fn output_key(job_id: &str) -> String {
    format!("outputs/{job_id}.json")
}

/// Artifact store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    objects: DashMap<String, Bytes>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), ArtifactError> {
        self.objects.insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ArtifactError> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ArtifactError::NotFound(key.to_owned()))
    }
}

/// Artifact store writing one file per key below a root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(ArtifactError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), ArtifactError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write next to the target and rename so readers never see a torn file.
        let staging = path.with_extension("partial");
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ArtifactError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(key.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
