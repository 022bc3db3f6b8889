//! Filesystem storage for rendered artifacts.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::fs;

/// URL prefix under which finished artifacts are served.
pub const ARTIFACT_ROUTE_PREFIX: &str = "/renders";
const ARTIFACT_EXTENSION: &str = "mp4";

#[derive(Debug, Error)]
pub enum ArtifactStorageError {
    #[error("invalid artifact path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where an in-progress render writes and where it ends up once committed.
///
/// Encoders write to `partial_path`; only a successful commit moves the file
/// to `final_path`, so a failed job never leaves a file at its public location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTarget {
    pub partial_path: PathBuf,
    pub final_path: PathBuf,
    pub public_path: String,
}

#[derive(Debug)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compute the deterministic target for a job. Ids that are not a single
    /// plain path component are rejected.
    pub fn target_for(&self, job_id: &str) -> Result<ArtifactTarget, ArtifactStorageError> {
        if job_id.trim().is_empty() {
            return Err(ArtifactStorageError::InvalidPath);
        }
        let file_name = format!("{job_id}.{ARTIFACT_EXTENSION}");
        let final_path = self.resolve(&file_name)?;
        if final_path.parent() != Some(self.root.as_path()) {
            return Err(ArtifactStorageError::InvalidPath);
        }
        let partial_path = self
            .root
            .join(format!("{job_id}.partial.{ARTIFACT_EXTENSION}"));

        Ok(ArtifactTarget {
            partial_path,
            final_path,
            public_path: format!("{ARTIFACT_ROUTE_PREFIX}/{file_name}"),
        })
    }

    /// Make sure the output directory exists and no stale partial file is left over.
    pub async fn prepare(&self, job_id: &str) -> Result<ArtifactTarget, ArtifactStorageError> {
        let target = self.target_for(job_id)?;
        fs::create_dir_all(&self.root).await?;
        remove_if_present(&target.partial_path).await?;
        Ok(target)
    }

    /// Publish the encoded file at its final location.
    pub async fn commit(&self, target: &ArtifactTarget) -> Result<(), ArtifactStorageError> {
        fs::rename(&target.partial_path, &target.final_path).await?;
        Ok(())
    }

    /// Remove whatever the encoder left behind. Missing files are treated as success.
    pub async fn discard(&self, target: &ArtifactTarget) -> Result<(), ArtifactStorageError> {
        remove_if_present(&target.partial_path).await
    }

    /// Open a stored artifact for streaming.
    pub async fn open(&self, stored_path: &str) -> Result<(fs::File, u64), ArtifactStorageError> {
        let absolute = self.resolve(stored_path)?;
        let file = fs::File::open(&absolute).await?;
        let length = file.metadata().await?.len();
        Ok((file, length))
    }

    /// Resolve a path relative to the storage root, refusing anything that
    /// could escape it.
    fn resolve(&self, stored_path: &str) -> Result<PathBuf, ArtifactStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(ArtifactStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

async fn remove_if_present(path: &Path) -> Result<(), ArtifactStorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ArtifactStorageError::Io(err)),
    }
}
