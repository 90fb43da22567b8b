//! Ownership of the output directory and its published frame catalog.
//!
//! Extraction jobs never write into the output directory directly. Each job
//! extracts into its own scratch directory under `<work_dir>/jobs`, and only a
//! successful result is published: under the store's write lock the old
//! frames are purged, the new ones moved in, and the catalog rescanned.
//! Readers hold the read lock while touching frame files, so a listing, a
//! fetch, or an archive always sees exactly one generation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use crate::archive::{self, ArchiveBundle, ArchiveRequest};
use crate::catalog::{FrameCatalog, FrameRecord};
use crate::error::CoreError;
use crate::extraction::{purge_frames, FrameExtractor};
use crate::staging::{StagedVideo, Stager};

const JOBS_SUBDIR: &str = "jobs";
const UPLOADS_SUBDIR: &str = "uploads";

/// Filesystem layout and limits for a [`FrameStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Holds only current-generation frame images.
    pub output_dir: PathBuf,
    /// Holds staged uploads and per-job scratch directories.
    pub work_dir: PathBuf,
    /// Upload size cap in bytes (`None` for unlimited).
    pub max_upload_bytes: Option<u64>,
}

/// The published catalog together with its generation number.
///
/// Generation 0 is whatever was on disk at startup; every successful
/// publication increments it.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub generation: u64,
    pub catalog: Arc<FrameCatalog>,
}

/// Serializable view of a snapshot for listings.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogListing {
    pub generation: u64,
    pub frames: Vec<FrameRecord>,
}

impl From<&CatalogSnapshot> for CatalogListing {
    fn from(snapshot: &CatalogSnapshot) -> Self {
        Self {
            generation: snapshot.generation,
            frames: snapshot.catalog.list().to_vec(),
        }
    }
}

/// The extraction pipeline plus the authoritative catalog it feeds.
pub struct FrameStore {
    output_dir: PathBuf,
    jobs_dir: PathBuf,
    stager: Stager,
    extractor: Arc<dyn FrameExtractor>,
    current: Arc<RwLock<CatalogSnapshot>>,
}

impl FrameStore {
    /// Prepare the directories and load the catalog already on disk.
    ///
    /// Leftover uploads and scratch directories from an earlier process are
    /// deleted; they never belong to a live job.
    pub async fn open(
        config: StoreConfig,
        extractor: Arc<dyn FrameExtractor>,
    ) -> Result<Self, CoreError> {
        let jobs_dir = config.work_dir.join(JOBS_SUBDIR);
        let uploads_dir = config.work_dir.join(UPLOADS_SUBDIR);

        for dir in [&jobs_dir, &uploads_dir] {
            remove_dir_if_exists(dir).await?;
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::create_dir_all(&config.output_dir).await?;

        let catalog = FrameCatalog::scan(&config.output_dir).await?;
        tracing::info!(
            output_dir = %config.output_dir.display(),
            frames = catalog.len(),
            "Frame store opened"
        );

        Ok(Self {
            output_dir: config.output_dir,
            jobs_dir,
            stager: Stager::new(uploads_dir, config.max_upload_bytes),
            extractor,
            current: Arc::new(RwLock::new(CatalogSnapshot {
                generation: 0,
                catalog: Arc::new(catalog),
            })),
        })
    }

    /// Whether the extractor can currently run.
    pub async fn extractor_available(&self) -> bool {
        self.extractor.check().await.is_ok()
    }

    /// Stage an upload, extract its key frames, and publish them.
    ///
    /// The tool is checked before anything is written. The staged file is
    /// removed on every exit path.
    pub async fn extract_upload<R>(
        &self,
        reader: R,
        content_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<CatalogSnapshot, CoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.extractor.check().await?;

        let staged = self.stager.stage(reader, content_type, file_name).await?;
        let result = self.extract_staged(&staged).await;

        if let Err(e) = staged.remove().await {
            tracing::warn!(error = %e, "Failed to remove staged upload");
        }
        result
    }

    /// Extract an already staged video and publish the result.
    ///
    /// On failure the previously published catalog stays authoritative.
    pub async fn extract_staged(&self, staged: &StagedVideo) -> Result<CatalogSnapshot, CoreError> {
        let job = JobDir::new(self.jobs_dir.join(Uuid::new_v4().to_string()));
        tracing::info!(
            job = %job.path().display(),
            video = %staged.path().display(),
            size_bytes = staged.size_bytes(),
            "Starting extraction job"
        );

        if let Err(e) = self.extractor.extract(staged.path(), job.path()).await {
            tracing::warn!(job = %job.path().display(), error = %e, "Extraction failed");
            job.remove().await;
            return Err(e.into());
        }

        self.publish(job).await
    }

    /// Move a finished job's frames into the output directory.
    ///
    /// Runs on its own task holding the write lock, so a caller that goes
    /// away mid-publish cannot leave the output directory half-written.
    async fn publish(&self, job: JobDir) -> Result<CatalogSnapshot, CoreError> {
        let guard = Arc::clone(&self.current).write_owned().await;
        let output_dir = self.output_dir.clone();

        tokio::spawn(publish_locked(guard, job, output_dir))
            .await
            .map_err(|e| CoreError::Io(std::io::Error::other(format!("publish task failed: {e}"))))?
    }

    /// The current catalog.
    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.current.read().await.clone()
    }

    /// Look up a frame and read its bytes.
    pub async fn read_frame(&self, id: &str) -> Result<(FrameRecord, Vec<u8>), CoreError> {
        let current = self.current.read().await;
        let frame = current
            .catalog
            .resolve(id)
            .cloned()
            .ok_or_else(|| CoreError::FrameNotFound(id.to_string()))?;
        let data = tokio::fs::read(&frame.path).await?;
        Ok((frame, data))
    }

    /// Zip the requested frames from the current catalog.
    pub async fn build_archive(&self, request: &ArchiveRequest) -> Result<ArchiveBundle, CoreError> {
        let current = self.current.read().await;
        archive::assemble(&current.catalog, request, Utc::now()).await
    }
}

async fn publish_locked(
    mut current: OwnedRwLockWriteGuard<CatalogSnapshot>,
    job: JobDir,
    output_dir: PathBuf,
) -> Result<CatalogSnapshot, CoreError> {
    let generation = current.generation + 1;
    let result = replace_frames(job.path(), &output_dir).await;
    job.remove().await;

    let catalog = match result {
        Ok(catalog) => catalog,
        Err(e) => {
            // The old generation may already be gone; never leave a mix.
            if let Err(purge) = purge_frames(&output_dir).await {
                tracing::error!(error = %purge, "Failed to clear output after failed publish");
            }
            *current = CatalogSnapshot {
                generation,
                catalog: Arc::new(FrameCatalog::default()),
            };
            tracing::error!(generation, error = %e, "Publishing frames failed; catalog cleared");
            return Err(e);
        }
    };

    *current = CatalogSnapshot {
        generation,
        catalog: Arc::new(catalog),
    };
    tracing::info!(generation, frames = current.catalog.len(), "Published frame catalog");
    Ok(current.clone())
}

/// Purge `output_dir`, move the frames of `job_dir` in, and rescan.
async fn replace_frames(job_dir: &Path, output_dir: &Path) -> Result<FrameCatalog, CoreError> {
    let fresh = FrameCatalog::scan(job_dir).await?;

    tokio::fs::create_dir_all(output_dir).await?;
    let purged = purge_frames(output_dir).await?;
    tracing::debug!(purged, incoming = fresh.len(), "Replacing frames in output directory");

    for frame in fresh.list() {
        move_file(&frame.path, &output_dir.join(&frame.id)).await?;
    }

    Ok(FrameCatalog::scan(output_dir).await?)
}

/// Rename, falling back to copy + remove when crossing filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

async fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Scratch directory of one extraction job, removed when the job ends.
struct JobDir {
    path: PathBuf,
    removed: bool,
}

impl JobDir {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            removed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = remove_dir_if_exists(&self.path).await {
            tracing::warn!(job = %self.path.display(), error = %e, "Failed to remove job directory");
        }
    }
}

impl Drop for JobDir {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}
