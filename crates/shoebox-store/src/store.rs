//! On-disk job store.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use shoebox_models::{BlobSlot, CreationJob, JobId};

use crate::error::{StoreError, StoreResult};

const DESCRIPTOR_FILE: &str = "job.json";

/// Durable per-job descriptor and blob persistence.
#[derive(Debug, Clone)]
pub struct JobStore {
    /// Root directory holding one subdirectory per job
    root: PathBuf,
}

impl JobStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory owned by a job.
    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn descriptor_path(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join(DESCRIPTOR_FILE)
    }

    /// Resolve a descriptor-relative blob path to an absolute one.
    pub fn blob_path(&self, id: &JobId, relative: &Path) -> PathBuf {
        self.job_dir(id).join(relative)
    }

    /// Atomically write the job descriptor.
    pub async fn persist(&self, job: &CreationJob) -> StoreResult<()> {
        let dir = self.job_dir(&job.id);
        fs::create_dir_all(&dir).await?;

        let json = serde_json::to_vec_pretty(job)?;
        let path = self.descriptor_path(&job.id);
        write_durable(&path, &json).await?;

        debug!(job_id = %job.id, "Persisted job descriptor");
        Ok(())
    }

    /// Durably write a blob for a slot, unless it is already persisted.
    ///
    /// Idempotent: a slot that already has a persisted path keeps that path
    /// forever; if its file is still on disk the call is a no-op. The
    /// descriptor is re-persisted before this returns, so the on-disk state
    /// always knows which blobs exist.
    pub async fn write_blob_if_absent(
        &self,
        job: &mut CreationJob,
        slot: BlobSlot,
        bytes: &[u8],
    ) -> StoreResult<PathBuf> {
        if let Some(relative) = job.slot_path(slot).map(Path::to_path_buf) {
            let absolute = self.blob_path(&job.id, &relative);
            if fs::try_exists(&absolute).await? {
                return Ok(relative);
            }
            // Persisted path whose file vanished (e.g. a failed finalize
            // moved it away); rewrite the bytes at the same path.
            fs::create_dir_all(self.job_dir(&job.id)).await?;
            write_durable(&absolute, bytes).await?;
            return Ok(relative);
        }

        let relative = PathBuf::from(blob_file_name(job, slot));
        let absolute = self.blob_path(&job.id, &relative);
        fs::create_dir_all(self.job_dir(&job.id)).await?;
        write_durable(&absolute, bytes).await?;

        job.set_slot_persisted(slot, relative.clone());
        self.persist(job).await?;

        debug!(job_id = %job.id, slot = %slot, path = %relative.display(), "Blob persisted");
        Ok(relative)
    }

    /// Read a persisted blob back, if the slot is durable.
    pub async fn read_blob(&self, job: &CreationJob, slot: BlobSlot) -> StoreResult<Option<Vec<u8>>> {
        match job.slot_path(slot) {
            Some(relative) => {
                let bytes = fs::read(self.blob_path(&job.id, relative)).await?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    /// Load a job descriptor.
    ///
    /// Missing descriptor → `Ok(None)`; unparseable descriptor →
    /// [`StoreError::Corrupt`].
    pub async fn load(&self, id: &JobId) -> StoreResult<Option<CreationJob>> {
        let path = self.descriptor_path(id);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(job) => Ok(Some(job)),
            Err(source) => Err(StoreError::Corrupt { path, source }),
        }
    }

    /// Remove the entire job directory. Idempotent.
    pub async fn delete(&self, id: &JobId) -> StoreResult<()> {
        match fs::remove_dir_all(self.job_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write bytes to a temp file, flush to disk, then rename into place.
async fn write_durable(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await?;
    Ok(())
}

/// File name for a slot's blob inside the job directory.
fn blob_file_name(job: &CreationJob, slot: BlobSlot) -> String {
    let ext = match slot {
        BlobSlot::Raw | BlobSlot::File => job.source_ext.as_deref().unwrap_or("bin"),
        BlobSlot::Video => "mp4",
        BlobSlot::Audio => "m4a",
        BlobSlot::Image => "jpg",
    };
    format!("{}.{}", slot.as_str(), ext)
}
