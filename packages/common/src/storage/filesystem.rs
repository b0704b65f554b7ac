use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::BoxReader;
use super::error::StorageError;

/// Filesystem-backed store for uploaded assets.
///
/// Committed assets live flat under `{base_path}/{stored_name}`. Incoming
/// data is first staged under `{base_path}/.tmp` and renamed into place on
/// commit, so a half-written upload is never visible under its final name.
/// Batch archives are written under `{base_path}/archives`.
pub struct FilesystemAssetStore {
    base_path: PathBuf,
}

/// A fully received upload waiting in the staging area.
///
/// Produced by [`FilesystemAssetStore::stage`] and consumed by either
/// `commit` or `discard`.
#[derive(Debug)]
pub struct StagedAsset {
    temp_path: PathBuf,
    /// Size of the staged data in bytes.
    pub size: u64,
}

impl FilesystemAssetStore {
    /// Create a new asset store rooted at `base_path`.
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        fs::create_dir_all(base_path.join("archives")).await?;
        Ok(Self { base_path })
    }

    /// Root directory of the store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Filesystem path of a committed asset.
    ///
    /// `stored_name` is expected to come from
    /// [`generate_stored_name`](super::generate_stored_name) and therefore
    /// contains no path separators.
    pub fn path_of(&self, stored_name: &str) -> PathBuf {
        self.base_path.join(stored_name)
    }

    /// Filesystem path for a batch archive file.
    pub fn archive_path(&self, file_name: &str) -> PathBuf {
        self.base_path.join("archives").join(file_name)
    }

    /// Path for a staging file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Read `reader` to completion into the staging area.
    pub async fn stage(&self, mut reader: BoxReader) -> Result<StagedAsset, StorageError> {
        let temp_path = self.temp_path();
        let mut temp_file = fs::File::create(&temp_path).await?;
        let mut size: u64 = 0;

        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
        let result = async {
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                size += n as u64;
                temp_file.write_all(&buf[..n]).await?;
            }
            temp_file.flush().await?;
            Ok::<_, StorageError>(())
        }
        .await;

        drop(temp_file);
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        Ok(StagedAsset { temp_path, size })
    }

    /// Move a staged asset into place under its final stored name.
    pub async fn commit(
        &self,
        staged: StagedAsset,
        stored_name: &str,
    ) -> Result<PathBuf, StorageError> {
        let final_path = self.path_of(stored_name);
        if let Err(e) = fs::rename(&staged.temp_path, &final_path).await {
            let _ = fs::remove_file(&staged.temp_path).await;
            return Err(e.into());
        }
        Ok(final_path)
    }

    /// Drop a staged asset without committing it. Best effort.
    pub async fn discard(&self, staged: StagedAsset) {
        let _ = fs::remove_file(&staged.temp_path).await;
    }

    /// Open a committed asset as a streaming async reader.
    pub async fn open_stream(&self, stored_name: &str) -> Result<BoxReader, StorageError> {
        let path = self.path_of(stored_name);
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(stored_name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a committed asset.
    ///
    /// Returns `true` if the asset was removed, `false` if it did not exist.
    pub async fn remove(&self, stored_name: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.path_of(stored_name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
