use crate::domain::ports::ScratchStore;
use crate::utils::error::{DelegateError, Result};
use crate::utils::validation::validate_container_id;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirBuilder, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// One file per container under a base directory.
#[derive(Debug, Clone)]
pub struct DirScratchStore {
    base_dir: PathBuf,
}

impl DirScratchStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn record_path(&self, container_id: &str) -> PathBuf {
        self.base_dir.join(container_id)
    }

    async fn ensure_dir(&self) -> Result<()> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&self.base_dir).await?;
        Ok(())
    }

    async fn sync_dir(&self) -> Result<()> {
        File::open(&self.base_dir).await?.sync_all().await?;
        Ok(())
    }
}

impl ScratchStore for DirScratchStore {
    async fn put(&self, container_id: &str, data: &[u8]) -> Result<()> {
        validate_container_id(container_id)?;
        self.ensure_dir().await?;

        let path = self.record_path(container_id);
        let tmp_path = self.base_dir.join(format!(".{}.tmp", container_id));

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &path).await?;
        self.sync_dir().await?;

        tracing::debug!("Saved scratch record {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    async fn take_and_erase(&self, container_id: &str) -> Result<Vec<u8>> {
        validate_container_id(container_id)?;

        let path = self.record_path(container_id);
        let claimed = self
            .base_dir
            .join(format!(".{}.taken-{}", container_id, std::process::id()));

        // The rename is the claim: only one caller can move the record away.
        match fs::rename(&path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DelegateError::ScratchNotFound {
                    container_id: container_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        let data = fs::read(&claimed).await;
        if let Err(e) = fs::remove_file(&claimed).await {
            tracing::warn!("Could not remove claimed scratch record {}: {}", claimed.display(), e);
        }
        let data = data?;

        tracing::debug!("Consumed scratch record {} ({} bytes)", path.display(), data.len());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_take_round_trips_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirScratchStore::new(temp_dir.path().join("libkv"));
        let data = b"[{\"type\":\"bridge\"},\n {\"type\":\"loopback\"}]  ".to_vec();

        store.put("testcontainer", &data).await.unwrap();
        assert!(store.record_path("testcontainer").exists());

        let read_back = store.take_and_erase("testcontainer").await.unwrap();
        assert_eq!(read_back, data);
        assert!(!store.record_path("testcontainer").exists());
        assert_eq!(std::fs::read_dir(store.base_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_second_take_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirScratchStore::new(temp_dir.path());

        store.put("abc", b"[]").await.unwrap();
        assert!(store.take_and_erase("abc").await.is_ok());

        let err = store.take_and_erase("abc").await.unwrap_err();
        assert!(matches!(err, DelegateError::ScratchNotFound { ref container_id } if container_id == "abc"));
    }

    #[tokio::test]
    async fn test_put_overwrites_previous_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirScratchStore::new(temp_dir.path());

        store.put("abc", b"old").await.unwrap();
        store.put("abc", b"new").await.unwrap();
        assert_eq!(store.take_and_erase("abc").await.unwrap(), b"new".to_vec());
    }

    #[tokio::test]
    async fn test_records_are_per_container() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirScratchStore::new(temp_dir.path());

        store.put("123", b"one").await.unwrap();
        store.put("1234", b"two").await.unwrap();
        assert_eq!(store.take_and_erase("1234").await.unwrap(), b"two".to_vec());
        assert_eq!(store.take_and_erase("123").await.unwrap(), b"one".to_vec());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_record_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = DirScratchStore::new(temp_dir.path().join("state"));
        store.put("abc", b"[]").await.unwrap();

        let dir_mode = std::fs::metadata(store.base_dir()).unwrap().permissions().mode();
        let file_mode = std::fs::metadata(store.record_path("abc")).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_working_file_names_never_match_a_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirScratchStore::new(temp_dir.path());
        let taken = format!(".x.taken-{}", std::process::id());

        // Ids shaped like the store's temporary and claimed files are refused.
        for id in [".abc.tmp", taken.as_str()] {
            let err = store.put(id, b"other").await.unwrap_err();
            assert!(matches!(err, DelegateError::InvalidConfigValue { .. }), "{}", id);
        }

        store.put("abc", b"abc-record").await.unwrap();
        store.put("x", b"x-record").await.unwrap();
        assert_eq!(store.take_and_erase("x").await.unwrap(), b"x-record".to_vec());
        assert_eq!(store.take_and_erase("abc").await.unwrap(), b"abc-record".to_vec());
        assert_eq!(std::fs::read_dir(store.base_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirScratchStore::new(temp_dir.path());

        assert!(tokio_test::block_on(store.put("../escape", b"[]")).is_err());
        assert!(tokio_test::block_on(store.take_and_erase("")).is_err());
    }
}
