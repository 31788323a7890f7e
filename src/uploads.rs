use crate::{
    config::UploadConfig,
    error::{DisallowedFileTypeSnafu, FileTooLargeSnafu, IoSnafu, StagehandResult},
};
use snafu::{ResultExt, ensure};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use time::OffsetDateTime;

pub const ALLOWED_EXTENSIONS: [&str; 6] = ["pdf", "doc", "docx", "jpg", "jpeg", "png"];

/// Flat directory holding the signed copies of conventions.
#[derive(Debug, Clone)]
pub struct UploadStore {
    config: Arc<UploadConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub file_name: String,
}

impl UploadStore {
    pub async fn new(config: Arc<UploadConfig>) -> StagehandResult<Self> {
        tokio::fs::create_dir_all(&config.directory)
            .await
            .context(IoSnafu {
                path: config.directory.clone(),
            })?;
        info!(directory = ?config.directory, "Uploads directory ready");

        Ok(Self { config })
    }

    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    /// Checks extension and size, returning the sanitised file name to record.
    pub fn validate(&self, original_name: &str, size: usize) -> StagehandResult<String> {
        let extension = extension_of(original_name);
        ensure!(
            ALLOWED_EXTENSIONS.contains(&extension.as_str()),
            DisallowedFileTypeSnafu { extension }
        );
        ensure!(
            size <= self.config.max_bytes,
            FileTooLargeSnafu {
                size,
                max: self.config.max_bytes
            }
        );

        Ok(sanitise_file_name(original_name))
    }

    pub async fn save(
        &self,
        convention_id: i32,
        original_name: &str,
        bytes: &[u8],
    ) -> StagehandResult<StoredFile> {
        let file_name = self.validate(original_name, bytes.len())?;
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let path = self
            .config
            .directory
            .join(format!("convention_{convention_id}_{millis}_{file_name}"));

        tokio::fs::write(&path, bytes)
            .await
            .context(IoSnafu { path: path.clone() })?;
        info!(?path, convention_id, "Stored signed convention");

        Ok(StoredFile { path, file_name })
    }

    pub async fn read(&self, path: &Path) -> StagehandResult<Vec<u8>> {
        tokio::fs::read(path).await.context(IoSnafu { path })
    }

    /// Missing files are fine, someone may have cleaned the directory by hand.
    pub async fn remove(&self, path: &Path) -> StagehandResult<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(?path, "Tried to remove an upload that was already gone");
                Ok(())
            }
            other => other.context(IoSnafu { path }),
        }
    }

    /// Deletes every regular file in the uploads directory, returning how many went.
    pub async fn wipe(&self) -> StagehandResult<usize> {
        let directory = &self.config.directory;
        let mut entries = tokio::fs::read_dir(directory)
            .await
            .context(IoSnafu { path: directory })?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .context(IoSnafu { path: directory })?
        {
            let path = entry.path();
            let file_type = entry.file_type().await.context(IoSnafu { path: &path })?;
            if file_type.is_file() {
                tokio::fs::remove_file(&path)
                    .await
                    .context(IoSnafu { path: &path })?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn sanitise_file_name(original_name: &str) -> String {
    original_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sniffs the bytes first, then falls back on the recorded extension.
pub fn content_type_for(file_name: &str, bytes: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type();
    }

    match extension_of(file_name).as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StagehandError;

    async fn store_in(dir: &Path, max_bytes: usize) -> UploadStore {
        UploadStore::new(Arc::new(UploadConfig {
            directory: dir.to_path_buf(),
            max_bytes,
        }))
        .await
        .unwrap()
    }

    #[test]
    fn sanitising_replaces_everything_but_safe_characters() {
        assert_eq!(
            sanitise_file_name("convention signée (1).pdf"),
            "convention_sign_e__1_.pdf"
        );
        assert_eq!(sanitise_file_name("scan-01.PNG"), "scan-01.PNG");
    }

    #[test]
    fn content_type_prefers_magic_bytes() {
        assert_eq!(content_type_for("x.jpg", b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(content_type_for("x.docx", b"hello"), "application/vnd.openxmlformats-officedocument.wordprocessingml.document");
        assert_eq!(content_type_for("x.bin", b"hello"), "application/octet-stream");
    }

    #[tokio::test]
    async fn rejects_wrong_extension_and_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 4).await;
        assert_eq!(store.max_bytes(), 4);

        assert!(matches!(
            store.validate("virus.exe", 1),
            Err(StagehandError::DisallowedFileType { .. })
        ));
        assert!(matches!(
            store.validate("scan.pdf", 5),
            Err(StagehandError::FileTooLarge { size: 5, max: 4 })
        ));
        assert_eq!(store.validate("Scan.PDF", 4).unwrap(), "Scan.PDF");
    }

    #[tokio::test]
    async fn save_read_and_wipe() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path(), 1024).await;

        let stored = store.save(7, "ma convention.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(stored.file_name, "ma_convention.pdf");
        let stored_name = stored.path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(stored_name.starts_with("convention_7_"));
        assert!(stored_name.ends_with("_ma_convention.pdf"));

        assert_eq!(store.read(&stored.path).await.unwrap(), b"%PDF-1.4");

        store.save(8, "other.png", b"png").await.unwrap();
        assert_eq!(store.wipe().await.unwrap(), 2);
        assert!(store.read(&stored.path).await.is_err());

        // already gone
        store.remove(&stored.path).await.unwrap();
    }
}
