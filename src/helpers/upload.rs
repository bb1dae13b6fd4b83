use crate::configuration::UploadSettings;
use crate::helpers::ids;
use bytes::Bytes;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

const IMAGES_DIR: &str = "images";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to prepare upload directory: {0}")]
    Directory(#[source] io::Error),
    #[error("failed to write uploaded file: {0}")]
    Write(#[source] io::Error),
    #[error("uploaded file exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// File part taken off an inbound multipart body.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Reference to a stored attachment, as carried in message metadata and in
/// the chat-history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredUpload {
    /// Name the client sent.
    pub name: String,
    pub url: String,
    pub content_type: String,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadHandler {
    root: PathBuf,
    url_prefix: String,
    max_bytes: usize,
}

impl UploadHandler {
    pub fn new(settings: &UploadSettings) -> Self {
        Self {
            root: PathBuf::from(&settings.dir),
            url_prefix: settings.url_prefix.trim_end_matches('/').to_string(),
            max_bytes: settings.max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Persist the attachment, if any, under `<root>/images/<uuid>.<ext>`.
    /// A part without a name and without bytes counts as no attachment.
    #[tracing::instrument(name = "Store uploaded file.", skip(self, file))]
    pub async fn store(&self, file: Option<IncomingFile>) -> Result<Option<StoredUpload>, UploadError> {
        let file = match file {
            Some(file) if !(file.file_name.is_empty() && file.bytes.is_empty()) => file,
            _ => return Ok(None),
        };

        if file.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let dir = self.root.join(IMAGES_DIR);
        tokio::fs::create_dir_all(&dir).await.map_err(|err| {
            tracing::error!("Failed to create upload directory {:?}: {:?}", dir, err);
            UploadError::Directory(err)
        })?;

        let extension = Path::new(&file.file_name)
            .extension()
            .and_then(|ext| ext.to_str());
        let stored_name = ids::upload_file_name(extension);
        let path = dir.join(&stored_name);

        tokio::fs::write(&path, &file.bytes).await.map_err(|err| {
            tracing::error!("Failed to write upload {:?}: {:?}", path, err);
            UploadError::Write(err)
        })?;

        let content_type = file
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(&file.file_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });

        tracing::info!(stored = %stored_name, size = file.bytes.len(), "Upload saved");

        Ok(Some(StoredUpload {
            url: format!("{}/{}/{}", self.url_prefix, IMAGES_DIR, stored_name),
            name: file.file_name,
            content_type,
            path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(dir: &Path, max_bytes: usize) -> UploadHandler {
        UploadHandler::new(&UploadSettings {
            dir: dir.to_string_lossy().into_owned(),
            url_prefix: "/uploads/".to_string(),
            max_bytes,
        })
    }

    fn png(name: &str) -> IncomingFile {
        IncomingFile {
            file_name: name.to_string(),
            content_type: None,
            bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
        }
    }

    #[tokio::test]
    async fn stores_file_under_generated_name() {
        let tmp = tempfile::tempdir().unwrap();
        let stored = handler(tmp.path(), 1024)
            .store(Some(png("cat photo.png")))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored.name, "cat photo.png");
        assert_eq!(stored.content_type, "image/png");
        assert!(stored.url.starts_with("/uploads/images/"));
        assert!(stored.url.ends_with(".png"));
        assert!(stored.path.starts_with(tmp.path().join("images")));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn same_name_twice_does_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = handler(tmp.path(), 1024);
        let a = handler.store(Some(png("a.png"))).await.unwrap().unwrap();
        let b = handler.store(Some(png("a.png"))).await.unwrap().unwrap();
        assert_ne!(a.path, b.path);
    }

    #[tokio::test]
    async fn declared_content_type_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = png("blob");
        file.content_type = Some("image/webp".to_string());
        let stored = handler(tmp.path(), 1024).store(Some(file)).await.unwrap().unwrap();
        assert_eq!(stored.content_type, "image/webp");
    }

    #[tokio::test]
    async fn absent_or_empty_part_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = handler(tmp.path(), 1024);
        assert_eq!(handler.store(None).await.unwrap(), None);

        let empty = IncomingFile {
            file_name: String::new(),
            content_type: None,
            bytes: Bytes::new(),
        };
        assert_eq!(handler.store(Some(empty)).await.unwrap(), None);
        assert!(!tmp.path().join("images").exists());
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = handler(tmp.path(), 4).store(Some(png("a.png"))).await.unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn unwritable_root_is_a_storage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = handler(&blocker, 1024).store(Some(png("a.png"))).await.unwrap_err();
        assert!(matches!(err, UploadError::Directory(_)));
    }
}
