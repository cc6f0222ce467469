//! File attachments.
//!
//! An attachment is split in two: [`AttachmentMeta`] is the descriptor that
//! sessions display and history rows record, and [`AttachmentSource`] is the
//! locator that yields the bytes. Sources are opened only when a multipart
//! request is built, so file contents never sit in session state.

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::{Error, Result};

/// MIME type used when none can be determined.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// File name used when the locator has none.
const DEFAULT_NAME: &str = "attachment";

/// Boxed reader handed to the HTTP client.
pub type AttachmentReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Metadata describing an attachment. Never carries the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// File name sent as the multipart filename.
    pub name: String,
    /// MIME type of the file part.
    pub mime_type: String,
    /// Size in bytes, when known.
    pub size_bytes: Option<u64>,
}

impl AttachmentMeta {
    /// Creates a descriptor.
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes,
        }
    }

    /// One-line summary such as `application/pdf • 1.5 MB`.
    pub fn summary(&self) -> String {
        let size = self
            .size_bytes
            .map(format_bytes)
            .unwrap_or_else(|| "Size unknown".to_string());
        format!("{} • {}", self.mime_type, size)
    }
}

/// Something that can produce the bytes of an attachment on demand.
#[async_trait::async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Opens a fresh reader over the attachment's bytes.
    async fn open(&self) -> Result<AttachmentReader>;
}

/// A source backed by a file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source for `path`. The file is not touched until opened.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path this source reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl AttachmentSource for FileSource {
    async fn open(&self) -> Result<AttachmentReader> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|err| {
            Error::io(
                format!("unable to open {}: {err}", self.path.display()),
                err,
            )
        })?;
        Ok(Box::new(file))
    }
}

/// A source over bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Arc<[u8]>,
}

impl MemorySource {
    /// Creates a source over `bytes`.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
        }
    }
}

#[async_trait::async_trait]
impl AttachmentSource for MemorySource {
    async fn open(&self) -> Result<AttachmentReader> {
        Ok(Box::new(Cursor::new(self.bytes.to_vec())))
    }
}

/// A pending attachment: its descriptor plus the locator for its bytes.
#[derive(Clone)]
pub struct Attachment {
    meta: AttachmentMeta,
    source: Arc<dyn AttachmentSource>,
}

impl Attachment {
    /// Pairs a descriptor with a byte source.
    pub fn new(meta: AttachmentMeta, source: Arc<dyn AttachmentSource>) -> Self {
        Self { meta, source }
    }

    /// Describes the file at `path` and references it without reading it.
    ///
    /// The name is the file name, the size comes from the file's metadata
    /// and the MIME type is guessed from the extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|err| Error::io(format!("unable to stat {}: {err}", path.display()), err))?;
        if !metadata.is_file() {
            return Err(Error::validation(
                format!("{} is not a regular file", path.display()),
                Some("attachment".to_string()),
            ));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let meta = AttachmentMeta::new(name, mime_type, Some(metadata.len()));
        Ok(Self::new(meta, Arc::new(FileSource::new(path))))
    }

    /// Wraps in-memory bytes; the size is taken from the buffer.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let bytes = bytes.into();
        let meta = AttachmentMeta::new(name, mime_type, Some(bytes.len() as u64));
        Self::new(meta, Arc::new(MemorySource::new(bytes)))
    }

    /// Returns the descriptor.
    pub fn meta(&self) -> &AttachmentMeta {
        &self.meta
    }

    /// Opens the underlying source.
    pub async fn open(&self) -> Result<AttachmentReader> {
        self.source.open().await
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Human-readable byte count: `512 B`, `1.5 KB`, `2.00 MB`, `1.00 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.2} GB", value / GB)
    } else if value >= MB {
        format!("{:.2} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn summary_handles_unknown_size() {
        let meta = AttachmentMeta::new("a.pdf", "application/pdf", None);
        assert_eq!(meta.summary(), "application/pdf • Size unknown");
    }

    #[test]
    fn from_path_reads_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syllabus.pdf");
        std::fs::write(&path, b"%PDF-1.4 hello").unwrap();

        let attachment = Attachment::from_path(&path).unwrap();
        assert_eq!(attachment.meta().name, "syllabus.pdf");
        assert_eq!(attachment.meta().mime_type, "application/pdf");
        assert_eq!(attachment.meta().size_bytes, Some(14));
    }

    #[test]
    fn from_path_unknown_extension_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.zzzunknown");
        std::fs::write(&path, b"x").unwrap();

        let attachment = Attachment::from_path(&path).unwrap();
        assert_eq!(attachment.meta().mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn from_path_missing_file_is_io_error() {
        let err = Attachment::from_path("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[tokio::test]
    async fn sources_are_reopenable() {
        let attachment = Attachment::from_bytes("a.txt", "text/plain", b"abc".to_vec());
        for _ in 0..2 {
            let mut reader = attachment.open().await.unwrap();
            let mut out = String::new();
            reader.read_to_string(&mut out).await.unwrap();
            assert_eq!(out, "abc");
        }
    }

    #[tokio::test]
    async fn file_source_deleted_before_send_fails_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, b"bye").unwrap();
        let attachment = Attachment::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(attachment.open().await.is_err());
    }
}
