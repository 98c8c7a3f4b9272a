//! File attachments for multipart uploads.

use std::path::Path;

/// An in-memory file to attach to a request.
///
/// The contents are owned, so a retried request always re-reads the file
/// from the beginning.
#[derive(Debug, Clone)]
pub struct File {
    /// Filename declared in the multipart form.
    pub filename: String,
    contents: Vec<u8>,
}

impl File {
    /// Create a file from a name and its contents.
    pub fn new(filename: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            contents: contents.into(),
        }
    }

    /// Read a file from disk, using its final path component as the filename.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let contents = tokio::fs::read(path).await?;

        Ok(Self { filename, contents })
    }

    /// The file contents.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}
