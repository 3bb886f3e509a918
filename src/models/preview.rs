//! A rendered preview of a submission source package.

use super::metadata::Metadata;
use bytes::Bytes;
use std::{fmt, io, pin::Pin};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Boxed byte stream carrying PDF content.
pub type ContentStream = Pin<Box<dyn AsyncRead + Send>>;

/// An opened stream of preview bytes.
///
/// Read once: either drained by a deposit or handed to the caller of a fetch.
pub struct Content {
    stream: ContentStream,
}

impl Content {
    pub fn new(reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            stream: Box::pin(reader),
        }
    }

    #[cfg(test)]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(std::io::Cursor::new(bytes.into()))
    }

    /// Drain the stream into memory.
    pub async fn read_all(mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.stream.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    pub fn into_stream(self) -> ContentStream {
        self.stream
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content").finish_non_exhaustive()
    }
}

/// A preview addressed by its logical identity `(source_id, checksum)`.
///
/// `checksum` is the caller's token for the source package state, not the
/// checksum of the PDF bytes (that one lives in `metadata`).
#[derive(Debug)]
pub struct Preview {
    /// Identifier of the submission source package.
    pub source_id: String,

    /// State of the source package this preview was rendered from.
    pub checksum: String,

    /// Set on every preview returned by the store.
    pub metadata: Option<Metadata>,

    pub content: Option<Content>,
}

impl Preview {
    /// A preview carrying only content, as handed to a deposit.
    pub fn for_deposit(
        source_id: impl Into<String>,
        checksum: impl Into<String>,
        content: Content,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            checksum: checksum.into(),
            metadata: None,
            content: Some(content),
        }
    }
}
