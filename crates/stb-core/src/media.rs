//! Attachment downloads into the local media tree.

use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    fs,
    io::{AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{domain::MessageKind, Result};

/// Provider metadata for an opaque file handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFile {
    /// Provider-side path used for the transfer.
    pub path: String,
    /// Size reported by the provider, if any.
    pub size: Option<u64>,
}

/// Provider file API (Telegram `getFile` + download today).
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn lookup(&self, handle: &str) -> Result<RemoteFile>;

    /// Stream the remote bytes into `dst`.
    ///
    /// `dst` refuses writes past the size ceiling; implementations should stop on the first
    /// write error instead of draining the rest of the body.
    async fn fetch(&self, remote: &RemoteFile, dst: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()>;
}

/// Counts bytes on their way to `inner` and fails any write that would go past `limit`.
pub struct CappedWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    limit: u64,
    written: u64,
    refused: Option<u64>,
}

impl<'a, W: AsyncWrite + Unpin + ?Sized> CappedWriter<'a, W> {
    pub fn new(inner: &'a mut W, limit: u64) -> Self {
        Self {
            inner,
            limit,
            written: 0,
            refused: None,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Size the transfer had reached when it was cut off, if it was.
    pub fn refused(&self) -> Option<u64> {
        self.refused
    }
}

impl<W: AsyncWrite + Unpin + ?Sized> AsyncWrite for CappedWriter<'_, W> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let attempted = this.written + buf.len() as u64;
        if attempted > this.limit {
            this.refused = Some(attempted);
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Other,
                format!("size limit of {} bytes exceeded", this.limit),
            )));
        }
        let n = ready!(Pin::new(&mut *this.inner).poll_write(cx, buf))?;
        this.written += n as u64;
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Successfully stored attachment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMedia {
    /// Relative to the media root, `/`-separated (e.g. `photos/<uuid>.jpg`).
    pub relative_path: String,
    pub original_filename: Option<String>,
    pub size: u64,
}

/// Soft failure: the dialogue records the message without a local file.
#[derive(Debug, thiserror::Error)]
pub enum MediaUnavailable {
    #[error("file is too large ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("metadata lookup failed: {0}")]
    Lookup(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("local storage failed: {0}")]
    Storage(String),
}

pub struct MediaFetcher {
    source: Arc<dyn FileSource>,
    root: PathBuf,
    max_bytes: u64,
    timeout: Duration,
}

impl MediaFetcher {
    pub fn new(
        source: Arc<dyn FileSource>,
        root: impl Into<PathBuf>,
        max_bytes: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            root: root.into(),
            max_bytes,
            timeout,
        }
    }

    /// Look up `handle`, enforce the size ceiling and store the bytes under a fresh UUID name.
    ///
    /// Never overwrites an existing file and never leaves a partial file behind.
    pub async fn fetch(
        &self,
        kind: MessageKind,
        handle: &str,
        file_name: Option<&str>,
    ) -> std::result::Result<StoredMedia, MediaUnavailable> {
        let remote = match timeout(self.timeout, self.source.lookup(handle)).await {
            Ok(Ok(remote)) => remote,
            Ok(Err(e)) => return Err(MediaUnavailable::Lookup(e.to_string())),
            Err(_) => return Err(MediaUnavailable::Lookup("timed out".to_string())),
        };

        if let Some(size) = remote.size {
            if size > self.max_bytes {
                return Err(MediaUnavailable::TooLarge {
                    size,
                    limit: self.max_bytes,
                });
            }
        }

        let original_filename = file_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| remote_basename(&remote.path));

        let dir_name = kind_dir(kind);
        let dir = self.root.join(dir_name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| MediaUnavailable::Storage(e.to_string()))?;

        let ext = pick_extension(kind, original_filename.as_deref());
        let file_name = format!("{}.{ext}", Uuid::new_v4());
        let dst_path = dir.join(&file_name);

        let mut dst = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&dst_path)
            .await
            .map_err(|e| MediaUnavailable::Storage(e.to_string()))?;

        let mut capped = CappedWriter::new(&mut dst, self.max_bytes);
        let transfer = timeout(self.timeout, self.source.fetch(&remote, &mut capped)).await;
        let (size, refused) = (capped.written(), capped.refused());
        let flushed = dst.flush().await;
        drop(dst);

        if let Some(size) = refused {
            discard(&dst_path).await;
            return Err(MediaUnavailable::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        match transfer {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                discard(&dst_path).await;
                return Err(MediaUnavailable::Transfer(e.to_string()));
            }
            Err(_) => {
                discard(&dst_path).await;
                return Err(MediaUnavailable::Transfer("timed out".to_string()));
            }
        }
        if let Err(e) = flushed {
            discard(&dst_path).await;
            return Err(MediaUnavailable::Storage(e.to_string()));
        }

        debug!(path = %dst_path.display(), size, "stored attachment");
        Ok(StoredMedia {
            relative_path: format!("{dir_name}/{file_name}"),
            original_filename,
            size,
        })
    }
}

fn kind_dir(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Photo => "photos",
        MessageKind::Video => "videos",
        MessageKind::Document | MessageKind::Text => "documents",
    }
}

fn default_extension(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Photo => "jpg",
        MessageKind::Video => "mp4",
        MessageKind::Document | MessageKind::Text => "bin",
    }
}

fn pick_extension(kind: MessageKind, original: Option<&str>) -> String {
    original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| (1..=8).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| default_extension(kind).to_string())
}

fn remote_basename(path: &str) -> Option<String> {
    path.rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), "failed to remove partial attachment: {e}");
    }
}
