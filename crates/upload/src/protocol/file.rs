//! One uploaded file's live byte stream plus metadata.
//!
//! A file is represented by a channel pair created the moment a decoder
//! recognizes a file boundary in the body:
//!
//! - [`FileSink`]: producer side, owned by the decoder; pushes chunks,
//!   terminal errors and the finalized digest map
//! - [`FileStream`]: consumer side, moved into the one handler invocation
//!   processing the file; implements `futures::Stream`
//!
//! The two halves share a [`FileMeta`], so size and last-activity updates
//! made by the decoder are visible to the consumer while it streams, and the
//! digest map becomes visible once the stream ends. The bounded chunk
//! channel gives cooperative backpressure; `pause`/`resume` additionally
//! delegate to the owning transport's flow control.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use tracing::trace;

use crate::protocol::error::DecodeError;
use crate::protocol::request::Pausable;

const CHUNK_CHANNEL_SIZE: usize = 16;

/// Descriptive metadata of one uploaded file.
///
/// Mutated only by the producing decoder; shared with consumers through an
/// `Arc`.
#[derive(Debug)]
pub struct FileMeta {
    name: String,
    media_type: String,
    size: AtomicU64,
    last_activity: Mutex<Option<SystemTime>>,
    digests: OnceLock<HashMap<String, String>>,
}

impl FileMeta {
    fn new(name: String, media_type: String) -> Self {
        Self {
            name,
            media_type,
            size: AtomicU64::new(0),
            last_activity: Mutex::new(None),
            digests: OnceLock::new(),
        }
    }

    /// Name of the file, without path information. Empty when unknown.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared media type of the file's content.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Number of bytes received so far. Monotonically increasing.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Time this file last received bytes.
    pub fn last_activity(&self) -> Option<SystemTime> {
        self.last_activity.lock().ok().and_then(|guard| *guard)
    }

    /// Finalized hex digest for `algorithm`, available only after the byte
    /// stream ended. An absent entry means the algorithm was not requested.
    pub fn digest(&self, algorithm: &str) -> Option<&str> {
        self.digests.get().and_then(|digests| digests.get(algorithm)).map(String::as_str)
    }

    /// The full digest map, once the byte stream ended.
    pub fn digests(&self) -> Option<&HashMap<String, String>> {
        self.digests.get()
    }

    fn record_chunk(&self, len: u64) {
        self.size.fetch_add(len, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_activity.lock() {
            *guard = Some(SystemTime::now());
        }
    }

    fn set_digests(&self, digests: HashMap<String, String>) {
        let _ = self.digests.set(digests);
    }
}

/// Consumer side of one uploaded file.
///
/// Yields the file's chunks in wire order; the stream ends when the
/// decoder reached the file's end-of-content marker, or yields a terminal
/// error when decoding failed mid-file. Ownership is exclusive to the one
/// handler invocation processing the file.
pub struct FileStream {
    meta: Arc<FileMeta>,
    chunks: mpsc::Receiver<Result<Bytes, DecodeError>>,
    flow: Arc<dyn Pausable>,
}

impl FileStream {
    /// Creates a connected producer/consumer pair for one file.
    ///
    /// This is the entry point for decoders, mirroring the shape of the
    /// events channel: the decoder keeps the [`FileSink`], the
    /// [`FileStream`] travels inside the file event to the handler.
    pub fn channel(
        name: impl Into<String>,
        media_type: impl Into<String>,
        flow: Arc<dyn Pausable>,
    ) -> (FileSink, FileStream) {
        let meta = Arc::new(FileMeta::new(name.into(), media_type.into()));
        let (sender, receiver) = mpsc::channel(CHUNK_CHANNEL_SIZE);

        let sink = FileSink { meta: Arc::clone(&meta), chunks: sender };
        let stream = FileStream { meta, chunks: receiver, flow };

        (sink, stream)
    }

    /// Shared metadata handle; clone the `Arc` to keep reading size or
    /// digests after the stream itself has been consumed.
    pub fn meta(&self) -> &Arc<FileMeta> {
        &self.meta
    }

    /// Name of the file, without path information. Empty when unknown.
    pub fn name(&self) -> &str {
        self.meta.name()
    }

    /// Declared media type of the file's content.
    pub fn media_type(&self) -> &str {
        self.meta.media_type()
    }

    /// Number of bytes received so far.
    pub fn size(&self) -> u64 {
        self.meta.size()
    }

    /// Finalized hex digest for `algorithm`, available after stream end.
    pub fn digest(&self, algorithm: &str) -> Option<&str> {
        self.meta.digest(algorithm)
    }

    /// Suspends the owning transport from delivering further chunks.
    pub fn pause(&self) {
        self.flow.pause();
    }

    /// Re-enables chunk delivery on the owning transport.
    pub fn resume(&self) {
        self.flow.resume();
    }

    /// Drains the remaining chunks into one contiguous buffer.
    pub async fn into_bytes(mut self) -> Result<Bytes, DecodeError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for FileStream {
    type Item = Result<Bytes, DecodeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.chunks.poll_next_unpin(cx)
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream").field("meta", &self.meta).finish_non_exhaustive()
    }
}

/// Producer side of one uploaded file, owned by the decoder.
pub struct FileSink {
    meta: Arc<FileMeta>,
    chunks: mpsc::Sender<Result<Bytes, DecodeError>>,
}

impl FileSink {
    /// Pushes one chunk downstream, updating size and last activity.
    ///
    /// A send failure means the consumer dropped the stream; the chunk is
    /// discarded but metadata still advances, because the wire must be
    /// drained to its end regardless of whether anyone is reading.
    pub async fn data(&mut self, bytes: Bytes) {
        self.meta.record_chunk(bytes.len() as u64);
        trace!(len = bytes.len(), total = self.meta.size(), "file chunk");
        let _ = self.chunks.send(Ok(bytes)).await;
    }

    /// Terminates the file with an error instead of a normal end.
    pub async fn error(mut self, error: DecodeError) {
        let _ = self.chunks.send(Err(error)).await;
    }

    /// Ends the file, attaching the finalized digest map when one was
    /// computed. Dropping the sink closes the consumer's stream.
    pub fn finish(self, digests: Option<HashMap<String, String>>) {
        if let Some(digests) = digests {
            self.meta.set_digests(digests);
        }
    }
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink").field("meta", &self.meta).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::request::NoPause;

    use super::*;

    #[tokio::test]
    async fn chunks_flow_in_order_and_update_meta() {
        let (mut sink, stream) = FileStream::channel("notes.txt", "text/plain", Arc::new(NoPause));

        sink.data(Bytes::from_static(b"hello ")).await;
        sink.data(Bytes::from_static(b"world")).await;
        sink.finish(None);

        let meta = Arc::clone(stream.meta());
        let bytes = stream.into_bytes().await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
        assert_eq!(meta.size(), 11);
        assert!(meta.last_activity().is_some());
        assert_eq!(meta.digests(), None);
    }

    #[tokio::test]
    async fn digests_visible_after_end() {
        let (sink, mut stream) = FileStream::channel("blob", "application/octet-stream", Arc::new(NoPause));

        let mut digests = HashMap::new();
        digests.insert("md5".to_string(), "d41d8cd98f00b204e9800998ecf8427e".to_string());
        sink.finish(Some(digests));

        assert!(stream.next().await.is_none());
        assert_eq!(stream.digest("md5"), Some("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(stream.digest("sha1"), None);
    }

    #[tokio::test]
    async fn error_terminates_the_stream() {
        let (sink, stream) = FileStream::channel("blob", "application/octet-stream", Arc::new(NoPause));

        sink.error(DecodeError::invalid_body("connection reset mid part")).await;

        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn dropped_consumer_does_not_stall_the_producer() {
        let (mut sink, stream) = FileStream::channel("blob", "application/octet-stream", Arc::new(NoPause));
        drop(stream);

        // channel is closed; sends return immediately and meta still advances
        for _ in 0..CHUNK_CHANNEL_SIZE * 2 {
            sink.data(Bytes::from_static(b"xxxx")).await;
        }
        assert_eq!(sink.meta.size(), (CHUNK_CHANNEL_SIZE * 2 * 4) as u64);
    }

    #[tokio::test]
    async fn into_bytes_surfaces_decode_errors() {
        let (mut sink, stream) = FileStream::channel("blob", "application/octet-stream", Arc::new(NoPause));

        sink.data(Bytes::from_static(b"partial")).await;
        sink.error(DecodeError::UnexpectedEof).await;

        assert!(stream.into_bytes().await.is_err());
    }
}
