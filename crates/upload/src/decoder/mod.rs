//! Decoders and their selection.
//!
//! A decoder owns the wire-format-specific parsing of one request body and
//! reports its results as [`DecodeEvent`]s through a single ordered channel.
//! The engine treats all decoders identically through that one contract, so
//! new body encodings plug in without touching the dispatch layer.
//!
//! # Components
//!
//! - [`DecoderFactory`]: instantiates a decoder against one request
//! - [`DecodeStream`] / [`EventSink`]: the per-request event channel pair
//! - [`DecoderRegistry`]: ordered content-type bindings, first match wins
//! - [`MultipartDecoderFactory`]: `multipart/form-data` bodies
//! - [`OctetStreamDecoderFactory`]: raw single-file bodies
//! - [`DigestPipeline`]: incremental content hashing shared by decoders
//!
//! # Writing a custom decoder
//!
//! Implement [`DecoderFactory`]: create the channel pair with
//! [`DecodeStream::channel`], spawn a task that consumes the request body
//! and feeds the [`EventSink`], and return the [`DecodeStream`]. The sink's
//! methods fail once the consumer is gone; a decoder task treats that as a
//! cancellation signal and exits.

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use thiserror::Error;

use crate::protocol::{DecodeError, DecodeEvent, FileAck, FileStream, UploadRequest};

mod digest;
pub use digest::DigestPipeline;
pub use digest::HashAlgorithm;
pub use digest::UnknownAlgorithm;

mod registry;
pub use registry::ContentTypeMatcher;
pub use registry::DecoderRegistry;
pub use registry::RegistryBuilder;
pub use registry::SubstringMatcher;
pub use registry::fn_matcher;

mod multipart;
pub use multipart::MultipartDecoderFactory;

mod octet_stream;
pub use octet_stream::OctetStreamDecoderFactory;

const EVENT_CHANNEL_SIZE: usize = 16;

/// Options forwarded unmodified to the selected decoder factory.
#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    /// Hash algorithms to compute incrementally over each file's content.
    pub hashes: Vec<HashAlgorithm>,
    /// Storage path hint for decoders that spool to disk. The bundled
    /// decoders stream and ignore it.
    pub temp_dir: Option<PathBuf>,
}

/// Instantiates a decoder for one request.
///
/// The factory consumes the request: from here on the decoder owns the body
/// stream. Returning `None` means the factory cannot process this request's
/// shape (for example a multipart content type without a boundary
/// parameter); the dispatcher reports that as unsupported media.
pub trait DecoderFactory: Send + Sync {
    fn create(&self, request: UploadRequest, options: &DecoderOptions) -> Option<DecodeStream>;
}

/// The consumer side of a decoder's event channel.
///
/// Yields [`DecodeEvent`]s in wire arrival order. Dropping the stream
/// cancels the producing decoder at its next send.
pub struct DecodeStream {
    events: mpsc::Receiver<DecodeEvent>,
}

impl DecodeStream {
    /// Creates a connected sink/stream pair for one request.
    ///
    /// The channel is bounded: an unconsumed event suspends the decoder,
    /// which in turn stops reading the transport. That is the engine's
    /// ordering and backpressure backbone.
    pub fn channel() -> (EventSink, DecodeStream) {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_SIZE);
        (EventSink { events: sender }, DecodeStream { events: receiver })
    }
}

impl Stream for DecodeStream {
    type Item = DecodeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

impl fmt::Debug for DecodeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeStream").finish_non_exhaustive()
    }
}

/// The event consumer went away; the decoder should stop.
#[derive(Debug, Error)]
#[error("decode event stream was dropped by its consumer")]
pub struct DecodeAbort;

/// The producer side of a decoder's event channel.
#[derive(Debug)]
pub struct EventSink {
    events: mpsc::Sender<DecodeEvent>,
}

impl EventSink {
    /// Reports a complete non-file form field.
    pub async fn field(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), DecodeAbort> {
        self.send(DecodeEvent::Field { name: name.into(), value: value.into() }).await
    }

    /// Reports a recognized file boundary.
    pub async fn file(&mut self, key: Option<String>, file: FileStream, ack: Option<FileAck>) -> Result<(), DecodeAbort> {
        self.send(DecodeEvent::File { key, file, ack }).await
    }

    /// Reports the end of the body. Consumes the sink: nothing may follow.
    pub async fn end(mut self) -> Result<(), DecodeAbort> {
        self.send(DecodeEvent::End).await
    }

    /// Reports a terminal decode failure. Consumes the sink.
    pub async fn error(mut self, error: DecodeError) -> Result<(), DecodeAbort> {
        self.send(DecodeEvent::Error(error)).await
    }

    async fn send(&mut self, event: DecodeEvent) -> Result<(), DecodeAbort> {
        self.events.send(event).await.map_err(|_| DecodeAbort)
    }
}

#[cfg(test)]
mod tests {
    use futures::task::noop_waker_ref;

    use super::*;

    #[tokio::test]
    async fn stream_pends_until_an_event_is_sent() {
        let (mut sink, mut stream) = DecodeStream::channel();
        let waker = noop_waker_ref();
        let mut cx = Context::from_waker(waker);

        assert!(matches!(stream.poll_next_unpin(&mut cx), Poll::Pending));

        sink.field("a", "1").await.unwrap();
        assert!(matches!(stream.poll_next_unpin(&mut cx), Poll::Ready(Some(DecodeEvent::Field { .. }))));
        assert!(matches!(stream.poll_next_unpin(&mut cx), Poll::Pending));
    }

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (mut sink, mut stream) = DecodeStream::channel();

        sink.field("a", "1").await.unwrap();
        sink.field("b", "2").await.unwrap();
        sink.end().await.unwrap();

        assert!(matches!(stream.next().await, Some(DecodeEvent::Field { .. })));
        assert!(matches!(stream.next().await, Some(DecodeEvent::Field { .. })));
        assert!(matches!(stream.next().await, Some(DecodeEvent::End)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn dropped_stream_aborts_the_sink() {
        let (mut sink, stream) = DecodeStream::channel();
        drop(stream);

        assert!(sink.field("a", "1").await.is_err());
    }
}
