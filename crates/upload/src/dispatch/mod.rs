//! The dispatch middleware: the engine's orchestrator.
//!
//! [`Uploader`] binds an immutable [`DecoderRegistry`] to per-upload
//! [`UploadOptions`] and a consumer [`FileHandler`], yielding a reusable
//! [`Upload`] that processes one request per call:
//!
//! 1. apply the limiter, if any; rejection aborts before any body byte is
//!    read
//! 2. select a decoder through the registry by content type; no match is
//!    an unsupported-media failure, reported synchronously even in deferred
//!    mode
//! 3. instantiate the decoder against the request
//! 4. consume the decoder's events: merge fields, invoke the handler once
//!    per file with a frozen body snapshot, track the first error
//! 5. in deferred mode, hand control back immediately and report everything
//!    later through the [`DeferredUpload`] handle
//!
//! # Concurrency
//!
//! All events of one request are consumed on one logical execution
//! sequence: the loop awaits each handler before taking the next event, so
//! no two handler invocations for the same request ever overlap. Distinct
//! requests are fully independent.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, error};

use crate::decoder::{DecodeStream, DecoderOptions, DecoderRegistry, HashAlgorithm};
use crate::protocol::{DecodeError, DecodeEvent, FieldMap, HandlerError, RequestHeader, UploadError, UploadRequest};

mod completion;
use completion::CompletionGuard;

mod handler;
pub use handler::FileContext;
pub use handler::FileHandler;
pub use handler::HandlerFn;
pub use handler::handler_fn;

/// Byte-limit policy applied before decoding begins.
///
/// The engine only invokes the limiter; what it computes is the caller's
/// business. Rejection must yield an [`UploadError`] with the appropriate
/// status classification.
pub trait Limiter: Send + Sync {
    fn check(&self, header: &RequestHeader) -> Result<(), UploadError>;
}

/// Stock limiter: rejects requests whose declared content length exceeds a
/// byte ceiling. Requests without a content length pass.
#[derive(Debug, Clone, Copy)]
pub struct ByteLimit {
    limit: u64,
}

impl ByteLimit {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl Limiter for ByteLimit {
    fn check(&self, header: &RequestHeader) -> Result<(), UploadError> {
        match header.content_length() {
            Some(length) if length > self.limit => Err(UploadError::payload_too_large(length, self.limit)),
            _ => Ok(()),
        }
    }
}

/// Per-upload configuration.
#[derive(Default)]
pub struct UploadOptions {
    limiter: Option<Arc<dyn Limiter>>,
    defer: bool,
    decoder: DecoderOptions,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte ceiling enforced before decoding; see [`ByteLimit`].
    pub fn limit(mut self, limit: u64) -> Self {
        self.limiter = Some(Arc::new(ByteLimit::new(limit)));
        self
    }

    /// Replaces the stock limiter with a custom policy.
    pub fn limiter(mut self, limiter: impl Limiter + 'static) -> Self {
        self.limiter = Some(Arc::new(limiter));
        self
    }

    /// Hands control back before body processing completes; the outcome is
    /// then only observable through the [`DeferredUpload`] handle.
    pub fn defer(mut self, defer: bool) -> Self {
        self.defer = defer;
        self
    }

    /// Hash algorithms to compute over each file's content.
    pub fn hashes(mut self, hashes: impl IntoIterator<Item = HashAlgorithm>) -> Self {
        self.decoder.hashes = hashes.into_iter().collect();
        self
    }

    /// Storage path hint forwarded to decoders that spool to disk.
    pub fn temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.decoder.temp_dir = Some(temp_dir.into());
        self
    }

    /// Full decoder passthrough options, forwarded unmodified to the
    /// selected decoder factory.
    pub fn decoder(mut self, decoder: DecoderOptions) -> Self {
        self.decoder = decoder;
        self
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("limiter", &self.limiter.is_some())
            .field("defer", &self.defer)
            .field("decoder", &self.decoder)
            .finish()
    }
}

/// Terminal state of one request's processing.
#[derive(Debug)]
pub enum UploadOutcome {
    /// All files handled, no error.
    Completed { files: usize },
    /// Processing failed; `files` counts handler invocations performed
    /// before the terminal state.
    Failed { error: UploadError, files: usize },
    /// Control was handed back before stream completion; completion or
    /// failure is reported asynchronously on the handle.
    Deferred(DeferredUpload),
}

impl UploadOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, UploadOutcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UploadOutcome::Failed { .. })
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, UploadOutcome::Deferred(_))
    }

    /// The failure, if processing failed.
    pub fn error(&self) -> Option<&UploadError> {
        match self {
            UploadOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Milestone events observable on a deferred upload.
#[derive(Debug)]
pub enum UploadEvent {
    /// A non-file field was decoded.
    Field { name: String },
    /// A file reached its handler.
    File { index: usize, key: Option<String> },
    /// Processing finished without error.
    Completed { files: usize },
    /// Processing failed.
    Failed { error: UploadError, files: usize },
}

/// Live handle to an upload continuing in the background.
///
/// Yields [`UploadEvent`]s as processing progresses; [`Completed`] or
/// [`Failed`] is the last event. Dropping the handle discards later events
/// without stopping the upload.
///
/// [`Completed`]: UploadEvent::Completed
/// [`Failed`]: UploadEvent::Failed
#[derive(Debug)]
pub struct DeferredUpload {
    events: mpsc::UnboundedReceiver<UploadEvent>,
}

impl Stream for DeferredUpload {
    type Item = UploadEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}

/// The dispatch entry point.
///
/// Holds the immutable decoder registry; cheap to share. Binding options
/// and a handler with [`Uploader::upload`] yields the per-route middleware
/// value.
#[derive(Debug, Clone)]
pub struct Uploader {
    registry: Arc<DecoderRegistry>,
}

impl Uploader {
    pub fn new(registry: DecoderRegistry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    /// The stock engine: multipart form data and raw octet streams.
    pub fn with_defaults() -> Self {
        Self::new(DecoderRegistry::with_defaults())
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// Binds options and a file handler into a reusable upload middleware.
    pub fn upload<H>(&self, options: UploadOptions, handler: H) -> Upload<H>
    where
        H: FileHandler,
    {
        Upload { registry: Arc::clone(&self.registry), options, handler: Arc::new(handler) }
    }
}

/// A configured upload middleware; processes one request per call.
pub struct Upload<H> {
    registry: Arc<DecoderRegistry>,
    options: UploadOptions,
    handler: Arc<H>,
}

impl<H> Upload<H>
where
    H: FileHandler + 'static,
{
    /// Processes one request to its terminal outcome.
    pub async fn handle(&self, request: UploadRequest) -> UploadOutcome {
        if let Some(limiter) = &self.options.limiter {
            if let Err(error) = limiter.check(request.header()) {
                debug!(cause = %error, "limiter rejected request before decoding");
                return UploadOutcome::Failed { error, files: 0 };
            }
        }

        let content_type = request.header().content_type().unwrap_or_default().to_string();
        let Some(factory) = self.registry.select(&content_type) else {
            debug!(content_type = %content_type, "no decoder registered for content type");
            return UploadOutcome::Failed { error: UploadError::unsupported_media_type(&content_type), files: 0 };
        };

        let header = Arc::clone(request.header());
        let Some(events) = factory.create(request, &self.options.decoder) else {
            debug!(content_type = %content_type, "decoder declined the request");
            return UploadOutcome::Failed { error: UploadError::unsupported_media_type(&content_type), files: 0 };
        };

        if self.options.defer {
            let (milestones, handle) = mpsc::unbounded();
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let (files, failure) = run_events(events, handler, header, Some(&milestones)).await;
                let terminal = match failure {
                    Some(error) => {
                        debug!(cause = %error, "deferred upload failed");
                        UploadEvent::Failed { error, files }
                    }
                    None => UploadEvent::Completed { files },
                };
                let _ = milestones.unbounded_send(terminal);
            });
            debug!("deferred handoff, body processing continues in background");
            return UploadOutcome::Deferred(DeferredUpload { events: handle });
        }

        let handler = Arc::clone(&self.handler);
        let (files, failure) = run_events(events, handler, header, None).await;
        match failure {
            Some(error) => UploadOutcome::Failed { error, files },
            None => UploadOutcome::Completed { files },
        }
    }
}

impl<H> fmt::Debug for Upload<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload").field("options", &self.options).finish_non_exhaustive()
    }
}

/// The per-request event loop shared by both completion modes.
///
/// Returns the number of handler invocations performed and the first
/// recorded failure, if any. Decoder events arrive on one ordered channel;
/// the loop awaits every handler invocation inline, which is what
/// serializes file processing within a request.
async fn run_events<H>(
    mut events: DecodeStream,
    handler: Arc<H>,
    request: Arc<RequestHeader>,
    milestones: Option<&mpsc::UnboundedSender<UploadEvent>>,
) -> (usize, Option<UploadError>)
where
    H: FileHandler,
{
    let mut fields = FieldMap::new();
    let mut completion = CompletionGuard::new();
    let mut files = 0usize;

    while let Some(event) = events.next().await {
        match event {
            DecodeEvent::Field { name, value } => {
                if let Some(milestones) = milestones {
                    let _ = milestones.unbounded_send(UploadEvent::Field { name: name.clone() });
                }
                fields.insert(name, value);
            }

            DecodeEvent::File { key, file, ack } => {
                let index = files;
                if let Some(milestones) = milestones {
                    let _ = milestones.unbounded_send(UploadEvent::File { index, key: key.clone() });
                }

                // the body snapshot freezes the fields seen so far; fields
                // decoded after this boundary stay invisible to this handler
                let context = FileContext { file, key, index, body: Arc::new(fields.clone()), request: Arc::clone(&request) };

                if let Some(ack) = ack {
                    ack.acknowledge();
                }

                let result = handler.on_file(context).await;
                files += 1;

                if let Err(cause) = result {
                    error!(cause = %cause, index, "file handler failed");
                    // a handler that merely propagates the file's own wire
                    // fault has not failed itself: keep the client-body
                    // classification
                    let error = match cause.downcast::<DecodeError>() {
                        Ok(decode) => UploadError::from(*decode),
                        Err(cause) => UploadError::from(HandlerError::new(cause)),
                    };
                    completion.fail(error);
                }
            }

            DecodeEvent::End => break,

            DecodeEvent::Error(cause) => {
                completion.fail(UploadError::from(cause));
                break;
            }
        }
    }

    (files, completion.into_error())
}
