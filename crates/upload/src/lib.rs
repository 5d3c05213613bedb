//! An asynchronous streaming file upload engine
//!
//! This crate turns an inbound HTTP request's raw byte stream into typed
//! file and field events without buffering the body in memory. It is
//! framework-agnostic: any transport that can hand over headers, a byte
//! stream and a pause/resume capability can feed it.
//!
//! # Features
//!
//! - Content-type based decoder selection through an ordered registry
//! - Streaming `multipart/form-data` decoding with an incremental codec
//! - Raw octet-stream uploads keyed by the `X-File-Name` convention header
//! - File bytes delivered to handlers as they arrive off the wire
//! - Incremental md5/sha1/sha256 digests finalized at stream end
//! - Deferred mode: hand control back before processing completes
//! - Backpressure end to end: bounded channels plus transport flow control
//! - Status-classified errors for clean mapping onto HTTP responses
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use futures::stream;
//! use http::Request;
//! use tracing::{info, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! use micro_upload::decoder::HashAlgorithm;
//! use micro_upload::dispatch::{handler_fn, UploadOptions, Uploader};
//! use micro_upload::protocol::UploadRequest;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize logging
//!     let subscriber = FmtSubscriber::builder()
//!         .with_max_level(Level::INFO)
//!         .finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     let uploader = Uploader::with_defaults();
//!     let upload = uploader.upload(
//!         UploadOptions::new()
//!             .limit(32 * 1024 * 1024)
//!             .hashes([HashAlgorithm::Md5, HashAlgorithm::Sha1]),
//!         handler_fn(|context| async move {
//!             let meta = Arc::clone(context.file.meta());
//!             let bytes = context.file.into_bytes().await?;
//!             info!(
//!                 name = meta.name(),
//!                 size = bytes.len(),
//!                 md5 = meta.digest("md5"),
//!                 "received file"
//!             );
//!             Ok(())
//!         }),
//!     );
//!
//!     // the transport layer builds one UploadRequest per inbound request
//!     let header = Request::builder()
//!         .header("content-type", "application/octet-stream")
//!         .header("x-file-name", "photo.png")
//!         .body(())
//!         .unwrap();
//!     let body = stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(b"raw image bytes"))]);
//!     let request = UploadRequest::without_flow(header, body);
//!
//!     let outcome = upload.handle(request).await;
//!     info!("upload finished: {outcome:?}");
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`protocol`]: The request contract, decoded events, file streaming and
//!   error types
//! - [`codec`]: Wire-format parsing (the multipart state machine)
//! - [`decoder`]: Decoders, the digest pipeline and the selection registry
//! - [`dispatch`]: The orchestrating middleware and the handler contract
//!
//! # Core Components
//!
//! ## Decoder selection
//!
//! A [`decoder::DecoderRegistry`] holds ordered (content-type matcher →
//! decoder factory) bindings. Selection tests the request's raw content
//! type against the matchers in registration order; the first match wins.
//! The registry is built once at startup and is immutable afterwards.
//!
//! ## Event flow
//!
//! The selected decoder parses the body into
//! [`protocol::DecodeEvent`]s (field, file, end, error) delivered through
//! one bounded, ordered channel per request. The dispatch loop merges
//! fields into a [`protocol::FieldMap`] and invokes the handler once per
//! file with a frozen snapshot of the fields decoded so far.
//!
//! ## Backpressure
//!
//! File bytes travel through bounded channels; a slow handler suspends the
//! decoder, which stops reading the transport. Handlers can additionally
//! pause the transport itself through the file's flow-control delegation.
//!
//! ## Deferred mode
//!
//! With [`dispatch::UploadOptions::defer`], the dispatcher returns a
//! [`dispatch::DeferredUpload`] handle immediately and keeps processing in
//! the background; completion and failures are then only observable as
//! events on that handle. Selection and limit errors still surface
//! synchronously, because no stream exists yet to defer against.
//!
//! # Limitations
//!
//! - Multipart part header blocks are capped at 8KB
//! - Nested `multipart/mixed` parts are not decoded (they surface as plain
//!   file content)
//! - No built-in timeout: timeout policy belongs to the limiter or the
//!   surrounding transport

pub mod codec;
pub mod decoder;
pub mod dispatch;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
