//! Core protocol abstractions of the upload engine.
//!
//! This module provides the building blocks everything else is assembled
//! from: the inbound request contract, the decoded event vocabulary, file
//! streaming and error types.
//!
//! # Architecture
//!
//! - **Request Contract** ([`request`]): what the engine requires from its
//!   transport
//!   - [`UploadRequest`]: headers + body stream + flow control for one upload
//!   - [`RequestHeader`]: wraps `http::Request<()>` with upload-specific
//!     accessors
//!   - [`Pausable`] / [`PauseGuard`]: transport flow-control capability and
//!     its scoped acquisition
//!
//! - **Events** ([`event`]): the single decoder-to-dispatcher vocabulary
//!   - [`DecodeEvent`]: field / file / end / error, in wire arrival order
//!   - [`FileAck`]: explicit delivery handshake for file events
//!
//! - **File Streaming** ([`file`]): one uploaded file's bytes and metadata
//!   - [`FileStream`]: consumer side, a `futures::Stream` of chunks
//!   - [`FileSink`]: producer side, owned by the decoder
//!   - [`FileMeta`]: shared name / media type / size / activity / digests
//!
//! - **Field Accumulation** ([`field`]): non-file form data
//!   - [`FieldMap`] / [`FieldValue`]: repeat-becomes-sequence merging
//!
//! - **Error Handling** ([`error`]): status-classified failures
//!   - [`UploadError`]: top-level error with HTTP status classification
//!   - [`DecodeError`]: wire-level body faults
//!   - [`HandlerError`]: consumer-originated processing faults

mod event;
pub use event::DecodeEvent;
pub use event::FileAck;

mod field;
pub use field::FieldMap;
pub use field::FieldValue;

mod file;
pub use file::FileMeta;
pub use file::FileSink;
pub use file::FileStream;

mod request;
pub use request::BodyStream;
pub use request::NoPause;
pub use request::Pausable;
pub use request::PauseGuard;
pub use request::RequestHeader;
pub use request::UploadRequest;
pub use request::X_FILE_NAME;

mod error;
pub use error::DecodeError;
pub use error::HandlerError;
pub use error::UploadError;
