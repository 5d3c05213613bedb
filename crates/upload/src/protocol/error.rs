use std::error::Error;
use std::io;

use http::StatusCode;
use thiserror::Error;

/// Top-level error produced while processing one upload request.
///
/// Each variant carries a status classification so the surrounding request
/// handling layer can map failures onto HTTP responses without inspecting
/// error internals: see [`UploadError::status`].
#[derive(Debug, Error)]
pub enum UploadError {
    /// No registered decoder accepts the request's content type.
    #[error("unsupported media type: {content_type:?}")]
    UnsupportedMediaType { content_type: String },

    /// The limiter rejected the request before decoding started.
    #[error("payload too large: content length {length} exceed the limit {limit}")]
    PayloadTooLarge { length: u64, limit: u64 },

    /// The request body is malformed at the wire level.
    #[error("decode error: {source}")]
    Decode {
        #[from]
        source: DecodeError,
    },

    /// A consumer-supplied file handler reported a failure.
    #[error("handler error: {source}")]
    Handler {
        #[from]
        source: HandlerError,
    },
}

impl UploadError {
    pub fn unsupported_media_type<S: ToString>(content_type: S) -> Self {
        Self::UnsupportedMediaType { content_type: content_type.to_string() }
    }

    pub fn payload_too_large(length: u64, limit: u64) -> Self {
        Self::PayloadTooLarge { length, limit }
    }

    /// Status classification of this failure.
    ///
    /// Decode errors are client-body faults; handler errors originate in the
    /// consumer's own processing logic and classify as internal.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Decode { .. } => StatusCode::BAD_REQUEST,
            Self::Handler { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error raised by a decoder while parsing the request body.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid multipart boundary: {reason}")]
    InvalidBoundary { reason: String },

    #[error("invalid part header: {reason}")]
    InvalidPartHeader { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("unexpected eof while decoding request body")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl DecodeError {
    pub fn invalid_boundary<S: ToString>(str: S) -> Self {
        Self::InvalidBoundary { reason: str.to_string() }
    }

    pub fn invalid_part_header<S: ToString>(str: S) -> Self {
        Self::InvalidPartHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Failure reported by a consumer-supplied file handler.
///
/// Kept distinct from [`DecodeError`] because it does not originate in the
/// wire parser and classifies as an internal fault, not a client one.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct HandlerError {
    #[from]
    source: Box<dyn Error + Send + Sync>,
}

impl HandlerError {
    pub fn new<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self { source: e.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(UploadError::unsupported_media_type("text/csv").status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(UploadError::payload_too_large(200, 100).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(UploadError::from(DecodeError::UnexpectedEof).status(), StatusCode::BAD_REQUEST);
        assert_eq!(UploadError::from(HandlerError::new("disk full")).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn decode_error_wraps_io() {
        let error = DecodeError::io(io::Error::new(io::ErrorKind::ConnectionReset, "peer gone"));
        assert!(matches!(error, DecodeError::Io { .. }));
    }
}
