//! The inbound request contract.
//!
//! The engine does not assume a specific web framework. It requires exactly
//! three things from its transport: header access through [`RequestHeader`],
//! a readable byte stream ([`BodyStream`]), and transport-level flow control
//! through the [`Pausable`] capability. [`UploadRequest`] bundles the three
//! for the lifetime of one upload.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use http::request::Parts;
use http::{HeaderMap, Request, header};

/// Convention header carrying the client-supplied filename for raw
/// octet-stream uploads.
pub const X_FILE_NAME: &str = "x-file-name";

/// Transport-level flow control capability.
///
/// `pause` must suspend the underlying byte source from delivering further
/// chunks; `resume` re-enables delivery. Implementations delegate to the
/// owning connection's read side rather than buffering internally: this is
/// the backpressure seam that lets a slow file consumer throttle network
/// reads without unbounded memory growth.
pub trait Pausable: Send + Sync {
    fn pause(&self);
    fn resume(&self);
}

/// Flow control for transports that have none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPause;

impl Pausable for NoPause {
    fn pause(&self) {}
    fn resume(&self) {}
}

/// Scoped transport suspension.
///
/// Acquiring pauses the transport; the guard resumes it when released or
/// dropped, so an early exit can never leak a paused, abandoned connection.
pub struct PauseGuard {
    flow: Arc<dyn Pausable>,
    released: bool,
}

impl PauseGuard {
    pub fn acquire(flow: Arc<dyn Pausable>) -> Self {
        flow.pause();
        Self { flow, released: false }
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.flow.resume();
        }
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for PauseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PauseGuard").field("released", &self.released).finish()
    }
}

/// The headers of one upload request.
///
/// Wraps a `http::Request<()>` and exposes the handful of fields the engine
/// cares about: content type, content length and the filename hint.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHeader {
    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// The raw `Content-Type` header value, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers().get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok())
    }

    /// The declared `Content-Length`, if present and parseable.
    pub fn content_length(&self) -> Option<u64> {
        self.headers().get(header::CONTENT_LENGTH).and_then(|value| value.to_str().ok()).and_then(|value| value.parse().ok())
    }

    /// The client-supplied filename hint carried in `X-File-Name`.
    pub fn file_name(&self) -> Option<&str> {
        self.headers().get(X_FILE_NAME).and_then(|value| value.to_str().ok())
    }

    /// The `boundary` parameter of a multipart content type.
    pub fn multipart_boundary(&self) -> Option<String> {
        let mime: mime::Mime = self.content_type()?.parse().ok()?;
        mime.get_param(mime::BOUNDARY).map(|boundary| boundary.as_str().to_string())
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

/// The raw request body: a stream of byte chunks ending with `None` on
/// normal termination or an `io::Error` on transport failure.
pub type BodyStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// One inbound upload request: headers, body stream and flow control.
///
/// Owned by the surrounding request handling layer, consumed by the decoder
/// factory the registry selects. The header is shared (`Arc`) because the
/// dispatcher and every handler invocation keep a reference to it after the
/// decoder has taken the body.
pub struct UploadRequest {
    header: Arc<RequestHeader>,
    body: BodyStream,
    flow: Arc<dyn Pausable>,
}

impl UploadRequest {
    pub fn new<H, S>(header: H, body: S, flow: Arc<dyn Pausable>) -> Self
    where
        H: Into<RequestHeader>,
        S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
    {
        Self { header: Arc::new(header.into()), body: body.boxed(), flow }
    }

    /// Builds a request over a transport without flow control.
    pub fn without_flow<H, S>(header: H, body: S) -> Self
    where
        H: Into<RequestHeader>,
        S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
    {
        Self::new(header, body, Arc::new(NoPause))
    }

    pub fn header(&self) -> &Arc<RequestHeader> {
        &self.header
    }

    /// Splits the request into its parts, handing the body to a decoder.
    pub fn into_parts(self) -> (Arc<RequestHeader>, BodyStream, Arc<dyn Pausable>) {
        (self.header, self.body, self.flow)
    }
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest").field("header", &self.header).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicIsize, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct CountingFlow {
        depth: AtomicIsize,
    }

    impl Pausable for CountingFlow {
        fn pause(&self) {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }

        fn resume(&self) {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn header(content_type: &str) -> RequestHeader {
        Request::builder().header("content-type", content_type).body(()).unwrap().into()
    }

    #[test]
    fn header_accessors() {
        let request = Request::builder()
            .header("content-type", "application/octet-stream")
            .header("content-length", "42")
            .header("x-file-name", "photo.png")
            .body(())
            .unwrap();
        let header = RequestHeader::from(request);

        assert_eq!(header.content_type(), Some("application/octet-stream"));
        assert_eq!(header.content_length(), Some(42));
        assert_eq!(header.file_name(), Some("photo.png"));
        assert_eq!(header.multipart_boundary(), None);
    }

    #[test]
    fn multipart_boundary_extraction() {
        let header = header("multipart/form-data; boundary=XyZ123");
        assert_eq!(header.multipart_boundary(), Some("XyZ123".to_string()));
    }

    #[test]
    fn pause_guard_releases_on_drop() {
        let flow = Arc::new(CountingFlow::default());

        {
            let _guard = PauseGuard::acquire(Arc::clone(&flow) as Arc<dyn Pausable>);
            assert_eq!(flow.depth.load(Ordering::SeqCst), 1);
        }
        assert_eq!(flow.depth.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pause_guard_releases_once() {
        let flow = Arc::new(CountingFlow::default());

        let guard = PauseGuard::acquire(Arc::clone(&flow) as Arc<dyn Pausable>);
        guard.release();
        assert_eq!(flow.depth.load(Ordering::SeqCst), 0);
    }
}
