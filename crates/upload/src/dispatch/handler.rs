//! The consumer-supplied file handler contract.
//!
//! A handler is invoked once per file, in wire arrival order, never
//! concurrently within one request. Everything an invocation may need is
//! carried in one fixed-shape [`FileContext`]: handlers read the fields
//! they care about and ignore the rest.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::{FieldMap, FileStream, RequestHeader};

/// Everything one file-handler invocation needs.
#[derive(Debug)]
pub struct FileContext {
    /// The file being uploaded, streaming as it arrives off the wire.
    pub file: FileStream,
    /// Name of the form field containing the file, if submitted via a form.
    pub key: Option<String>,
    /// Zero-based index of the file within its request.
    pub index: usize,
    /// Frozen view of the non-file fields decoded before this file's
    /// boundary. Fields arriving later are not visible here.
    pub body: Arc<FieldMap>,
    /// The request this file is transported in.
    pub request: Arc<RequestHeader>,
}

/// Processes uploaded files.
///
/// Returning an error marks the request failed with the handler-error
/// classification; the first error wins and later ones are dropped.
#[async_trait]
pub trait FileHandler: Send + Sync {
    async fn on_file(&self, context: FileContext) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// A [`FileHandler`] built from a plain async function.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> FileHandler for HandlerFn<F>
where
    F: Fn(FileContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Box<dyn Error + Send + Sync>>> + Send,
{
    async fn on_file(&self, context: FileContext) -> Result<(), Box<dyn Error + Send + Sync>> {
        (self.f)(context).await
    }
}

/// Wraps an async function into a [`FileHandler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(FileContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), Box<dyn Error + Send + Sync>>> + Send,
{
    HandlerFn { f }
}
