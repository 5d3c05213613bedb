//! Decoder selection by content type.
//!
//! The registry is an ordered list of (matcher, factory) bindings built once
//! at startup and read-only afterwards: configuration is an explicit value
//! passed into the dispatch entry point, never hidden process-wide state.

use std::fmt;
use std::sync::Arc;

use crate::decoder::{DecoderFactory, MultipartDecoderFactory, OctetStreamDecoderFactory};

/// Decides whether a decoder binding applies to a request's content type.
pub trait ContentTypeMatcher: Send + Sync {
    /// `content_type` is the raw header value, e.g.
    /// `multipart/form-data; boundary=xyz`.
    fn matches(&self, content_type: &str) -> bool;
}

/// Case-insensitive substring matcher, the registry's stock pattern form.
#[derive(Debug, Clone)]
pub struct SubstringMatcher {
    needle: String,
}

impl SubstringMatcher {
    pub fn new(needle: impl Into<String>) -> Self {
        Self { needle: needle.into().to_ascii_lowercase() }
    }
}

impl ContentTypeMatcher for SubstringMatcher {
    fn matches(&self, content_type: &str) -> bool {
        content_type.to_ascii_lowercase().contains(&self.needle)
    }
}

struct FnMatcher<F: Fn(&str) -> bool>(F);

impl<F: Fn(&str) -> bool + Send + Sync> ContentTypeMatcher for FnMatcher<F> {
    fn matches(&self, content_type: &str) -> bool {
        (self.0)(content_type)
    }
}

/// Wraps a plain predicate into a [`ContentTypeMatcher`].
pub fn fn_matcher<F>(f: F) -> impl ContentTypeMatcher
where
    F: Fn(&str) -> bool + Send + Sync,
{
    FnMatcher(f)
}

struct DecoderBinding {
    matcher: Box<dyn ContentTypeMatcher>,
    factory: Arc<dyn DecoderFactory>,
}

/// Ordered content-type bindings; first registered, first tried.
pub struct DecoderRegistry {
    bindings: Vec<DecoderBinding>,
}

impl DecoderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder { bindings: Vec::new() }
    }

    /// The stock registry: multipart form data first, then raw octet
    /// streams.
    pub fn with_defaults() -> Self {
        Self::builder()
            .register(SubstringMatcher::new("multipart"), MultipartDecoderFactory)
            .register(SubstringMatcher::new("octet-stream"), OctetStreamDecoderFactory)
            .build()
    }

    /// Returns the factory of the first binding accepting `content_type`.
    ///
    /// Registration order is the only priority; `None` means the media type
    /// is unsupported.
    pub fn select(&self, content_type: &str) -> Option<Arc<dyn DecoderFactory>> {
        self.bindings.iter().find(|binding| binding.matcher.matches(content_type)).map(|binding| Arc::clone(&binding.factory))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderRegistry").field("bindings", &self.bindings.len()).finish()
    }
}

/// Builder for a [`DecoderRegistry`]; the built registry is immutable.
pub struct RegistryBuilder {
    bindings: Vec<DecoderBinding>,
}

impl RegistryBuilder {
    /// Appends a binding; earlier registrations take precedence.
    pub fn register<M, F>(mut self, matcher: M, factory: F) -> Self
    where
        M: ContentTypeMatcher + 'static,
        F: DecoderFactory + 'static,
    {
        self.bindings.push(DecoderBinding { matcher: Box::new(matcher), factory: Arc::new(factory) });
        self
    }

    pub fn build(self) -> DecoderRegistry {
        DecoderRegistry { bindings: self.bindings }
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder").field("bindings", &self.bindings.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::decoder::{DecodeStream, DecoderOptions};
    use crate::protocol::UploadRequest;

    use super::*;

    struct TaggedFactory {
        tag: usize,
        selected: Arc<AtomicUsize>,
    }

    impl DecoderFactory for TaggedFactory {
        fn create(&self, _request: UploadRequest, _options: &DecoderOptions) -> Option<DecodeStream> {
            self.selected.store(self.tag, Ordering::SeqCst);
            None
        }
    }

    fn tagged_registry(selected: &Arc<AtomicUsize>) -> DecoderRegistry {
        DecoderRegistry::builder()
            .register(SubstringMatcher::new("multipart"), TaggedFactory { tag: 1, selected: Arc::clone(selected) })
            .register(SubstringMatcher::new("multi"), TaggedFactory { tag: 2, selected: Arc::clone(selected) })
            .register(fn_matcher(|ct| ct.ends_with("/csv")), TaggedFactory { tag: 3, selected: Arc::clone(selected) })
            .build()
    }

    #[tokio::test]
    async fn first_registered_binding_wins() {
        let selected = Arc::new(AtomicUsize::new(0));
        let registry = tagged_registry(&selected);

        // both the "multipart" and "multi" matchers accept this; the first
        // registered binding must be chosen
        let factory = registry.select("multipart/form-data; boundary=x").unwrap();
        let request = UploadRequest::without_flow(
            http::Request::builder().body(()).unwrap(),
            futures::stream::empty::<Result<bytes::Bytes, std::io::Error>>(),
        );
        let _ = factory.create(request, &DecoderOptions::default());
        assert_eq!(selected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unmatched_content_type_selects_nothing() {
        let selected = Arc::new(AtomicUsize::new(0));
        let registry = tagged_registry(&selected);
        assert!(registry.select("application/json").is_none());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let selected = Arc::new(AtomicUsize::new(0));
        let registry = tagged_registry(&selected);
        assert!(registry.select("MULTIPART/Form-Data; boundary=x").is_some());
    }

    #[test]
    fn predicate_matchers_participate_in_order() {
        let selected = Arc::new(AtomicUsize::new(0));
        let registry = tagged_registry(&selected);
        assert!(registry.select("text/csv").is_some());
    }

    #[test]
    fn default_bindings() {
        let registry = DecoderRegistry::with_defaults();
        assert_eq!(registry.len(), 2);
        assert!(registry.select("multipart/form-data; boundary=x").is_some());
        assert!(registry.select("application/octet-stream").is_some());
        assert!(registry.select("text/plain").is_none());
    }
}
