//! Wire-format codecs for request body encodings.
//!
//! Decoders in this module implement `tokio_util::codec::Decoder` so they
//! can be driven by a `FramedRead` over any byte source, emitting frames as
//! soon as enough input is available.
//!
//! # Components
//!
//! - [`MultipartCodec`]: incremental `multipart/form-data` parser
//! - [`PartItem`]: frames of a decoded multipart body
//! - [`PartHeaders`]: parsed header block of one part
//!
//! The raw octet-stream encoding needs no codec: its body is the file
//! content verbatim and is consumed directly by its decoder.

mod multipart_codec;

pub use multipart_codec::MultipartCodec;
pub use multipart_codec::PartHeaders;
pub use multipart_codec::PartItem;
