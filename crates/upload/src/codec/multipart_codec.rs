//! Decoder implementation for `multipart/form-data` bodies.
//!
//! This module provides an incremental parser for the multipart wire format
//! as specified in [RFC 7578](https://tools.ietf.org/html/rfc7578). The body
//! is a sequence of parts separated by a boundary delimiter line; each part
//! carries its own header block followed by raw content.
//!
//! The decoder is a state machine over a byte buffer: it never buffers a
//! whole part, emitting part content as [`PartItem::Data`] frames as soon as
//! the bytes can be proven not to overlap a boundary delimiter.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::DecodeError;

use PartState::*;

/// Maximum size of one part's header block.
const MAX_PART_HEADER_SIZE: usize = 8 * 1024;

/// An incremental decoder for multipart bodies.
///
/// Construct one per request with the boundary taken from the content-type
/// header. Feed raw body bytes; the decoder yields a frame sequence of the
/// shape `(Headers, Data*, PartEnd)*, End`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartCodec {
    /// The full part delimiter: `\r\n--{boundary}`
    delimiter: Vec<u8>,
    state: PartState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    /// Scan for the first boundary marker, ignoring any preamble
    Preamble,
    /// Decide what follows a boundary marker: next part or closing dashes
    BoundaryEnd,
    /// Read a part's header block until the blank line
    Headers,
    /// Stream part content, watching for the next delimiter
    Data,
    /// Closing delimiter seen; remaining bytes are epilogue
    Epilogue,
    /// Final state after the end frame was emitted
    Done,
}

/// One frame of a decoded multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartItem {
    /// A part's header block: the part starts here
    Headers(PartHeaders),
    /// A chunk of the current part's content
    Data(Bytes),
    /// The current part's content is complete
    PartEnd,
    /// The closing delimiter was reached; no parts follow
    End,
}

impl PartItem {
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, PartItem::Data(_))
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, PartItem::End)
    }

    /// Consumes the frame and returns the contained bytes if this is a
    /// `Data` frame.
    pub fn into_data(self) -> Option<Bytes> {
        match self {
            PartItem::Data(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// The parsed header block of one part.
///
/// A part carrying a `filename` parameter in its `Content-Disposition` is a
/// file part; anything else is a plain form field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    /// The `name` parameter of the content disposition
    pub name: Option<String>,
    /// The `filename` parameter of the content disposition, verbatim
    pub filename: Option<String>,
    /// The part's own `Content-Type` header value
    pub content_type: Option<String>,
}

impl PartHeaders {
    /// Returns true if this part carries file content.
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }
}

impl MultipartCodec {
    /// Creates a decoder for the given boundary string.
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());
        Self { delimiter, state: Preamble }
    }
}

impl Decoder for MultipartCodec {
    type Item = PartItem;
    type Error = DecodeError;

    /// Decodes the next frame from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(item))` when a frame is complete
    /// - `Ok(None)` when more data is needed
    /// - `Err(DecodeError)` if the multipart framing is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                Preamble => {
                    // the first boundary line has no leading CRLF
                    let marker_len = self.delimiter.len() - 2;
                    match find(src, &self.delimiter[2..]) {
                        Some(idx) => {
                            trace!(preamble = idx, "found opening boundary");
                            src.advance(idx + marker_len);
                            self.state = BoundaryEnd;
                        }
                        None => {
                            // drop scanned preamble, keep a possible marker prefix
                            let keep = marker_len - 1;
                            if src.len() > keep {
                                let scanned = src.len() - keep;
                                src.advance(scanned);
                            }
                            return Ok(None);
                        }
                    }
                }

                BoundaryEnd => {
                    // transport padding may precede the line break
                    while !src.is_empty() && (src[0] == b' ' || src[0] == b'\t') {
                        src.advance(1);
                    }
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    match (src[0], src[1]) {
                        (b'\r', b'\n') => {
                            src.advance(2);
                            self.state = Headers;
                        }
                        (b'-', b'-') => {
                            src.advance(2);
                            self.state = Epilogue;
                        }
                        _ => return Err(DecodeError::invalid_boundary("invalid bytes after boundary delimiter")),
                    }
                }

                Headers => {
                    // a part may carry no headers at all
                    if src.len() >= 2 && src[0] == b'\r' && src[1] == b'\n' {
                        src.advance(2);
                        self.state = Data;
                        return Ok(Some(PartItem::Headers(PartHeaders::default())));
                    }
                    match find(src, b"\r\n\r\n") {
                        Some(idx) => {
                            let block = src.split_to(idx + 4);
                            let headers = parse_part_headers(&block[..idx])?;
                            trace!(?headers, "decoded part headers");
                            self.state = Data;
                            return Ok(Some(PartItem::Headers(headers)));
                        }
                        None => {
                            ensure!(
                                src.len() <= MAX_PART_HEADER_SIZE,
                                DecodeError::invalid_part_header("part header block exceed the limit")
                            );
                            return Ok(None);
                        }
                    }
                }

                Data => match find(src, &self.delimiter) {
                    Some(0) => {
                        let delimiter_len = self.delimiter.len();
                        src.advance(delimiter_len);
                        self.state = BoundaryEnd;
                        return Ok(Some(PartItem::PartEnd));
                    }
                    Some(idx) => {
                        let bytes = src.split_to(idx).freeze();
                        trace!(len = bytes.len(), "decoded part data up to delimiter");
                        return Ok(Some(PartItem::Data(bytes)));
                    }
                    None => {
                        // everything but a possible delimiter prefix is content
                        let keep = self.delimiter.len() - 1;
                        if src.len() > keep {
                            let bytes = src.split_to(src.len() - keep).freeze();
                            trace!(len = bytes.len(), "decoded part data");
                            return Ok(Some(PartItem::Data(bytes)));
                        }
                        return Ok(None);
                    }
                },

                Epilogue => {
                    src.clear();
                    self.state = Done;
                    return Ok(Some(PartItem::End));
                }

                Done => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }

    /// Handles the end of the underlying byte stream.
    ///
    /// The closing delimiter must have been seen by then; running dry in any
    /// earlier state means the body was truncated.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.state {
            Epilogue | Done => self.decode(src),
            _ => {
                if let Some(item) = self.decode(src)? {
                    return Ok(Some(item));
                }
                Err(DecodeError::UnexpectedEof)
            }
        }
    }
}

/// Finds the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Parses one part's header block (without the terminating blank line).
fn parse_part_headers(block: &[u8]) -> Result<PartHeaders, DecodeError> {
    let text = std::str::from_utf8(block).map_err(|_| DecodeError::invalid_part_header("part header block is not utf-8"))?;

    let mut headers = PartHeaders::default();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (name, value) =
            line.split_once(':').ok_or_else(|| DecodeError::invalid_part_header(format!("malformed part header line: {line}")))?;
        let value = value.trim();

        if name.eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').skip(1) {
                let Some((key, raw)) = param.split_once('=') else {
                    continue;
                };
                let raw = raw.trim().trim_matches('"');
                match key.trim() {
                    "name" => headers.name = Some(raw.to_string()),
                    "filename" => headers.filename = Some(raw.to_string()),
                    _ => {}
                }
            }
        } else if name.eq_ignore_ascii_case("content-type") {
            headers.content_type = Some(value.to_string());
        }
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds the body in the given slices, draining frames after each feed
    /// and at end of input, the way a framed reader would.
    fn decode_in_feeds(boundary: &str, feeds: &[&[u8]]) -> Result<Vec<PartItem>, DecodeError> {
        let mut codec = MultipartCodec::new(boundary);
        let mut buffer = BytesMut::new();
        let mut items = Vec::new();

        for feed in feeds {
            buffer.extend_from_slice(feed);
            while let Some(item) = codec.decode(&mut buffer)? {
                items.push(item);
            }
        }
        while let Some(item) = codec.decode_eof(&mut buffer)? {
            items.push(item);
        }
        Ok(items)
    }

    fn collect_part_data(items: &[PartItem]) -> Vec<u8> {
        items.iter().filter_map(|item| item.clone().into_data()).fold(Vec::new(), |mut acc, bytes| {
            acc.extend_from_slice(&bytes);
            acc
        })
    }

    #[test]
    fn test_basic() {
        let body = b"--AaB03x\r\n\
            Content-Disposition: form-data; name=\"greeting\"\r\n\
            \r\n\
            hello\r\n\
            --AaB03x\r\n\
            Content-Disposition: form-data; name=\"upload\"; filename=\"hello.txt\"\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            hello world\r\n\
            --AaB03x--\r\n";

        let items = decode_in_feeds("AaB03x", &[body]).unwrap();

        let PartItem::Headers(first) = &items[0] else {
            panic!("expected part headers, got {:?}", items[0]);
        };
        assert_eq!(first.name.as_deref(), Some("greeting"));
        assert!(!first.is_file());

        let end_of_field = items.iter().position(|item| matches!(item, PartItem::PartEnd)).unwrap();
        assert_eq!(collect_part_data(&items[..end_of_field]), b"hello");

        let PartItem::Headers(second) = &items[end_of_field + 1] else {
            panic!("expected file part headers");
        };
        assert_eq!(second.name.as_deref(), Some("upload"));
        assert_eq!(second.filename.as_deref(), Some("hello.txt"));
        assert_eq!(second.content_type.as_deref(), Some("text/plain"));
        assert!(second.is_file());

        assert_eq!(collect_part_data(&items[end_of_field + 1..]), b"hello world");
        assert!(items.last().unwrap().is_end());
    }

    #[test]
    fn test_preamble_is_ignored() {
        let body = b"this preamble should be skipped\r\n\
            --bound\r\n\
            \r\n\
            data\r\n\
            --bound--\r\n";

        let items = decode_in_feeds("bound", &[body]).unwrap();
        assert!(matches!(items[0], PartItem::Headers(_)));
        assert_eq!(collect_part_data(&items), b"data");
        assert!(items.last().unwrap().is_end());
    }

    #[test]
    fn test_empty_form() {
        let items = decode_in_feeds("bound", &[b"--bound--\r\n"]).unwrap();
        assert_eq!(items, vec![PartItem::End]);
    }

    #[test]
    fn test_split_delivery_across_delimiter() {
        let body: &[u8] = b"--xyz\r\n\
            Content-Disposition: form-data; name=\"f\"; filename=\"a.bin\"\r\n\
            \r\n\
            0123456789\r\n\
            --xyz--\r\n";

        // feed one byte at a time: every partial-delimiter hold-back path runs
        let feeds: Vec<&[u8]> = body.chunks(1).collect();
        let items = decode_in_feeds("xyz", &feeds).unwrap();

        assert_eq!(collect_part_data(&items), b"0123456789");
        assert!(items.last().unwrap().is_end());
    }

    #[test]
    fn test_data_with_delimiter_lookalike() {
        let body = b"--xyz\r\n\
            \r\n\
            line one\r\n--xy not a boundary\r\nline two\r\n\
            --xyz--\r\n";

        let feeds: Vec<&[u8]> = body.chunks(7).collect();
        let items = decode_in_feeds("xyz", &feeds).unwrap();

        assert_eq!(collect_part_data(&items), b"line one\r\n--xy not a boundary\r\nline two");
    }

    #[test]
    fn test_multiple_fields_share_one_name() {
        let body = b"--b\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\
            \r\n\
            1\r\n\
            --b\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\
            \r\n\
            2\r\n\
            --b--\r\n";

        let items = decode_in_feeds("b", &[body]).unwrap();
        let headers: Vec<_> = items
            .iter()
            .filter_map(|item| match item {
                PartItem::Headers(headers) => Some(headers.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(headers, vec![Some("a".to_string()), Some("a".to_string())]);
    }

    #[test]
    fn test_transport_padding_after_boundary() {
        let body = b"--pad  \r\n\
            \r\n\
            x\r\n\
            --pad-- \r\n";

        let items = decode_in_feeds("pad", &[body]).unwrap();
        assert_eq!(collect_part_data(&items), b"x");
        assert!(items.last().unwrap().is_end());
    }

    #[test]
    fn test_invalid_bytes_after_boundary() {
        let result = decode_in_feeds("b", &[b"--bzz\r\ndata\r\n--b--\r\n"]);
        assert!(matches!(result, Err(DecodeError::InvalidBoundary { .. })));
    }

    #[test]
    fn test_truncated_body() {
        let result = decode_in_feeds("b", &[b"--b\r\n\r\npartial data without closing"]);
        assert!(matches!(result, Err(DecodeError::UnexpectedEof)));
    }

    #[test]
    fn test_oversized_part_header_block() {
        let mut body = Vec::from(&b"--b\r\nContent-Disposition: form-data; name=\"x\"\r\nX-Filler: "[..]);
        body.extend(vec![b'a'; MAX_PART_HEADER_SIZE + 1]);

        let result = decode_in_feeds("b", &[&body]);
        assert!(matches!(result, Err(DecodeError::InvalidPartHeader { .. })));
    }

    #[test]
    fn test_malformed_part_header_line() {
        let result = decode_in_feeds("b", &[b"--b\r\nno colon here\r\n\r\nx\r\n--b--\r\n"]);
        assert!(matches!(result, Err(DecodeError::InvalidPartHeader { .. })));
    }

    #[test]
    fn test_unquoted_disposition_params() {
        let body = b"--b\r\n\
            Content-Disposition: form-data; name=plain; filename=raw.bin\r\n\
            \r\n\
            x\r\n\
            --b--\r\n";

        let items = decode_in_feeds("b", &[body]).unwrap();
        let PartItem::Headers(headers) = &items[0] else {
            panic!("expected part headers");
        };
        assert_eq!(headers.name.as_deref(), Some("plain"));
        assert_eq!(headers.filename.as_deref(), Some("raw.bin"));
    }

    #[test]
    fn test_epilogue_is_discarded() {
        let body = b"--b\r\n\r\nx\r\n--b--\r\nepilogue junk that must not surface";
        let items = decode_in_feeds("b", &[body]).unwrap();
        assert!(items.last().unwrap().is_end());
        assert_eq!(collect_part_data(&items), b"x");
    }
}
