//! The multipart form-data decoder.
//!
//! Drives [`MultipartCodec`] over the request body and translates its frames
//! into the engine's event contract: non-file parts accumulate into `field`
//! events, file parts open a [`FileStream`] whose chunks pass through as
//! they are parsed. Several files per request are possible; they are
//! emitted strictly in wire order.

use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::{debug, error};

use crate::codec::{MultipartCodec, PartItem};
use crate::decoder::{DecodeAbort, DecodeStream, DecoderFactory, DecoderOptions, DigestPipeline, EventSink};
use crate::protocol::{DecodeError, FileSink, FileStream, UploadRequest};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Factory for multipart form-data bodies.
///
/// Declines requests whose content type carries no `boundary` parameter;
/// the dispatcher reports those as unsupported media.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultipartDecoderFactory;

impl DecoderFactory for MultipartDecoderFactory {
    fn create(&self, request: UploadRequest, options: &DecoderOptions) -> Option<DecodeStream> {
        let boundary = request.header().multipart_boundary()?;
        debug!(boundary = %boundary, "decoding request as multipart form data");

        let (sink, stream) = DecodeStream::channel();
        let options = options.clone();
        tokio::spawn(async move {
            if run_multipart(request, boundary, options, sink).await.is_err() {
                debug!("multipart decoding canceled, event consumer is gone");
            }
        });

        Some(stream)
    }
}

/// One file part in flight: its sink plus the digests accumulating over it.
struct ActiveFile {
    sink: FileSink,
    digests: Option<DigestPipeline>,
}

async fn run_multipart(
    request: UploadRequest,
    boundary: String,
    options: DecoderOptions,
    mut sink: EventSink,
) -> Result<(), DecodeAbort> {
    let (_header, body, flow) = request.into_parts();
    let mut frames = FramedRead::with_capacity(StreamReader::new(body), MultipartCodec::new(&boundary), READ_BUFFER_SIZE);

    let mut active: Option<ActiveFile> = None;
    let mut field: Option<(String, BytesMut)> = None;

    loop {
        match frames.next().await {
            Some(Ok(PartItem::Headers(part))) => {
                if part.is_file() {
                    let name = part.filename.as_deref().map(basename).unwrap_or_default();
                    let media_type = part.content_type.unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
                    let (file_sink, file) = FileStream::channel(name, media_type, Arc::clone(&flow));
                    let digests = (!options.hashes.is_empty()).then(|| DigestPipeline::new(&options.hashes));

                    active = Some(ActiveFile { sink: file_sink, digests });
                    sink.file(part.name, file, None).await?;
                } else {
                    field = Some((part.name.unwrap_or_default(), BytesMut::new()));
                }
            }

            Some(Ok(PartItem::Data(bytes))) => {
                if let Some(file) = active.as_mut() {
                    if let Some(digests) = file.digests.as_mut() {
                        digests.update(&bytes);
                    }
                    file.sink.data(bytes).await;
                } else if let Some((_, value)) = field.as_mut() {
                    value.extend_from_slice(&bytes);
                }
            }

            Some(Ok(PartItem::PartEnd)) => {
                if let Some(file) = active.take() {
                    file.sink.finish(file.digests.map(DigestPipeline::finalize));
                } else if let Some((name, value)) = field.take() {
                    sink.field(name, String::from_utf8_lossy(&value).into_owned()).await?;
                }
            }

            Some(Ok(PartItem::End)) => return sink.end().await,

            Some(Err(cause)) => {
                error!(cause = %cause, "multipart decoding failed");
                // a mid-stream fault belongs to the active file first, then
                // to the whole request
                if let Some(file) = active.take() {
                    file.sink.error(DecodeError::invalid_body(cause.to_string())).await;
                }
                return sink.error(cause).await;
            }

            // the codec always emits End or an error before the underlying
            // stream runs dry
            None => return Ok(()),
        }
    }
}

/// Strips any path information from a client-supplied filename.
fn basename(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}
