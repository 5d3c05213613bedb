//! The raw octet-stream decoder.
//!
//! Handles requests whose body is a single file with no envelope around it,
//! keyed by convention headers: `X-File-Name` carries the filename, the
//! request's own content type becomes the file's media type. The exposed
//! event surface is the multipart one, the greatest common denominator,
//! even though only a single file and no form fields can occur here.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error};

use crate::decoder::{DecodeAbort, DecodeStream, DecoderFactory, DecoderOptions, DigestPipeline, EventSink};
use crate::protocol::{DecodeError, FileAck, FileStream, PauseGuard, UploadRequest};

/// Factory for raw octet-stream bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct OctetStreamDecoderFactory;

impl DecoderFactory for OctetStreamDecoderFactory {
    fn create(&self, request: UploadRequest, options: &DecoderOptions) -> Option<DecodeStream> {
        debug!(file_name = request.header().file_name(), "decoding request as raw octet stream");

        let (sink, stream) = DecodeStream::channel();
        let options = options.clone();
        tokio::spawn(async move {
            if run_octet_stream(request, options, sink).await.is_err() {
                debug!("octet-stream decoding canceled, event consumer is gone");
            }
        });

        Some(stream)
    }
}

async fn run_octet_stream(request: UploadRequest, options: DecoderOptions, mut sink: EventSink) -> Result<(), DecodeAbort> {
    let (header, mut body, flow) = request.into_parts();

    let name = header.file_name().unwrap_or_default().to_string();
    let media_type = header.content_type().unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref()).to_string();
    let (mut file_sink, file) = FileStream::channel(name, media_type, Arc::clone(&flow));
    let mut digests = (!options.hashes.is_empty()).then(|| DigestPipeline::new(&options.hashes));

    // hold the transport until the file event reached its consumer, so no
    // chunk can flow between decoder construction and subscription; the
    // guard resumes on every exit path
    let guard = PauseGuard::acquire(Arc::clone(&flow));
    let (ack, acked) = FileAck::channel();
    sink.file(None, file, Some(ack)).await?;
    // a dropped ack means the consumer went away without acknowledging;
    // resume regardless and let the send side observe the cancellation
    let _ = acked.await;
    guard.release();

    loop {
        match body.next().await {
            Some(Ok(bytes)) => {
                if let Some(digests) = digests.as_mut() {
                    digests.update(&bytes);
                }
                file_sink.data(bytes).await;
            }

            Some(Err(cause)) => {
                error!(cause = %cause, "request stream failed mid upload");
                let cause = DecodeError::io(cause);
                file_sink.error(DecodeError::invalid_body(cause.to_string())).await;
                return sink.error(cause).await;
            }

            None => {
                file_sink.finish(digests.take().map(DigestPipeline::finalize));
                return sink.end().await;
            }
        }
    }
}
