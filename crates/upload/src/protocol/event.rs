//! Decoded body events.
//!
//! Every decoder, whatever wire format it parses, reports its results as a
//! sequence of [`DecodeEvent`]s delivered through a single ordered channel
//! per request. The dispatch loop is the only consumer; the tagged variants
//! replace listener registration with one exhaustive `match`.

use futures::channel::oneshot;

use crate::protocol::error::DecodeError;
use crate::protocol::file::FileStream;

/// One decoded element of the request body, in wire arrival order.
#[derive(Debug)]
pub enum DecodeEvent {
    /// A complete non-file form field.
    Field { name: String, value: String },

    /// A file boundary was recognized: the file's live byte stream, the
    /// form key it was submitted under (absent outside form encodings) and
    /// an optional delivery handshake for decoders that hold the transport
    /// until the event reached its consumer.
    File { key: Option<String>, file: FileStream, ack: Option<FileAck> },

    /// The body was fully decoded.
    End,

    /// Decoding failed; no further events follow.
    Error(DecodeError),
}

impl DecodeEvent {
    #[inline]
    pub fn is_field(&self) -> bool {
        matches!(self, DecodeEvent::Field { .. })
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        matches!(self, DecodeEvent::File { .. })
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, DecodeEvent::End)
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, DecodeEvent::Error(_))
    }
}

/// Acknowledgement handshake attached to a file event.
///
/// A decoder that pauses the transport before emitting the file event waits
/// on the paired receiver and resumes only once the dispatcher acknowledged
/// taking the event. This replaces scheduling-order assumptions with an
/// explicit signal: no chunk can flow before the file has a consumer.
#[derive(Debug)]
pub struct FileAck {
    tx: oneshot::Sender<()>,
}

impl FileAck {
    /// Creates the handshake pair; the decoder keeps the receiver.
    pub fn channel() -> (FileAck, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (FileAck { tx }, rx)
    }

    /// Signals the decoder that the file event reached its consumer.
    pub fn acknowledge(self) {
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acknowledge_reaches_the_decoder_side() {
        let (ack, rx) = FileAck::channel();
        ack.acknowledge();
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn dropped_ack_is_observable() {
        let (ack, rx) = FileAck::channel();
        drop(ack);
        assert!(rx.await.is_err());
    }
}
