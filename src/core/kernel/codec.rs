use crate::core::errors::TwitterResult;
use crate::streaming::message::StreamMessage;
use tracing::warn;

/// Codec trait for turning one line of a streaming body into a typed message
///
/// Framing (splitting the body into lines, dropping keep-alives) happens at the
/// transport level; a codec only ever sees one complete, non-blank line.
pub trait LineCodec: Send + Sync + 'static {
    /// The type representing parsed messages from this stream
    type Message: Send;

    /// Decode a single line
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Line was ignored by the codec
    /// - `Err(error)` - Failed to decode the line
    fn decode_line(&self, line: &str) -> TwitterResult<Option<Self::Message>>;
}

/// Strict codec: every unrecognized line is an error
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamCodec;

impl LineCodec for StreamCodec {
    type Message = StreamMessage;

    fn decode_line(&self, line: &str) -> TwitterResult<Option<StreamMessage>> {
        StreamMessage::parse(line).map(Some)
    }
}

/// Wraps a codec so lines it cannot decode come back as `StreamMessage::Raw`
/// holding the original text instead of failing the stream
#[derive(Debug, Clone, Copy, Default)]
pub struct Lenient<C> {
    inner: C,
}

impl<C> Lenient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C> LineCodec for Lenient<C>
where
    C: LineCodec<Message = StreamMessage>,
{
    type Message = StreamMessage;

    fn decode_line(&self, line: &str) -> TwitterResult<Option<StreamMessage>> {
        match self.inner.decode_line(line) {
            Ok(message) => Ok(message),
            Err(e) => {
                warn!(error = %e, "Undecodable stream line kept as raw");
                Ok(Some(StreamMessage::Raw(line.to_string())))
            }
        }
    }
}
