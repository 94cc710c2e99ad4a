use crate::core::errors::{TwitterError, TwitterResult};
use crate::core::kernel::codec::LineCodec;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Longest line the framer buffers before giving up on it
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a chunked body into lines. Blank lines are keep-alives and are
/// dropped; a line may span any number of chunks.
///
/// A line longer than the limit is reported once as `TwitterError::Parse`
/// and skipped up to its newline; framing resumes with the next line.
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    max_line: usize,
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            scanned: 0,
            max_line,
            discarding: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete, non-blank line, if one is buffered
    pub fn next_line(&mut self) -> Option<TwitterResult<String>> {
        loop {
            let found = self.buffer[self.scanned..].iter().position(|b| *b == b'\n');
            let Some(offset) = found else {
                return self.await_more();
            };

            let raw = self.buffer.split_to(self.scanned + offset);
            self.buffer.advance(1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                trace!("Skipped the rest of an oversized line");
                continue;
            }
            if raw.len() > self.max_line {
                return Some(Err(self.oversized()));
            }
            match to_line(&raw) {
                Some(line) => return Some(Ok(line)),
                None => trace!("Keep-alive line"),
            }
        }
    }

    fn await_more(&mut self) -> Option<TwitterResult<String>> {
        if self.discarding {
            self.buffer.clear();
            self.scanned = 0;
            return None;
        }
        if self.buffer.len() > self.max_line {
            self.buffer.clear();
            self.scanned = 0;
            self.discarding = true;
            return Some(Err(self.oversized()));
        }
        self.scanned = self.buffer.len();
        None
    }

    fn oversized(&self) -> TwitterError {
        TwitterError::Parse(format!("Stream line exceeds {} bytes", self.max_line))
    }

    /// Whatever remains after the body ended without a trailing newline
    pub fn finish(&mut self) -> Option<String> {
        let raw = self.buffer.split();
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        to_line(&raw)
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

fn to_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches('\r');
    if line.trim().is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// An open streaming connection decoded line by line
///
/// The session is the only reader of its connection. Cancelling the token it
/// was opened with or calling [`close`](Self::close) drops the connection; a
/// read interrupted that way ends the stream cleanly instead of reporting an
/// error. The session listens on a child of that token, so closing one
/// session never cancels the caller's token.
pub struct StreamSession<C: LineCodec> {
    body: Option<BoxStream<'static, TwitterResult<Bytes>>>,
    framer: LineFramer,
    codec: C,
    cancel: CancellationToken,
}

impl<C: LineCodec> std::fmt::Debug for StreamSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("open", &self.body.is_some())
            .field("pending_bytes", &self.framer.pending_bytes())
            .finish_non_exhaustive()
    }
}

impl<C: LineCodec> StreamSession<C> {
    pub fn new<S, E>(body: S, codec: C, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<TwitterError> + 'static,
    {
        Self {
            body: Some(body.map(|chunk| chunk.map_err(Into::into)).boxed()),
            framer: LineFramer::new(),
            codec,
            cancel: cancel.child_token(),
        }
    }

    /// Wrap the body of a response returned by `RestClient::open_stream`
    pub fn from_response(response: reqwest::Response, codec: C, cancel: CancellationToken) -> Self {
        Self::new(response.bytes_stream(), codec, cancel)
    }

    /// Token that stops this session, and only this session, when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_open(&self) -> bool {
        self.body.is_some()
    }

    /// Release the connection. Buffered partial data is discarded.
    pub fn close(&mut self) {
        if self.body.take().is_some() {
            debug!("Stream closed");
        }
        self.framer = LineFramer::new();
        self.cancel.cancel();
    }

    /// Wait for the next message
    ///
    /// # Returns
    /// - `Some(Ok(message))` - the next decoded line
    /// - `Some(Err(error))` - a line failed to decode or the connection broke
    /// - `None` - the stream ended, was closed, or was cancelled
    pub async fn next_message(&mut self) -> Option<TwitterResult<C::Message>> {
        loop {
            while let Some(line) = self.framer.next_line() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => return Some(Err(e)),
                };
                trace!("Stream line: {}", line);
                match self.codec.decode_line(&line) {
                    Ok(Some(message)) => return Some(Ok(message)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                }
            }

            let body = self.body.as_mut()?;
            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.close();
                    return None;
                }
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => self.framer.push(&bytes),
                Some(Err(e)) => {
                    self.close();
                    return Some(Err(e));
                }
                None => {
                    debug!("Stream ended by server");
                    self.body = None;
                    let tail = self.framer.finish()?;
                    return self.codec.decode_line(&tail).transpose();
                }
            }
        }
    }

    /// Adapt the session into a `Stream` of messages
    pub fn into_stream(self) -> impl Stream<Item = TwitterResult<C::Message>> + Send
    where
        C::Message: 'static,
    {
        stream::unfold(self, |mut session| async move {
            let message = session.next_message().await?;
            Some((message, session))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::codec::{Lenient, StreamCodec};
    use crate::streaming::message::StreamMessage;
    use std::io;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        let items: Vec<Result<Bytes, io::Error>> =
            parts.iter().copied().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        stream::iter(items)
    }

    fn line(framer: &mut LineFramer) -> Option<String> {
        framer.next_line().map(|line| line.unwrap())
    }

    #[test]
    fn test_framer_splits_and_skips_blank_lines() {
        let mut framer = LineFramer::new();
        framer.push(b"{\"a\":1}\r\n\r\n\n{\"b\"");
        assert_eq!(line(&mut framer).as_deref(), Some("{\"a\":1}"));
        assert_eq!(line(&mut framer), None);

        framer.push(b":2}\n");
        assert_eq!(line(&mut framer).as_deref(), Some("{\"b\":2}"));
        assert_eq!(framer.pending_bytes(), 0);
    }

    #[test]
    fn test_framer_assembles_line_from_many_small_chunks() {
        let mut framer = LineFramer::new();
        let text = format!("{{\"track\":\"{}\"}}", "x".repeat(5000));
        for byte in text.as_bytes() {
            framer.push(std::slice::from_ref(byte));
            assert_eq!(line(&mut framer), None);
        }
        framer.push(b"\n");
        assert_eq!(line(&mut framer), Some(text));
    }

    #[test]
    fn test_framer_rejects_oversized_line_and_resyncs() {
        let mut framer = LineFramer::with_max_line(8);
        framer.push(b"0123456789");
        assert!(matches!(framer.next_line(), Some(Err(TwitterError::Parse(_)))));
        assert_eq!(framer.pending_bytes(), 0);

        framer.push(b"abcdef\nok\n");
        assert_eq!(line(&mut framer).as_deref(), Some("ok"));

        framer.push(b"0123456789\nnext\n");
        assert!(matches!(framer.next_line(), Some(Err(TwitterError::Parse(_)))));
        assert_eq!(line(&mut framer).as_deref(), Some("next"));
    }

    #[test]
    fn test_framer_finish_returns_tail() {
        let mut framer = LineFramer::new();
        framer.push(b"partial");
        assert_eq!(line(&mut framer), None);
        assert_eq!(framer.finish().as_deref(), Some("partial"));
        assert_eq!(framer.finish(), None);
    }

    #[tokio::test]
    async fn test_session_yields_messages_across_chunks() {
        let body = chunks(&["{\"limit\":{\"tr", "ack\":5}}\r\n", "\r\n", "{\"text\":\"hi\",\"id\":1}\n"]);
        let mut session = StreamSession::new(body, StreamCodec, CancellationToken::new());

        let first = session.next_message().await.unwrap().unwrap();
        assert_eq!(first.kind(), "limit");
        let second = session.next_message().await.unwrap().unwrap();
        assert_eq!(second.kind(), "status");
        assert!(session.next_message().await.is_none());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_strict_session_reports_unknown_line() {
        let body = chunks(&["{\"mystery\":true}\n", "{\"limit\":{\"track\":1}}\n"]);
        let mut session = StreamSession::new(body, StreamCodec, CancellationToken::new());

        assert!(matches!(
            session.next_message().await,
            Some(Err(TwitterError::Parse(_)))
        ));
        // the connection survives a bad line
        assert!(session.next_message().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_lenient_session_keeps_raw_line() {
        let body = chunks(&["{\"mystery\":true}\n"]);
        let mut session = StreamSession::new(body, Lenient::new(StreamCodec), CancellationToken::new());

        assert_eq!(
            session.next_message().await.unwrap().unwrap(),
            StreamMessage::Raw("{\"mystery\":true}".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancel_during_read_ends_cleanly() {
        let cancel = CancellationToken::new();
        let body = stream::pending::<Result<Bytes, io::Error>>();
        let mut session = StreamSession::new(body, StreamCodec, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        assert!(session.next_message().await.is_none());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_close_stops_reading() {
        let mut session = StreamSession::new(
            chunks(&["{\"limit\":{\"track\":1}}\n"]),
            StreamCodec,
            CancellationToken::new(),
        );
        session.close();
        assert!(session.next_message().await.is_none());
        assert!(session.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_close_leaves_shared_token_alone() {
        let shutdown = CancellationToken::new();
        let mut first = StreamSession::new(stream::pending::<Result<Bytes, io::Error>>(), StreamCodec, shutdown.clone());
        let second = StreamSession::new(stream::pending::<Result<Bytes, io::Error>>(), StreamCodec, shutdown.clone());

        first.close();
        assert!(!shutdown.is_cancelled());
        assert!(!second.cancel_token().is_cancelled());

        shutdown.cancel();
        assert!(second.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        let items: Vec<Result<Bytes, io::Error>> = vec![Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        ))];
        let mut session = StreamSession::new(stream::iter(items), StreamCodec, CancellationToken::new());

        assert!(matches!(session.next_message().await, Some(Err(TwitterError::Io(_)))));
        assert!(session.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_into_stream() {
        let body = chunks(&["{\"limit\":{\"track\":1}}\n{\"limit\":{\"track\":2}}\n"]);
        let messages: Vec<_> = StreamSession::new(body, StreamCodec, CancellationToken::new())
            .into_stream()
            .collect()
            .await;
        assert_eq!(messages.len(), 2);
    }
}
