/// Streaming API support
///
/// A streaming connection is opened through the same signing and transport
/// path as any REST call. Its body is then framed into lines and each line is
/// classified into a [`StreamMessage`] on its own.
///
/// Decoding is strict by default: a line that matches no known message shape
/// is reported as `TwitterError::Parse`. Wrap the codec in
/// [`Lenient`](crate::core::kernel::Lenient) to receive such lines as
/// `StreamMessage::Raw` instead.
///
/// ```rust,no_run
/// use twitx::streaming::{StreamKind, StreamParameters};
/// use twitx::{ClientConfig, Credentials, TwitterClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::new(Credentials::user("ck", "cs", "token", "secret"));
/// let client = TwitterClient::new(config)?;
/// let params = StreamParameters::default().track(["rust"]);
/// let mut stream = client.stream(StreamKind::Filter, &params).await?;
///
/// while let Some(message) = stream.next_message().await {
///     println!("{:?}", message?);
/// }
/// # Ok(())
/// # }
/// ```
pub mod endpoint;
pub mod message;

pub use endpoint::{StreamKind, StreamParameters, StreamWith};
pub use message::{
    ControlNotice, DeleteNotice, DeletedItem, DisconnectNotice, LimitNotice, ScrubGeoNotice, StatusWithheldNotice,
    StreamEvent, StreamMessage, UserWithheldNotice, WarningNotice,
};
