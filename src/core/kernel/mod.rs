/// Kernel - the protocol machinery shared by every API call
///
/// The kernel contains no endpoint-specific logic. It turns a method, a URL
/// and a [`Parameters`](crate::core::params::Parameters) list into a signed
/// wire request, executes it, and classifies what comes back.
///
/// # Architecture
///
/// ## Transport Layer
/// - `RestClient`: signed HTTP calls with timeout and cancellation
/// - `ClientPool`: one HTTP client per distinct connection setting
/// - `StreamSession`: a long-lived line-delimited response
///
/// ## Authentication
/// - `Signer`: pluggable authorization header interface
/// - `OAuth1Signer`: OAuth 1.0a HMAC-SHA1 for user and consumer context
/// - `BearerSigner`: OAuth2 app-only bearer token
/// - `BasicSigner`: consumer credentials for the OAuth2 token endpoints
///
/// ## Message Handling
/// - `classify_error`: error bodies and rate limit headers
/// - `LineCodec`: stream line decoding, strict or `Lenient`
///
/// # Example
/// ```rust,no_run
/// use twitx::core::config::ConnectionOptions;
/// use twitx::core::kernel::*;
/// use twitx::core::params::Parameters;
/// use twitx::core::types::User;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let signer = Arc::new(OAuth1Signer::new("ck", "cs").with_token("token", "secret"));
/// let rest = RestClientBuilder::new(ConnectionOptions::default())
///     .with_signer(signer)
///     .build()?;
///
/// let me = rest
///     .get_json::<User>(
///         "https://api.twitter.com/1.1/account/verify_credentials.json",
///         Parameters::new(),
///     )
///     .await?;
/// println!("{:?} (rate limit {:?})", me.data.screen_name, me.rate_limit);
/// # Ok(())
/// # }
/// ```
pub mod classify;
pub mod codec;
pub mod pool;
pub mod rest;
pub mod signer;
pub mod stream;

pub use classify::{classify_error, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};
pub use codec::{Lenient, LineCodec, StreamCodec};
pub use pool::{ClientPool, PoolKey};
pub use rest::{
    build_exchange, select_encoding, ApiRequest, BodyEncoding, CallOptions, HttpExchange,
    ProgressCallback, RawResponse, RequestBody, RestClient, RestClientBuilder, ReqwestRest,
    UploadProgress,
};
pub use signer::{
    percent_encode, BasicSigner, BearerSigner, OAuth1Signer, OAuthSignature, SignatureContext,
    Signer,
};
pub use stream::{LineFramer, StreamSession};
