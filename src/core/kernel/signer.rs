use crate::core::errors::{TwitterError, TwitterResult};
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay literal, everything else is escaped
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a string for OAuth signatures and form bodies
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// Result type for signing operations: the `Authorization` header value
pub type SignatureResult = TwitterResult<String>;

/// Signer trait for request authentication
///
/// Implementations produce the `Authorization` header for one request. They
/// hold no mutable state, so one signer can serve concurrent calls.
pub trait Signer: Send + Sync {
    /// Sign a request and return the `Authorization` header value
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `url` - Target URL, possibly carrying query parameters
    /// * `params` - Rendered text parameters of the request
    fn sign_request(&self, method: &str, url: &str, params: &[(String, String)]) -> SignatureResult;
}

/// Per-request input of the OAuth 1.0a signature
#[derive(Debug, Clone, Copy)]
pub struct SignatureContext<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub params: &'a [(String, String)],
    /// Additional `oauth_*` protocol parameters such as `oauth_callback`
    pub oauth_params: &'a [(&'a str, &'a str)],
}

impl<'a> SignatureContext<'a> {
    pub fn new(method: &'a str, url: &'a str, params: &'a [(String, String)]) -> Self {
        Self {
            method,
            url,
            params,
            oauth_params: &[],
        }
    }

    pub fn with_oauth_params(mut self, oauth_params: &'a [(&'a str, &'a str)]) -> Self {
        self.oauth_params = oauth_params;
        self
    }
}

/// Output of a signing pass, kept whole so tests can check every stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSignature {
    pub base_string: String,
    pub signature: String,
    pub header: String,
}

/// HMAC-SHA1 OAuth 1.0a signer for user-context and request-token calls
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: Secret<String>,
    token: Option<String>,
    token_secret: Option<Secret<String>>,
    protocol_params: Vec<(String, String)>,
}

impl std::fmt::Debug for OAuth1Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Signer")
            .field("consumer_key", &self.consumer_key)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl OAuth1Signer {
    /// Create a signer holding only the consumer credentials
    ///
    /// # Arguments
    /// * `consumer_key` - Application key
    /// * `consumer_secret` - Application secret
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: Secret::new(consumer_secret.into()),
            token: None,
            token_secret: None,
            protocol_params: Vec::new(),
        }
    }

    /// Attach the user token and token secret
    pub fn with_token(mut self, token: impl Into<String>, token_secret: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.token_secret = Some(Secret::new(token_secret.into()));
        self
    }

    /// Add an `oauth_*` parameter such as `oauth_callback` or `oauth_verifier`
    /// to every request this signer signs
    pub fn with_oauth_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.protocol_params.push((key.to_string(), value.into()));
        self
    }

    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Sign with a fresh nonce and the current time
    pub fn sign(&self, ctx: &SignatureContext<'_>) -> TwitterResult<OAuthSignature> {
        self.sign_with(ctx, &generate_nonce(), current_timestamp()?)
    }

    /// Sign with a caller-chosen nonce and timestamp
    pub fn sign_with(
        &self,
        ctx: &SignatureContext<'_>,
        nonce: &str,
        timestamp: u64,
    ) -> TwitterResult<OAuthSignature> {
        let mut oauth_params: Vec<(String, String)> = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        if let Some(token) = &self.token {
            oauth_params.push(("oauth_token".to_string(), token.clone()));
        }
        oauth_params.extend(self.protocol_params.iter().cloned());
        for (key, value) in ctx.oauth_params {
            oauth_params.push(((*key).to_string(), (*value).to_string()));
        }

        let all_params: Vec<(String, String)> = oauth_params
            .iter()
            .chain(ctx.params.iter())
            .cloned()
            .collect();

        let base_string = signature_base_string(ctx.method, ctx.url, &all_params)?;
        let key = signing_key(
            self.consumer_secret.expose_secret(),
            self.token_secret.as_ref().map(|s| s.expose_secret().as_str()),
        );
        let signature = hmac_sha1_base64(&key, &base_string)?;

        oauth_params.push(("oauth_signature".to_string(), signature.clone()));
        oauth_params.sort();

        let header = format!(
            "OAuth {}",
            oauth_params
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(OAuthSignature {
            base_string,
            signature,
            header,
        })
    }
}

impl Signer for OAuth1Signer {
    fn sign_request(&self, method: &str, url: &str, params: &[(String, String)]) -> SignatureResult {
        self.sign(&SignatureContext::new(method, url, params))
            .map(|signed| signed.header)
    }
}

/// App-only signer that sends a static bearer token
pub struct BearerSigner {
    token: Secret<String>,
}

impl BearerSigner {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
        }
    }
}

impl Signer for BearerSigner {
    fn sign_request(&self, _method: &str, _url: &str, _params: &[(String, String)]) -> SignatureResult {
        Ok(format!("Bearer {}", self.token.expose_secret()))
    }
}

/// HTTP Basic signer built from the consumer credentials, used by the
/// OAuth2 token endpoints
pub struct BasicSigner {
    credentials: Secret<String>,
}

impl BasicSigner {
    pub fn new(consumer_key: &str, consumer_secret: &str) -> Self {
        let joined = format!(
            "{}:{}",
            percent_encode(consumer_key),
            percent_encode(consumer_secret)
        );
        Self {
            credentials: Secret::new(general_purpose::STANDARD.encode(joined)),
        }
    }
}

impl Signer for BasicSigner {
    fn sign_request(&self, _method: &str, _url: &str, _params: &[(String, String)]) -> SignatureResult {
        Ok(format!("Basic {}", self.credentials.expose_secret()))
    }
}

/// Build `METHOD&enc(base_url)&enc(sorted params)`.
///
/// Query parameters already present on `url` are merged with `params` before
/// sorting by encoded key, then encoded value.
pub fn signature_base_string(
    method: &str,
    url: &str,
    params: &[(String, String)],
) -> TwitterResult<String> {
    let parsed = Url::parse(url)
        .map_err(|e| TwitterError::InvalidParameter(format!("Invalid URL '{}': {}", url, e)))?;

    let mut base_url = format!(
        "{}://{}",
        parsed.scheme(),
        parsed.host_str().unwrap_or_default().to_lowercase()
    );
    if let Some(port) = parsed.port() {
        base_url.push_str(&format!(":{}", port));
    }
    base_url.push_str(parsed.path());

    let mut encoded: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (percent_encode(&k), percent_encode(&v)))
        .chain(
            params
                .iter()
                .map(|(k, v)| (percent_encode(k), percent_encode(v))),
        )
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(&base_url),
        percent_encode(&param_string)
    ))
}

/// `enc(consumer_secret)&enc(token_secret)`; the token part may be empty
pub fn signing_key(consumer_secret: &str, token_secret: Option<&str>) -> String {
    format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret.unwrap_or_default())
    )
}

fn hmac_sha1_base64(key: &str, data: &str) -> TwitterResult<String> {
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| TwitterError::Auth(format!("Failed to create HMAC: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// 128 random bits from the thread-local CSPRNG, hex encoded
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn current_timestamp() -> TwitterResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| TwitterError::Auth(format!("System time error: {}", e)))
}
