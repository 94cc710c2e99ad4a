use crate::core::kernel::signer::{BearerSigner, OAuth1Signer, Signer};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Credentials a caller holds; the variant decides how requests are signed
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Consumer only, used to obtain a request token
    Consumer {
        consumer_key: String,
        consumer_secret: Secret<String>,
    },
    /// User context: OAuth 1.0a with an access token
    User {
        consumer_key: String,
        consumer_secret: Secret<String>,
        token: String,
        token_secret: Secret<String>,
    },
    /// App-only context: OAuth2 bearer token
    App {
        consumer_key: String,
        consumer_secret: Secret<String>,
        bearer_token: Secret<String>,
    },
}

impl Credentials {
    pub fn consumer(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self::Consumer {
            consumer_key: consumer_key.into(),
            consumer_secret: Secret::new(consumer_secret.into()),
        }
    }

    pub fn user(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self::User {
            consumer_key: consumer_key.into(),
            consumer_secret: Secret::new(consumer_secret.into()),
            token: token.into(),
            token_secret: Secret::new(token_secret.into()),
        }
    }

    pub fn app(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        bearer_token: impl Into<String>,
    ) -> Self {
        Self::App {
            consumer_key: consumer_key.into(),
            consumer_secret: Secret::new(consumer_secret.into()),
            bearer_token: Secret::new(bearer_token.into()),
        }
    }

    pub fn consumer_key(&self) -> &str {
        match self {
            Self::Consumer { consumer_key, .. }
            | Self::User { consumer_key, .. }
            | Self::App { consumer_key, .. } => consumer_key,
        }
    }

    /// Get consumer secret (use carefully - exposes secret)
    pub fn consumer_secret(&self) -> &str {
        match self {
            Self::Consumer {
                consumer_secret, ..
            }
            | Self::User {
                consumer_secret, ..
            }
            | Self::App {
                consumer_secret, ..
            } => consumer_secret.expose_secret(),
        }
    }

    /// The request signing strategy matching these credentials
    pub fn signer(&self) -> Arc<dyn Signer> {
        match self {
            Self::Consumer {
                consumer_key,
                consumer_secret,
            } => Arc::new(OAuth1Signer::new(
                consumer_key.clone(),
                consumer_secret.expose_secret().clone(),
            )),
            Self::User {
                consumer_key,
                consumer_secret,
                token,
                token_secret,
            } => Arc::new(
                OAuth1Signer::new(consumer_key.clone(), consumer_secret.expose_secret().clone())
                    .with_token(token.clone(), token_secret.expose_secret().clone()),
            ),
            Self::App { bearer_token, .. } => {
                Arc::new(BearerSigner::new(bearer_token.expose_secret().clone()))
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Consumer { .. } => "consumer",
            Self::User { .. } => "user",
            Self::App { .. } => "app",
        }
    }
}

/// Connection-level options read by the transport on every call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub api_url: String,
    pub upload_url: String,
    pub stream_url: String,
    pub user_stream_url: String,
    pub site_stream_url: String,
    pub oauth_url: String,
    /// Time allowed until response headers arrive
    pub timeout: Duration,
    /// Time allowed to read a non-streaming response body
    pub read_write_timeout: Duration,
    pub connect_timeout: Duration,
    pub proxy: Option<String>,
    pub use_proxy: bool,
    pub user_agent: String,
    pub use_compression: bool,
    pub keep_alive: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            api_url: "https://api.twitter.com/1.1".to_string(),
            upload_url: "https://upload.twitter.com/1.1".to_string(),
            stream_url: "https://stream.twitter.com/1.1".to_string(),
            user_stream_url: "https://userstream.twitter.com/1.1".to_string(),
            site_stream_url: "https://sitestream.twitter.com/1.1".to_string(),
            oauth_url: "https://api.twitter.com".to_string(),
            timeout: Duration::from_secs(100),
            read_write_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            proxy: None,
            use_proxy: false,
            user_agent: format!("twitx/{}", env!("CARGO_PKG_VERSION")),
            use_compression: true,
            keep_alive: true,
        }
    }
}

impl ConnectionOptions {
    /// Point every sub-API at one base URL, as a mock server would need
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.api_url = format!("{}/1.1", base);
        self.upload_url = format!("{}/1.1", base);
        self.stream_url = format!("{}/1.1", base);
        self.user_stream_url = format!("{}/1.1", base);
        self.site_stream_url = format!("{}/1.1", base);
        self.oauth_url = base.to_string();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_read_write_timeout(mut self, timeout: Duration) -> Self {
        self.read_write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self.use_proxy = true;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Options for a long-lived stream: compression off, no read deadline
    #[must_use]
    pub fn for_streaming(&self) -> Self {
        Self {
            use_compression: false,
            ..self.clone()
        }
    }

    pub fn active_proxy(&self) -> Option<&str> {
        if self.use_proxy {
            self.proxy.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub options: ConnectionOptions,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ClientConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ClientConfig", 4)?;
        state.serialize_field("credentials", self.credentials.kind())?;
        state.serialize_field("consumer_key", self.credentials.consumer_key())?;
        state.serialize_field("consumer_secret", "[REDACTED]")?;
        state.serialize_field("options", &self.options)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ClientConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ClientConfigHelper {
            consumer_key: String,
            consumer_secret: String,
            access_token: Option<String>,
            access_token_secret: Option<String>,
            bearer_token: Option<String>,
            #[serde(default)]
            options: ConnectionOptions,
        }

        let helper = ClientConfigHelper::deserialize(deserializer)?;
        let credentials = credentials_from_parts(
            helper.consumer_key,
            helper.consumer_secret,
            helper.access_token,
            helper.access_token_secret,
            helper.bearer_token,
        )
        .map_err(serde::de::Error::custom)?;

        Ok(Self {
            credentials,
            options: helper.options,
        })
    }
}

fn credentials_from_parts(
    consumer_key: String,
    consumer_secret: String,
    access_token: Option<String>,
    access_token_secret: Option<String>,
    bearer_token: Option<String>,
) -> Result<Credentials, ConfigError> {
    match (access_token, access_token_secret, bearer_token) {
        (Some(token), Some(secret), _) => Ok(Credentials::user(
            consumer_key,
            consumer_secret,
            token,
            secret,
        )),
        (Some(_), None, _) | (None, Some(_), _) => Err(ConfigError::InvalidConfiguration(
            "access token and access token secret must be given together".to_string(),
        )),
        (None, None, Some(bearer)) => Ok(Credentials::app(consumer_key, consumer_secret, bearer)),
        (None, None, None) => Ok(Credentials::consumer(consumer_key, consumer_secret)),
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            options: ConnectionOptions::default(),
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_CONSUMER_KEY` (e.g., `TWITTER_CONSUMER_KEY`)
    /// - `{PREFIX}_CONSUMER_SECRET`
    /// - `{PREFIX}_ACCESS_TOKEN` and `{PREFIX}_ACCESS_TOKEN_SECRET` (optional, user context)
    /// - `{PREFIX}_BEARER_TOKEN` (optional, app-only context)
    /// - `{PREFIX}_API_URL` (optional)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let required = |name: &str| {
            let var = format!("{}_{}", prefix, name);
            env::var(&var).map_err(|_| ConfigError::MissingEnvironmentVariable(var))
        };
        let optional = |name: &str| env::var(format!("{}_{}", prefix, name)).ok();

        let credentials = credentials_from_parts(
            required("CONSUMER_KEY")?,
            required("CONSUMER_SECRET")?,
            optional("ACCESS_TOKEN"),
            optional("ACCESS_TOKEN_SECRET"),
            optional("BEARER_TOKEN"),
        )?;

        let mut options = ConnectionOptions::default();
        if let Some(api_url) = optional("API_URL") {
            options.api_url = api_url;
        }
        if let Some(proxy) = optional("PROXY") {
            options = options.with_proxy(proxy);
        }

        Ok(Self {
            credentials,
            options,
        })
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    #[must_use]
    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether requests can be made in a user context
    #[must_use]
    pub fn has_user_token(&self) -> bool {
        matches!(self.credentials, Credentials::User { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
