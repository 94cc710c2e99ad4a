use crate::core::config::ConnectionOptions;
use crate::core::errors::{TwitterError, TwitterResult};
use crate::core::kernel::signer::percent_encode;
use crate::core::kernel::{
    ApiRequest, BasicSigner, CallOptions, ClientPool, OAuth1Signer, RawResponse, RestClient,
    RestClientBuilder, Signer,
};
use crate::core::params::Parameters;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Out-of-band callback for clients that cannot receive a redirect
pub const OUT_OF_BAND: &str = "oob";

/// Temporary credentials from `oauth/request_token`
#[derive(Debug, Clone)]
pub struct RequestToken {
    pub token: String,
    pub token_secret: Secret<String>,
    pub callback_confirmed: bool,
}

/// User credentials from `oauth/access_token`
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub token_secret: Secret<String>,
    pub user_id: Option<String>,
    pub screen_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BearerTokenResponse {
    token_type: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct InvalidatedTokenResponse {
    access_token: String,
}

/// Three-legged OAuth 1.0a and OAuth2 app-only token acquisition
///
/// ```rust,no_run
/// use twitx::oauth::{OAuthFlow, OUT_OF_BAND};
/// use twitx::core::config::ConnectionOptions;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let flow = OAuthFlow::new("consumer_key", "consumer_secret", ConnectionOptions::default());
/// let request_token = flow.request_token(OUT_OF_BAND).await?;
/// println!("Visit {}", flow.authorize_url(&request_token, false));
/// let pin = "1234567";
/// let access = flow.access_token(&request_token, pin).await?;
/// println!("Authorized as {:?}", access.screen_name);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    consumer_key: String,
    consumer_secret: Secret<String>,
    options: ConnectionOptions,
    pool: ClientPool,
}

impl OAuthFlow {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        options: ConnectionOptions,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: Secret::new(consumer_secret.into()),
            options,
            pool: ClientPool::new(),
        }
    }

    /// Share HTTP connections with other clients
    pub fn with_pool(mut self, pool: ClientPool) -> Self {
        self.pool = pool;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.options.oauth_url.trim_end_matches('/'), path)
    }

    fn consumer_signer(&self) -> OAuth1Signer {
        OAuth1Signer::new(self.consumer_key.clone(), self.consumer_secret.expose_secret().clone())
    }

    async fn post(&self, signer: Arc<dyn Signer>, path: &str, params: Parameters) -> TwitterResult<RawResponse> {
        let rest = RestClientBuilder::new(self.options.clone())
            .with_signer(signer)
            .with_pool(self.pool.clone())
            .build()?;
        rest.execute(ApiRequest::post(self.endpoint(path), params), CallOptions::default())
            .await
    }

    /// Obtain temporary credentials. `callback` is a redirect URL or
    /// [`OUT_OF_BAND`] for PIN-based authorization.
    #[instrument(skip(self))]
    pub async fn request_token(&self, callback: &str) -> TwitterResult<RequestToken> {
        let signer = self.consumer_signer().with_oauth_param("oauth_callback", callback);
        let response = self
            .post(Arc::new(signer), "oauth/request_token", Parameters::new())
            .await?;

        let mut fields = parse_form(&response.body);
        let token = take_field(&mut fields, "oauth_token")?;
        let token_secret = take_field(&mut fields, "oauth_token_secret")?;
        let callback_confirmed = fields
            .get("oauth_callback_confirmed")
            .is_some_and(|v| v == "true");

        debug!(callback_confirmed, "Obtained request token");
        Ok(RequestToken {
            token,
            token_secret: Secret::new(token_secret),
            callback_confirmed,
        })
    }

    /// URL the user visits to authorize the request token
    pub fn authorize_url(&self, request_token: &RequestToken, force_login: bool) -> String {
        self.user_url("oauth/authorize", request_token, force_login)
    }

    /// Like [`authorize_url`](Self::authorize_url) but skips the prompt for
    /// users who already authorized the application
    pub fn authenticate_url(&self, request_token: &RequestToken, force_login: bool) -> String {
        self.user_url("oauth/authenticate", request_token, force_login)
    }

    fn user_url(&self, path: &str, request_token: &RequestToken, force_login: bool) -> String {
        let mut url = format!(
            "{}?oauth_token={}",
            self.endpoint(path),
            percent_encode(&request_token.token)
        );
        if force_login {
            url.push_str("&force_login=true");
        }
        url
    }

    /// Exchange an authorized request token and its verifier (the PIN in the
    /// out-of-band flow) for user credentials
    #[instrument(skip(self, request_token, verifier))]
    pub async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> TwitterResult<AccessToken> {
        let signer = self
            .consumer_signer()
            .with_token(
                request_token.token.clone(),
                request_token.token_secret.expose_secret().clone(),
            )
            .with_oauth_param("oauth_verifier", verifier);
        let response = self
            .post(Arc::new(signer), "oauth/access_token", Parameters::new())
            .await?;

        let mut fields = parse_form(&response.body);
        let access = AccessToken {
            token: take_field(&mut fields, "oauth_token")?,
            token_secret: Secret::new(take_field(&mut fields, "oauth_token_secret")?),
            user_id: fields.remove("user_id"),
            screen_name: fields.remove("screen_name"),
        };

        debug!(screen_name = ?access.screen_name, "Obtained access token");
        Ok(access)
    }

    fn basic_signer(&self) -> Arc<dyn Signer> {
        Arc::new(BasicSigner::new(
            &self.consumer_key,
            self.consumer_secret.expose_secret(),
        ))
    }

    /// Obtain an app-only bearer token with the client-credentials grant
    #[instrument(skip(self))]
    pub async fn bearer_token(&self) -> TwitterResult<Secret<String>> {
        let params = Parameters::new().with("grant_type", "client_credentials")?;
        let response: BearerTokenResponse = self
            .post(self.basic_signer(), "oauth2/token", params)
            .await?
            .decode()?
            .into_inner();

        if !response.token_type.eq_ignore_ascii_case("bearer") {
            return Err(TwitterError::Auth(format!(
                "Unexpected token type '{}'",
                response.token_type
            )));
        }
        Ok(Secret::new(response.access_token))
    }

    /// Revoke an app-only bearer token
    #[instrument(skip(self, bearer_token))]
    pub async fn invalidate_bearer_token(&self, bearer_token: &str) -> TwitterResult<()> {
        let params = Parameters::new().with("access_token", bearer_token)?;
        let response: InvalidatedTokenResponse = self
            .post(self.basic_signer(), "oauth2/invalidate_token", params)
            .await?
            .decode()?
            .into_inner();

        debug!(matched = response.access_token == bearer_token, "Invalidated bearer token");
        Ok(())
    }
}

fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn take_field(fields: &mut HashMap<String, String>, name: &str) -> TwitterResult<String> {
    fields
        .remove(name)
        .ok_or_else(|| TwitterError::Parse(format!("Token response is missing '{}'", name)))
}
