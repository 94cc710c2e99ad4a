use crate::core::config::{ClientConfig, ConnectionOptions};
use crate::core::errors::TwitterResult;
use crate::core::kernel::{
    ApiRequest, CallOptions, ClientPool, Lenient, LineCodec, RawResponse, ReqwestRest, RestClient,
    RestClientBuilder, StreamCodec, StreamSession,
};
use crate::core::params::{expand_path, Parameters};
use crate::core::traits::ToParameters;
use crate::core::types::{ApiResponse, MediaUpload, Status, User};
use crate::requests::{SearchParameters, TimelineParameters, UpdateStatus, UploadMedia};
use crate::streaming::{StreamKind, StreamParameters};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Which base URL an endpoint path is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiBase {
    Api,
    Upload,
}

/// Async client for the REST and streaming APIs
///
/// Endpoint paths may contain `{name}` placeholders; they are filled from the
/// parameter of the same name, which is then left out of the query or body.
#[derive(Debug, Clone)]
pub struct TwitterClient {
    config: ClientConfig,
    rest: ReqwestRest,
}

impl TwitterClient {
    pub fn new(config: ClientConfig) -> TwitterResult<Self> {
        Self::with_pool(config, ClientPool::new())
    }

    /// Create a client that shares HTTP connections with other clients
    pub fn with_pool(config: ClientConfig, pool: ClientPool) -> TwitterResult<Self> {
        let rest = RestClientBuilder::new(config.options.clone())
            .with_signer(config.credentials.signer())
            .with_pool(pool)
            .build()?;

        info!(
            consumer_key = config.credentials.consumer_key(),
            user_context = config.has_user_token(),
            "Created client"
        );

        Ok(Self { config, rest })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rest(&self) -> &ReqwestRest {
        &self.rest
    }

    /// Current connection options
    pub fn options(&self) -> ConnectionOptions {
        self.rest.options()
    }

    /// Replace connection options; calls already in flight keep their snapshot
    pub fn set_options(&self, options: ConnectionOptions) {
        self.rest.set_options(options);
    }

    fn resolve(&self, base: ApiBase, template: &str, params: &mut Parameters) -> TwitterResult<String> {
        let options = self.rest.options();
        let root = match base {
            ApiBase::Api => options.api_url,
            ApiBase::Upload => options.upload_url,
        };
        let path = expand_path(template.trim_start_matches('/'), params)?;
        Ok(format!("{}/{}", root.trim_end_matches('/'), path))
    }

    /// Send a request and return the raw response
    #[instrument(skip(self, params, call))]
    pub async fn send(
        &self,
        method: Method,
        base: ApiBase,
        template: &str,
        mut params: Parameters,
        call: CallOptions,
    ) -> TwitterResult<RawResponse> {
        let url = self.resolve(base, template, &mut params)?;
        self.rest.execute(ApiRequest::new(method, url, params), call).await
    }

    /// Send a request and deserialize the response body
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        template: &str,
        params: Parameters,
    ) -> TwitterResult<ApiResponse<T>> {
        self.send(method, ApiBase::Api, template, params, CallOptions::default())
            .await?
            .decode()
    }

    pub async fn get<T, P>(&self, template: &str, params: &P) -> TwitterResult<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: ToParameters + ?Sized,
    {
        self.call(Method::GET, template, params.to_parameters()?).await
    }

    pub async fn post<T, P>(&self, template: &str, params: &P) -> TwitterResult<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: ToParameters + ?Sized,
    {
        self.call(Method::POST, template, params.to_parameters()?).await
    }

    pub async fn verify_credentials(&self) -> TwitterResult<ApiResponse<User>> {
        self.call(Method::GET, "account/verify_credentials.json", Parameters::new())
            .await
    }

    pub async fn show_status(&self, id: u64) -> TwitterResult<ApiResponse<Status>> {
        self.call(
            Method::GET,
            "statuses/show/{id}.json",
            Parameters::new().with("id", id)?,
        )
        .await
    }

    pub async fn update_status(&self, request: &UpdateStatus) -> TwitterResult<ApiResponse<Status>> {
        self.post("statuses/update.json", request).await
    }

    pub async fn destroy_status(&self, id: u64) -> TwitterResult<ApiResponse<Status>> {
        self.call(
            Method::POST,
            "statuses/destroy/{id}.json",
            Parameters::new().with("id", id)?,
        )
        .await
    }

    pub async fn user_timeline(
        &self,
        request: &TimelineParameters,
    ) -> TwitterResult<ApiResponse<Vec<Status>>> {
        self.get("statuses/user_timeline.json", request).await
    }

    pub async fn search(&self, request: &SearchParameters) -> TwitterResult<ApiResponse<Vec<Status>>> {
        let response: ApiResponse<Value> = self.get("search/tweets.json", request).await?;
        let rate_limit = response.rate_limit;
        let statuses = response
            .data
            .get("statuses")
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        Ok(ApiResponse {
            data: serde_json::from_value(statuses)?,
            rate_limit,
        })
    }

    /// Upload media in one multipart request. Progress and cancellation are
    /// taken from `call`.
    pub async fn upload_media(
        &self,
        request: UploadMedia,
        call: CallOptions,
    ) -> TwitterResult<ApiResponse<MediaUpload>> {
        self.send(
            Method::POST,
            ApiBase::Upload,
            "media/upload.json",
            request.into_parameters()?,
            call,
        )
        .await?
        .decode()
    }

    /// Open a streaming connection with the strict codec
    pub async fn stream(
        &self,
        kind: StreamKind,
        params: &StreamParameters,
    ) -> TwitterResult<StreamSession<StreamCodec>> {
        self.stream_with(kind, params, StreamCodec, CancellationToken::new())
            .await
    }

    /// Open a streaming connection that keeps undecodable lines as raw text
    pub async fn stream_lenient(
        &self,
        kind: StreamKind,
        params: &StreamParameters,
    ) -> TwitterResult<StreamSession<Lenient<StreamCodec>>> {
        self.stream_with(kind, params, Lenient::new(StreamCodec), CancellationToken::new())
            .await
    }

    /// Open a streaming connection with a custom codec and cancellation token
    #[instrument(skip(self, params, codec, cancel))]
    pub async fn stream_with<C: LineCodec>(
        &self,
        kind: StreamKind,
        params: &StreamParameters,
        codec: C,
        cancel: CancellationToken,
    ) -> TwitterResult<StreamSession<C>> {
        params.validate(kind)?;
        let url = kind.url(&self.rest.options());
        let request = ApiRequest::new(kind.method(), url, params.to_parameters()?);

        let response = self.rest.open_stream(request, cancel.clone()).await?;
        Ok(StreamSession::from_response(response, codec, cancel))
    }
}
