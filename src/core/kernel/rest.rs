use crate::core::config::ConnectionOptions;
use crate::core::errors::{TwitterError, TwitterResult};
use crate::core::kernel::classify::classify_error;
use crate::core::kernel::pool::{ClientPool, PoolKey};
use crate::core::kernel::signer::Signer;
use crate::core::params::{ByteStream, Media, MediaSource, ParamValue, Parameters};
use crate::core::types::{ApiResponse, RateLimitStatus};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Bytes uploaded so far and the total when known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: Option<u64>,
}

/// Upload observer, called from the task that drives the upload
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// A logical API call before it is signed and encoded
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub params: Parameters,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>, params: Parameters) -> Self {
        Self {
            method,
            url: url.into(),
            params,
        }
    }

    pub fn get(url: impl Into<String>, params: Parameters) -> Self {
        Self::new(Method::GET, url, params)
    }

    pub fn post(url: impl Into<String>, params: Parameters) -> Self {
        Self::new(Method::POST, url, params)
    }
}

/// Per-call controls
#[derive(Clone, Default)]
pub struct CallOptions {
    pub cancel: Option<CancellationToken>,
    pub progress: Option<ProgressCallback>,
}

impl CallOptions {
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }
}

impl std::fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOptions")
            .field("cancellable", &self.cancel.is_some())
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

/// How the parameters of an exchange travel on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Query,
    Form,
    Multipart,
}

/// Pick the encoding: query string for bodiless methods, multipart as soon as
/// one value is a binary payload, url-encoded form otherwise
pub fn select_encoding(method: &Method, params: &Parameters) -> BodyEncoding {
    if !has_body(method) {
        BodyEncoding::Query
    } else if params.has_media() {
        BodyEncoding::Multipart
    } else {
        BodyEncoding::Form
    }
}

fn has_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

pub enum RequestBody {
    Empty,
    Form(String),
    Multipart(Form),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Form(body) => f.debug_tuple("Form").field(body).finish(),
            Self::Multipart(form) => f.debug_tuple("Multipart").field(&form.boundary()).finish(),
        }
    }
}

/// A fully signed and serialized request, ready to send
#[derive(Debug)]
pub struct HttpExchange {
    pub method: Method,
    pub url: String,
    pub authorization: String,
    pub body: RequestBody,
}

impl HttpExchange {
    pub fn encoding(&self) -> BodyEncoding {
        match self.body {
            RequestBody::Multipart(_) => BodyEncoding::Multipart,
            RequestBody::Form(_) => BodyEncoding::Form,
            RequestBody::Empty if has_body(&self.method) => BodyEncoding::Form,
            RequestBody::Empty => BodyEncoding::Query,
        }
    }

    fn into_request(self, client: &Client) -> RequestBuilder {
        let request = client
            .request(self.method, &self.url)
            .header(AUTHORIZATION, self.authorization);

        match self.body {
            RequestBody::Empty => request,
            RequestBody::Form(body) => request.header(CONTENT_TYPE, FORM_CONTENT_TYPE).body(body),
            RequestBody::Multipart(form) => request.multipart(form),
        }
    }
}

/// Sign and serialize a request. Every header and body byte is settled here,
/// before the transport sends anything.
pub async fn build_exchange(
    request: ApiRequest,
    signer: &dyn Signer,
    progress: Option<&ProgressCallback>,
) -> TwitterResult<HttpExchange> {
    let ApiRequest {
        method,
        url,
        params,
    } = request;
    let encoding = select_encoding(&method, &params);
    if encoding == BodyEncoding::Query && params.has_media() {
        return Err(TwitterError::InvalidParameter(format!(
            "{} requests cannot carry binary parameters",
            method
        )));
    }

    let (url, authorization, body) = match encoding {
        BodyEncoding::Query => {
            let authorization = signer.sign_request(method.as_str(), &url, &params.rendered())?;
            let query = params.to_query_string();
            let url = if query.is_empty() {
                url
            } else if url.contains('?') {
                format!("{}&{}", url, query)
            } else {
                format!("{}?{}", url, query)
            };
            (url, authorization, RequestBody::Empty)
        }
        BodyEncoding::Form => {
            let authorization = signer.sign_request(method.as_str(), &url, &params.rendered())?;
            let body = if params.is_empty() {
                RequestBody::Empty
            } else {
                RequestBody::Form(params.to_query_string())
            };
            (url, authorization, body)
        }
        BodyEncoding::Multipart => {
            // multipart bodies are not part of the OAuth signature
            let authorization = signer.sign_request(method.as_str(), &url, &[])?;
            let form = multipart_form(params, progress).await?;
            (url, authorization, RequestBody::Multipart(form))
        }
    };

    debug!(method = %method, url = %url, ?encoding, "Prepared request");

    Ok(HttpExchange {
        method,
        url,
        authorization,
        body,
    })
}

async fn multipart_form(params: Parameters, progress: Option<&ProgressCallback>) -> TwitterResult<Form> {
    let mut form = Form::new().percent_encode_noop();

    for (key, value) in params.into_entries() {
        form = match value {
            ParamValue::Media(media) => form.part(key, media_part(media, progress).await?),
            other => match other.render() {
                Some(text) => form.text(key, text),
                None => form,
            },
        };
    }

    Ok(form)
}

async fn media_part(media: Media, progress: Option<&ProgressCallback>) -> TwitterResult<Part> {
    let file_name = sanitize_file_name(media.file_name.as_deref().unwrap_or("file"));

    let part = match media.source {
        MediaSource::Bytes(bytes) => match progress {
            None => Part::bytes(bytes.to_vec()),
            Some(callback) => {
                let len = bytes.len() as u64;
                let body = progress_body(chunk_bytes(bytes), Some(len), callback.clone());
                Part::stream_with_length(body, len)
            }
        },
        MediaSource::File(path) => {
            let file = tokio::fs::File::open(&path).await?;
            let len = file.metadata().await?.len();
            let stream: ByteStream = Box::pin(ReaderStream::new(file));
            Part::stream_with_length(stream_body(stream, Some(len), progress), len)
        }
        MediaSource::Stream { stream, length } => {
            let body = stream_body(stream, length, progress);
            match length {
                Some(len) => Part::stream_with_length(body, len),
                // unknown length: the body goes out chunked
                None => Part::stream(body),
            }
        }
    };

    part.file_name(file_name)
        .mime_str("application/octet-stream")
        .map_err(TwitterError::Http)
}

fn stream_body(stream: ByteStream, total: Option<u64>, progress: Option<&ProgressCallback>) -> Body {
    match progress {
        Some(callback) => progress_body(stream, total, callback.clone()),
        None => Body::wrap_stream(stream),
    }
}

fn progress_body(stream: ByteStream, total: Option<u64>, callback: ProgressCallback) -> Body {
    Body::wrap_stream(ProgressStream {
        inner: stream,
        sent: 0,
        total,
        callback,
    })
}

fn chunk_bytes(bytes: Bytes) -> ByteStream {
    let chunks: Vec<io::Result<Bytes>> = (0..bytes.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| Ok(bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len()))))
        .collect();
    Box::pin(futures_util::stream::iter(chunks))
}

/// Escape characters that could break out of the `Content-Disposition` header
pub fn sanitize_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_control() || c == '"' || c == '\\' {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

struct ProgressStream {
    inner: ByteStream,
    sent: u64,
    total: Option<u64>,
    callback: ProgressCallback,
}

impl Stream for ProgressStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            this.sent += chunk.len() as u64;
            (this.callback)(UploadProgress {
                sent: this.sent,
                total: this.total,
            });
        }
        polled
    }
}

/// A completed non-streaming response
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
    pub rate_limit: Option<RateLimitStatus>,
}

impl RawResponse {
    /// Deserialize the body into the expected shape
    pub fn decode<T: DeserializeOwned>(self) -> TwitterResult<ApiResponse<T>> {
        let data = serde_json::from_str(&self.body).map_err(|e| {
            TwitterError::Parse(format!("Failed to deserialize JSON: {}", e))
        })?;
        Ok(ApiResponse {
            data,
            rate_limit: self.rate_limit,
        })
    }
}

/// REST client trait for making signed HTTP requests
///
/// Implementations own signing, encoding, transport, and response
/// classification. Nothing here retries a failed call.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Execute a request and read the complete response body
    ///
    /// # Returns
    /// The raw response on a success status, `TwitterError::Api` otherwise
    async fn execute(&self, request: ApiRequest, call: CallOptions) -> TwitterResult<RawResponse>;

    /// Open a long-lived streaming response; the body is left unread
    async fn open_stream(&self, request: ApiRequest, cancel: CancellationToken) -> TwitterResult<Response>;

    /// Make a GET request with strongly-typed response
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Parameters,
    ) -> TwitterResult<ApiResponse<T>>;

    /// Make a POST request with strongly-typed response
    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Parameters,
    ) -> TwitterResult<ApiResponse<T>>;
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    options: ConnectionOptions,
    signer: Option<Arc<dyn Signer>>,
    pool: Option<ClientPool>,
}

impl RestClientBuilder {
    /// Create a new builder with the given connection options
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            signer: None,
            pool: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Share an existing client pool instead of creating a new one
    pub fn with_pool(mut self, pool: ClientPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> TwitterResult<ReqwestRest> {
        let signer = self.signer.ok_or_else(|| {
            TwitterError::Auth("Authentication required but no signer provided".to_string())
        })?;

        Ok(ReqwestRest {
            options: Arc::new(RwLock::new(self.options)),
            signer,
            pool: self.pool.unwrap_or_default(),
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    options: Arc<RwLock<ConnectionOptions>>,
    signer: Arc<dyn Signer>,
    pool: ClientPool,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("options", &self.options)
            .field("pool_size", &self.pool.len())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    /// Copy of the current options; a call works from one snapshot throughout
    pub fn options(&self) -> ConnectionOptions {
        self.options
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Replace the options for calls started from now on
    pub fn set_options(&self, options: ConnectionOptions) {
        match self.options.write() {
            Ok(mut guard) => *guard = options,
            Err(poisoned) => *poisoned.into_inner() = options,
        }
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    async fn send_exchange(
        &self,
        request: ApiRequest,
        options: &ConnectionOptions,
        progress: Option<&ProgressCallback>,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> TwitterResult<Response> {
        let client = self.pool.client(&PoolKey::from_options(options, streaming))?;
        let exchange = build_exchange(request, self.signer.as_ref(), progress).await?;
        let builder = exchange.into_request(&client);

        race(cancel, options.timeout, builder.send()).await?.map_err(TwitterError::Http)
    }
}

/// Run `fut` against both the cancellation token and a deadline.
/// Dropping the losing future aborts its connection.
async fn race<F, T>(cancel: &CancellationToken, deadline: Duration, fut: F) -> TwitterResult<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TwitterError::Cancelled),
        result = tokio::time::timeout(deadline, fut) => {
            result.map_err(|_| TwitterError::Timeout(deadline))
        }
    }
}

async fn read_error(response: Response, deadline: Duration, cancel: &CancellationToken) -> TwitterError {
    let status = response.status().as_u16();
    let rate_limit = RateLimitStatus::from_headers(response.headers());
    let body = match race(cancel, deadline, response.text()).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => return TwitterError::Http(e),
        Err(e) => return e,
    };
    classify_error(status, &body, rate_limit).into()
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, request, call), fields(method = %request.method, url = %request.url, param_count = request.params.len()))]
    async fn execute(&self, request: ApiRequest, call: CallOptions) -> TwitterResult<RawResponse> {
        let options = self.options();
        let cancel = call.cancel.unwrap_or_default();

        let response = self
            .send_exchange(request, &options, call.progress.as_ref(), false, &cancel)
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let rate_limit = RateLimitStatus::from_headers(&headers);
        if let Some(limit) = rate_limit.filter(RateLimitStatus::is_exhausted) {
            warn!(limit = limit.limit, reset = %limit.reset, "Rate limit window exhausted");
        }

        if !status.is_success() {
            return Err(read_error(response, options.read_write_timeout, &cancel).await);
        }

        let body = race(&cancel, options.read_write_timeout, response.text())
            .await?
            .map_err(TwitterError::Http)?;

        trace!("Response body: {}", body);

        Ok(RawResponse {
            status,
            headers,
            body,
            rate_limit,
        })
    }

    #[instrument(skip(self, request, cancel), fields(method = %request.method, url = %request.url))]
    async fn open_stream(&self, request: ApiRequest, cancel: CancellationToken) -> TwitterResult<Response> {
        let options = self.options().for_streaming();

        let response = self
            .send_exchange(request, &options, None, true, &cancel)
            .await?;

        if !response.status().is_success() {
            return Err(read_error(response, options.read_write_timeout, &cancel).await);
        }

        debug!(status = %response.status(), "Stream connected");
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Parameters,
    ) -> TwitterResult<ApiResponse<T>> {
        self.execute(ApiRequest::get(url, params), CallOptions::default())
            .await?
            .decode()
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: Parameters,
    ) -> TwitterResult<ApiResponse<T>> {
        self.execute(ApiRequest::post(url, params), CallOptions::default())
            .await?
            .decode()
    }
}
