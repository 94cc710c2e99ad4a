use crate::client::{ApiBase, TwitterClient};
use crate::core::config::{ClientConfig, ConnectionOptions};
use crate::core::errors::{TwitterError, TwitterResult};
use crate::core::kernel::{CallOptions, LineCodec, RawResponse, StreamCodec, StreamSession};
use crate::core::params::Parameters;
use crate::core::traits::ToParameters;
use crate::core::types::{ApiResponse, MediaUpload, Status, User};
use crate::requests::{UpdateStatus, UploadMedia};
use crate::streaming::{StreamKind, StreamParameters};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

/// Blocking front end over [`TwitterClient`]
///
/// Every call runs the async pipeline to completion on a private
/// current-thread runtime. Must not be used from inside another runtime.
#[derive(Debug, Clone)]
pub struct BlockingClient {
    inner: TwitterClient,
    runtime: Arc<Runtime>,
}

impl BlockingClient {
    pub fn new(config: ClientConfig) -> TwitterResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(TwitterError::Io)?;
        let inner = TwitterClient::new(config)?;

        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    pub fn inner(&self) -> &TwitterClient {
        &self.inner
    }

    pub fn options(&self) -> ConnectionOptions {
        self.inner.options()
    }

    pub fn set_options(&self, options: ConnectionOptions) {
        self.inner.set_options(options);
    }

    pub fn send(
        &self,
        method: Method,
        base: ApiBase,
        template: &str,
        params: Parameters,
        call: CallOptions,
    ) -> TwitterResult<RawResponse> {
        self.runtime
            .block_on(self.inner.send(method, base, template, params, call))
    }

    pub fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        template: &str,
        params: Parameters,
    ) -> TwitterResult<ApiResponse<T>> {
        self.runtime.block_on(self.inner.call(method, template, params))
    }

    pub fn get<T, P>(&self, template: &str, params: &P) -> TwitterResult<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: ToParameters + ?Sized,
    {
        self.runtime.block_on(self.inner.get(template, params))
    }

    pub fn post<T, P>(&self, template: &str, params: &P) -> TwitterResult<ApiResponse<T>>
    where
        T: DeserializeOwned,
        P: ToParameters + ?Sized,
    {
        self.runtime.block_on(self.inner.post(template, params))
    }

    pub fn verify_credentials(&self) -> TwitterResult<ApiResponse<User>> {
        self.runtime.block_on(self.inner.verify_credentials())
    }

    pub fn update_status(&self, request: &UpdateStatus) -> TwitterResult<ApiResponse<Status>> {
        self.runtime.block_on(self.inner.update_status(request))
    }

    pub fn destroy_status(&self, id: u64) -> TwitterResult<ApiResponse<Status>> {
        self.runtime.block_on(self.inner.destroy_status(id))
    }

    pub fn upload_media(
        &self,
        request: UploadMedia,
        call: CallOptions,
    ) -> TwitterResult<ApiResponse<MediaUpload>> {
        self.runtime.block_on(self.inner.upload_media(request, call))
    }

    /// Open a stream whose messages are read by iterating
    pub fn stream(
        &self,
        kind: StreamKind,
        params: &StreamParameters,
    ) -> TwitterResult<BlockingStream<StreamCodec>> {
        self.stream_with(kind, params, StreamCodec, CancellationToken::new())
    }

    pub fn stream_with<C: LineCodec>(
        &self,
        kind: StreamKind,
        params: &StreamParameters,
        codec: C,
        cancel: CancellationToken,
    ) -> TwitterResult<BlockingStream<C>> {
        let session = self
            .runtime
            .block_on(self.inner.stream_with(kind, params, codec, cancel))?;
        Ok(BlockingStream {
            session,
            runtime: self.runtime.clone(),
        })
    }
}

/// Iterator over a streaming connection. Cancelling the session's token from
/// another thread ends the iteration.
#[derive(Debug)]
pub struct BlockingStream<C: LineCodec> {
    session: StreamSession<C>,
    runtime: Arc<Runtime>,
}

impl<C: LineCodec> BlockingStream<C> {
    pub fn cancel_token(&self) -> CancellationToken {
        self.session.cancel_token()
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

impl<C: LineCodec> Iterator for BlockingStream<C> {
    type Item = TwitterResult<C::Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.session.next_message())
    }
}
