pub mod blocking;
pub mod client;
pub mod core;
pub mod oauth;
pub mod requests;
pub mod streaming;

pub use blocking::{BlockingClient, BlockingStream};
pub use client::{ApiBase, TwitterClient};
pub use core::{
    config::{ClientConfig, ConnectionOptions, Credentials},
    errors::{ApiError, TwitterError, TwitterResult},
    params::{Media, ParamValue, Parameters},
    traits::{ParamEnum, ParamFlags, ToParameters},
    types::*,
};
pub use oauth::OAuthFlow;
pub use streaming::{StreamKind, StreamMessage, StreamParameters};
