use anyhow::Context;
use tracing_subscriber::EnvFilter;
use twitx::streaming::{StreamKind, StreamParameters};
use twitx::core::config::ConfigError;
use twitx::{ClientConfig, StreamMessage, TwitterClient};

/// Reads `TWITTER_CONSUMER_KEY`, `TWITTER_ACCESS_TOKEN`, ... from `.env` or the environment
fn load_config() -> Result<ClientConfig, ConfigError> {
    #[cfg(feature = "env-file")]
    return ClientConfig::from_env_file("TWITTER");

    #[cfg(not(feature = "env-file"))]
    ClientConfig::from_env("TWITTER")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config().context("loading credentials")?;
    let client = TwitterClient::new(config)?;

    if client.config().has_user_token() {
        let me = client.verify_credentials().await?;
        println!(
            "Authenticated as @{} (rate limit: {:?})",
            me.data.screen_name.as_deref().unwrap_or("?"),
            me.rate_limit
        );
    }

    let track: Vec<String> = std::env::args().skip(1).collect();
    if track.is_empty() {
        println!("Pass one or more terms to follow them on the filter stream");
        return Ok(());
    }

    let params = StreamParameters::default().track(track).with_stall_warnings();
    let mut stream = client.stream_lenient(StreamKind::Filter, &params).await?;
    let cancel = stream.cancel_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    while let Some(message) = stream.next_message().await {
        match message? {
            StreamMessage::Status(status) => println!("{}", status.text),
            StreamMessage::Warning(warning) => tracing::warn!(code = %warning.code, "Stream warning"),
            StreamMessage::Disconnect(notice) => {
                tracing::warn!(code = notice.code, reason = ?notice.reason, "Disconnected by server");
                break;
            }
            other => tracing::debug!(kind = other.kind(), "Stream message"),
        }
    }

    Ok(())
}
