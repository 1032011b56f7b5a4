//! Authenticated HTTP client for the Discord REST API
//!
//! Wraps reqwest::Client with bot token injection and rate limit handling.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::Settings;

/// Give up on a request after this many rate limited attempts
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    retry_after: f64,
}

/// Client for the Discord REST API, authenticated as a bot.
pub struct DiscordClient {
    http: reqwest::Client,
    token: String,
    api_base: Url,
}

impl DiscordClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_base = Url::parse(settings.api_base.trim_end_matches('/'))
            .with_context(|| format!("Invalid API base URL: {}", settings.api_base))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!(
                "DiscordBot (trial-transcript, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            token: settings.discord_token.clone(),
            api_base,
        })
    }

    /// Build an API URL from path segments and query pairs.
    pub fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    /// GET an API URL with bot auth and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let mut attempt = 0;

        loop {
            tracing::debug!("Discord GET {}", url);
            let resp = self
                .http
                .get(url.clone())
                .header("Authorization", format!("Bot {}", self.token))
                .send()
                .await
                .with_context(|| format!("Discord GET {} failed", url))?;

            if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
                && attempt < MAX_RATE_LIMIT_RETRIES
            {
                attempt += 1;
                let wait = retry_after(resp).await;
                tracing::warn!(
                    "Rate limited on {}, retrying in {:.2}s (attempt {}/{})",
                    url,
                    wait.as_secs_f64(),
                    attempt,
                    MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let resp = check_response(resp, url.as_str()).await?;
            return resp
                .json()
                .await
                .with_context(|| format!("Failed to parse response from {}", url));
        }
    }

    /// Download a file from the CDN. No credentials are sent.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("Download {}", url);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Download {} failed", url))?;

        let resp = check_response(resp, url).await?;
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;
        Ok(bytes.to_vec())
    }
}

/// How long a 429 response asks us to wait. Falls back to one second.
async fn retry_after(resp: reqwest::Response) -> Duration {
    let header = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok());

    let secs = match header {
        Some(secs) => secs,
        None => resp
            .json::<RateLimitResponse>()
            .await
            .map(|r| r.retry_after)
            .unwrap_or(1.0),
    };

    if !secs.is_finite() {
        return Duration::from_secs(1);
    }
    Duration::from_secs_f64(secs.clamp(0.0, 60.0))
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Check that discord_token is a valid bot token.",
            url
        );
    }
    if status == reqwest::StatusCode::FORBIDDEN {
        bail!(
            "403 Forbidden for {}. The bot needs the View Channel and Read Message History permissions.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}
