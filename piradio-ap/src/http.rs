//! HTTP transport
//!
//! The core sees fetching through the [`Fetcher`] trait: `open` yields the
//! declared media type before any body is read (an MP3 stream never ends),
//! `fetch` returns a complete body. [`HttpClient`] implements it on reqwest.

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use piradio_common::PlayerConfig;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Body chunks as they arrive
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// A response whose body has not been read yet
pub struct Resource {
    /// Final URL (after redirects), base for relative playlist entries
    pub url: String,
    /// Declared `Content-Type`, empty when absent
    pub media_type: String,
    pub body: ByteStream,
}

impl Resource {
    /// Wrap an in-memory body
    pub fn from_bytes(url: impl Into<String>, media_type: impl Into<String>, body: Bytes) -> Self {
        Self {
            url: url.into(),
            media_type: media_type.into(),
            body: stream::once(async move { Ok::<_, Error>(body) }).boxed(),
        }
    }

    /// Read the whole body
    pub async fn collect(self) -> Result<Fetched> {
        let Resource {
            url,
            media_type,
            mut body,
        } = self;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        Ok(Fetched {
            url,
            media_type,
            body: buffer.freeze(),
        })
    }
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub media_type: String,
    pub body: Bytes,
}

impl Fetched {
    /// Body as text (lossy), for playlist parsing
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Source of remote resources
pub trait Fetcher: Send + Sync {
    /// Issue the request and return once headers are in
    fn open(&self, url: &str) -> impl Future<Output = Result<Resource>> + Send;

    /// Fetch a bounded resource completely
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Fetched>> + Send {
        async move { self.open(url).await?.collect().await }
    }
}

/// reqwest-backed [`Fetcher`]
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpClient {
    /// Build a client
    ///
    /// # Arguments
    /// - `user_agent`: sent with every request
    /// - `connect_timeout`: applies to every request
    /// - `request_timeout`: applies to bounded fetches only, never to `open`
    pub fn new(user_agent: &str, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::fetch("<client>", e))?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    pub fn from_config(config: &PlayerConfig) -> Result<Self> {
        Self::new(
            &config.user_agent,
            config.connect_timeout(),
            config.request_timeout(),
        )
    }

    async fn send(&self, url: &str, timeout: Option<Duration>) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| Error::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {}", status)));
        }
        Ok(response)
    }

    fn media_type(response: &reqwest::Response) -> String {
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

impl Fetcher for HttpClient {
    async fn open(&self, url: &str) -> Result<Resource> {
        let response = self.send(url, None).await?;
        let media_type = Self::media_type(&response);
        let final_url = response.url().to_string();
        debug!(url = %final_url, media_type = %media_type, "Opened resource");

        let error_url = final_url.clone();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| Error::fetch(error_url.as_str(), e)))
            .boxed();

        Ok(Resource {
            url: final_url,
            media_type,
            body,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Fetched> {
        let response = self.send(url, Some(self.request_timeout)).await?;
        let media_type = Self::media_type(&response);
        let final_url = response.url().to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::fetch(final_url.as_str(), e))?;
        debug!(
            url = %final_url,
            media_type = %media_type,
            bytes = body.len(),
            "Fetched resource"
        );

        Ok(Fetched {
            url: final_url,
            media_type,
            body,
        })
    }
}
