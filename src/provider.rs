use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use http::{Request, Response};
use tracker::HttpRequest;

use crate::config;

/// Backend access for the tracking view, over reqwest.
#[derive(Debug, Clone)]
pub struct Provider {
    client: reqwest::Client,
}

impl Provider {
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config::get_request_timeout_secs()))
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

impl HttpRequest for Provider {
    async fn fetch(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let (parts, body) = request.into_parts();
        tracing::debug!(method = %parts.method, uri = %parts.uri, "backend request");

        let response = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .context("sending backend request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.context("reading backend response")?;

        let mut builder = Response::builder().status(status);
        if let Some(map) = builder.headers_mut() {
            map.extend(headers);
        }
        builder.body(body).context("building response")
    }
}

impl realtime::Config for Provider {
    async fn get(&self, key: &str) -> Result<String> {
        match key {
            "API_BASE_URL" => Ok(config::get_api_base_url()),
            _ => std::env::var(key).with_context(|| format!("{key} not set")),
        }
    }
}
