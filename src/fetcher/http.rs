//! HTTP(S) transport, with optional Basic auth for AUTH_URL feeds.

use super::Fetcher;
use crate::errors::PipelineError;
use crate::models::Credentials;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use std::time::Duration;

const MAX_REDIRECTS: usize = 5;

pub struct HttpFetcher {
    client: Client,
    use_basic_auth: bool,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, use_basic_auth: bool) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent("dealer-ingest-pipeline/1.0")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, use_basic_auth }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> Result<Vec<u8>, PipelineError> {
        let mut request = self.client.get(url);

        if self.use_basic_auth {
            if let Some(creds) = credentials {
                let token = STANDARD.encode(format!("{}:{}", creds.username, creds.password));
                request = request.header("Authorization", format!("Basic {token}"));
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PipelineError::Timeout(format!("timeout fetching {url}: {e}"))
            } else {
                PipelineError::Fetch(format!("fetch failed for {url}: {e}"))
            }
        })?;

        if !response.status().is_success() {
            return Err(PipelineError::Fetch(format!(
                "fetch error: {url} returned {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("unknown")
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Fetch(format!("fetch failed reading body for {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}
