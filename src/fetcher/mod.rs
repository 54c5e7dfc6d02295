//! Fetcher (C1) — transports feed bytes over HTTP(S), FTP, and SFTP.

mod ftp;
mod http;
mod sftp;

use crate::errors::PipelineError;
use crate::models::{Credentials, TransportKind};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> Result<Vec<u8>, PipelineError>;
}

/// Dispatches to the transport-specific fetcher for `kind`.
pub struct TransportRegistry {
    timeout: Duration,
}

impl TransportRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn fetch(
        &self,
        kind: TransportKind,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>, PipelineError> {
        match kind {
            TransportKind::PublicUrl => http::HttpFetcher::new(self.timeout, false).fetch(url, credentials).await,
            TransportKind::AuthUrl => http::HttpFetcher::new(self.timeout, true).fetch(url, credentials).await,
            TransportKind::Ftp => ftp::FtpFetcher::new(self.timeout).fetch(url, credentials).await,
            TransportKind::Sftp => sftp::SftpFetcher::new(self.timeout).fetch(url, credentials).await,
            TransportKind::Upload => Err(PipelineError::Fetch(
                "UPLOAD transport has no remote fetch step; bytes arrive via the upload endpoint".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_transport_is_rejected_as_unfetchable() {
        let registry = TransportRegistry::new(Duration::from_secs(5));
        let result = registry.fetch(TransportKind::Upload, "ignored", None).await;
        assert!(result.is_err());
    }
}
