//! FTP transport: connect, retrieve the file at the URL path, close.
//!
//! `suppaftp`'s blocking client runs on a `spawn_blocking` thread so it
//! doesn't stall the async worker pool.

use super::Fetcher;
use crate::errors::PipelineError;
use crate::models::Credentials;
use async_trait::async_trait;
use std::time::Duration;
use suppaftp::FtpStream;

pub struct FtpFetcher {
    timeout: Duration,
}

impl FtpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Splits an `ftp://host[:port]/path/to/file` URL into its connect address
/// and remote path. Doesn't pull in a URL-parsing crate for this one split.
fn split_ftp_url(url: &str) -> Result<(String, String), PipelineError> {
    let rest = url
        .strip_prefix("ftp://")
        .ok_or_else(|| PipelineError::Fetch(format!("not an ftp:// url: {url}")))?;
    let (host, path) = rest
        .split_once('/')
        .ok_or_else(|| PipelineError::Fetch(format!("ftp url missing path: {url}")))?;
    let addr = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:21")
    };
    Ok((addr, format!("/{path}")))
}

fn fetch_blocking(addr: &str, path: &str, credentials: Option<&Credentials>, timeout: Duration) -> Result<Vec<u8>, PipelineError> {
    let mut stream = FtpStream::connect(addr)
        .map_err(|e| PipelineError::Fetch(format!("ftp connect failed for {addr}: {e}")))?;
    stream.get_ref().set_read_timeout(Some(timeout)).ok();

    match credentials {
        Some(creds) => stream.login(&creds.username, &creds.password),
        None => stream.login("anonymous", "anonymous@"),
    }
    .map_err(|e| PipelineError::Fetch(format!("ftp login failed for {addr}: {e}")))?;

    let bytes = stream
        .retr_as_buffer(path)
        .map_err(|e| PipelineError::Fetch(format!("ftp retrieve failed for {path}: {e}")))?
        .into_inner();

    stream.quit().ok();
    Ok(bytes)
}

#[async_trait]
impl Fetcher for FtpFetcher {
    async fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> Result<Vec<u8>, PipelineError> {
        let (addr, path) = split_ftp_url(url)?;
        let creds = credentials.cloned();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || fetch_blocking(&addr, &path, creds.as_ref(), timeout))
            .await
            .map_err(|e| PipelineError::Fetch(format!("ftp worker task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_path() {
        let (addr, path) = split_ftp_url("ftp://feeds.example.com/dealer/export.csv").unwrap();
        assert_eq!(addr, "feeds.example.com:21");
        assert_eq!(path, "/dealer/export.csv");
    }

    #[test]
    fn preserves_explicit_port() {
        let (addr, path) = split_ftp_url("ftp://feeds.example.com:2121/export.csv").unwrap();
        assert_eq!(addr, "feeds.example.com:2121");
        assert_eq!(path, "/export.csv");
    }

    #[test]
    fn rejects_non_ftp_scheme() {
        assert!(split_ftp_url("https://feeds.example.com/export.csv").is_err());
    }
}
