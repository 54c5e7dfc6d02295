//! SFTP transport: connect over SSH, retrieve the file at the URL
//! path, close. `ssh2` is synchronous, so the session runs on a
//! `spawn_blocking` thread like the FTP fetcher.

use super::Fetcher;
use crate::errors::PipelineError;
use crate::models::Credentials;
use async_trait::async_trait;
use ssh2::Session;
use std::io::Read;
use std::net::TcpStream;
use std::time::Duration;

pub struct SftpFetcher {
    timeout: Duration,
}

impl SftpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn split_sftp_url(url: &str) -> Result<(String, String), PipelineError> {
    let rest = url
        .strip_prefix("sftp://")
        .ok_or_else(|| PipelineError::Fetch(format!("not an sftp:// url: {url}")))?;
    let (host, path) = rest
        .split_once('/')
        .ok_or_else(|| PipelineError::Fetch(format!("sftp url missing path: {url}")))?;
    let addr = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:22")
    };
    Ok((addr, format!("/{path}")))
}

fn fetch_blocking(addr: &str, path: &str, credentials: Option<&Credentials>, timeout: Duration) -> Result<Vec<u8>, PipelineError> {
    let tcp = TcpStream::connect(addr)
        .map_err(|e| PipelineError::Fetch(format!("sftp connect failed for {addr}: {e}")))?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session = Session::new().map_err(|e| PipelineError::Fetch(format!("sftp session init failed: {e}")))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| PipelineError::Fetch(format!("sftp handshake failed for {addr}: {e}")))?;

    let creds = credentials.ok_or_else(|| PipelineError::Fetch(format!("sftp feed {addr} has no credentials")))?;
    session
        .userauth_password(&creds.username, &creds.password)
        .map_err(|e| PipelineError::Fetch(format!("sftp auth failed for {addr}: {e}")))?;
    if !session.authenticated() {
        return Err(PipelineError::Fetch(format!("sftp auth rejected for {addr}")));
    }

    let sftp = session
        .sftp()
        .map_err(|e| PipelineError::Fetch(format!("sftp channel open failed for {addr}: {e}")))?;
    let mut file = sftp
        .open(std::path::Path::new(path))
        .map_err(|e| PipelineError::Fetch(format!("sftp open failed for {path}: {e}")))?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .map_err(|e| PipelineError::Fetch(format!("sftp read failed for {path}: {e}")))?;
    Ok(buf)
}

#[async_trait]
impl Fetcher for SftpFetcher {
    async fn fetch(&self, url: &str, credentials: Option<&Credentials>) -> Result<Vec<u8>, PipelineError> {
        let (addr, path) = split_sftp_url(url)?;
        let creds = credentials.cloned();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || fetch_blocking(&addr, &path, creds.as_ref(), timeout))
            .await
            .map_err(|e| PipelineError::Fetch(format!("sftp worker task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_path() {
        let (addr, path) = split_sftp_url("sftp://feeds.example.com/dealer/export.xml").unwrap();
        assert_eq!(addr, "feeds.example.com:22");
        assert_eq!(path, "/dealer/export.xml");
    }

    #[test]
    fn preserves_explicit_port() {
        let (addr, path) = split_sftp_url("sftp://feeds.example.com:2222/export.xml").unwrap();
        assert_eq!(addr, "feeds.example.com:2222");
        assert_eq!(path, "/export.xml");
    }

    #[test]
    fn rejects_non_sftp_scheme() {
        assert!(split_sftp_url("ftp://feeds.example.com/export.xml").is_err());
    }
}
