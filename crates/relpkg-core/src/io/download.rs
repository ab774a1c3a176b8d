//! Streaming asset downloads.

use std::path::Path;

use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Download `url` byte-for-byte into `dest`, returning the number of bytes
/// written. Non-2xx responses are errors; a partial file is removed.
///
/// # Errors
///
/// Returns [`DownloadError::Http`] on transport failures or a non-success
/// status, and [`DownloadError::Io`] if `dest` cannot be written.
pub async fn download_to(client: &Client, url: &str, dest: &Path) -> Result<u64, DownloadError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .header(reqwest::header::ACCEPT, "application/octet-stream")
        .send()
        .await?
        .error_for_status()?;

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let result = write_stream(response, dest).await;
    if result.is_err() {
        tokio::fs::remove_file(dest).await.ok();
    }
    result
}

async fn write_stream(response: reqwest::Response, dest: &Path) -> Result<u64, DownloadError> {
    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_download_writes_exact_bytes() {
        let mut server = Server::new_async().await;
        let body: Vec<u8> = (0u8..=255).collect();
        let _m = server
            .mock("GET", "/assets/yq_linux_amd64")
            .with_status(200)
            .with_body(&body)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("yq");
        let url = format!("{}/assets/yq_linux_amd64", server.url());

        let written = download_to(&Client::new(), &url, &dest).await.unwrap();
        assert_eq!(written, 256);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing");
        let url = format!("{}/missing", server.url());

        let err = download_to(&Client::new(), &url, &dest).await.unwrap_err();
        assert!(matches!(err, DownloadError::Http(_)));
        assert!(!dest.exists());
    }
}
