use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::media::compute_file_checksum;

#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("local source {path} does not exist")]
    Missing { path: PathBuf },
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a clip source reference to a local file. The compiler and the
/// encoder only ever see resolved local paths, never raw URLs.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, SourceFetchError>;
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Local paths pass through after an existence check; http(s) URLs stream
/// into the job directory.
pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl HttpSourceFetcher {
    pub fn new() -> Self {
        HttpSourceFetcher {
            client: reqwest::Client::new(),
        }
    }

    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, SourceFetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SourceFetchError::Http {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(SourceFetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let file_name = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty() && !name.contains('?'))
            .unwrap_or("source.bin");
        let path = dest_dir.join(format!("{}-{file_name}", Uuid::new_v4()));

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| SourceFetchError::Io {
                path: path.clone(),
                source,
            })?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| SourceFetchError::Http {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|source| SourceFetchError::Io {
                    path: path.clone(),
                    source,
                })?;
        }
        file.flush().await.map_err(|source| SourceFetchError::Io {
            path: path.clone(),
            source,
        })?;

        if let Ok(checksum) = compute_file_checksum(&path).await {
            debug!("fetched {url} -> {} (sha256 {checksum})", path.display());
        }
        Ok(path)
    }
}

impl Default for HttpSourceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, SourceFetchError> {
        if is_remote(source) {
            self.download(source, dest_dir).await
        } else {
            let path = PathBuf::from(source);
            match tokio::fs::metadata(&path).await {
                Ok(_) => Ok(path),
                Err(_) => Err(SourceFetchError::Missing { path }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_schemes_are_classified_as_remote() {
        assert!(is_remote("https://cdn.example.com/clip.mp4"));
        assert!(is_remote("http://host/clip.mp4"));
        assert!(!is_remote("/data/clips/clip.mp4"));
        assert!(!is_remote("clips/clip.mp4"));
    }

    #[tokio::test]
    async fn local_existing_path_passes_through_untouched() {
        let dir = std::env::temp_dir();
        let file = dir.join(format!("fetch-test-{}.bin", Uuid::new_v4()));
        tokio::fs::write(&file, b"data").await.unwrap();

        let fetcher = HttpSourceFetcher::new();
        let resolved = fetcher
            .fetch(file.to_str().unwrap(), &dir)
            .await
            .unwrap();
        assert_eq!(resolved, file);

        tokio::fs::remove_file(&file).await.unwrap();
    }

    #[tokio::test]
    async fn missing_local_path_is_a_fetch_error() {
        let fetcher = HttpSourceFetcher::new();
        let err = fetcher
            .fetch("/nonexistent/clip.mp4", &std::env::temp_dir())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceFetchError::Missing { .. }));
    }
}
