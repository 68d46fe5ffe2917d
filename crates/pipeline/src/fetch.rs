//! Asset byte loading.
//!
//! Input assets live on local storage; generated results are external
//! URLs. Both are re-uploaded to RunningHub before a submission, so
//! the fetcher hides where the bytes come from.

use std::path::PathBuf;

use async_trait::async_trait;

use modella_db::models::asset::Asset;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Loads the raw bytes behind an asset reference.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, asset: &Asset) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher reading local files under a storage root and downloading
/// externally-hosted results over HTTP.
pub struct FsHttpFetcher {
    root: PathBuf,
    http: reqwest::Client,
}

impl FsHttpFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            http: reqwest::Client::new(),
        }
    }
}

fn is_external(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[async_trait]
impl AssetFetcher for FsHttpFetcher {
    async fn fetch(&self, asset: &Asset) -> Result<Vec<u8>, FetchError> {
        // Generated results store the remote URL; prefer `file_url`.
        let external = [&asset.file_url, &asset.file_path]
            .into_iter()
            .find(|value| is_external(value));

        if let Some(url) = external {
            let wrap = |source| FetchError::Download {
                url: url.clone(),
                source,
            };
            let response = self.http.get(url.as_str()).send().await.map_err(wrap)?;
            let response = response.error_for_status().map_err(wrap)?;
            let bytes = response.bytes().await.map_err(wrap)?;
            return Ok(bytes.to_vec());
        }

        let path = self.root.join(&asset.file_path);
        tokio::fs::read(&path).await.map_err(|source| FetchError::Read {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_url_detection() {
        assert!(is_external("https://cdn/x.png"));
        assert!(is_external("http://cdn/x.png"));
        assert!(!is_external("uploads/3/x.png"));
        assert!(!is_external(""));
    }
}
