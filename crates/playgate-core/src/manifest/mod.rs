//! Manifest loading for segmented sources

mod hls;

pub use hls::HlsParser;

use crate::types::QualityLevel;
use url::Url;

#[cfg(feature = "runtime")]
use crate::{transport::RetryBudget, Error, Result};
#[cfg(feature = "runtime")]
use async_trait::async_trait;
#[cfg(feature = "runtime")]
use tracing::{info, instrument, warn};

/// Parsed master playlist
#[derive(Debug, Clone)]
pub struct MasterManifest {
    /// Discrete quality levels, empty for single-variant streams
    pub levels: Vec<QualityLevel>,
    /// Base URL for resolving relative URIs
    pub base_url: Url,
    pub is_multivariant: bool,
}

/// Trait for manifest loaders
#[cfg(feature = "runtime")]
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    /// Fetch and parse the master playlist at `url`
    async fn load(&self, url: &Url) -> Result<MasterManifest>;
}

/// Fetches playlists over HTTP with the manifest retry budget
#[cfg(feature = "runtime")]
pub struct HttpManifestLoader {
    client: reqwest::Client,
    budget: RetryBudget,
    parser: HlsParser,
}

#[cfg(feature = "runtime")]
impl HttpManifestLoader {
    pub fn new(budget: RetryBudget) -> Self {
        Self::with_client(reqwest::Client::new(), budget)
    }

    pub fn with_client(client: reqwest::Client, budget: RetryBudget) -> Self {
        Self {
            client,
            budget,
            parser: HlsParser::new(),
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>> {
        let request = self.client.get(url.clone()).send();
        let response = tokio::time::timeout(self.budget.timeout(), request)
            .await
            .map_err(|_| Error::Timeout {
                url: url.to_string(),
                timeout_ms: self.budget.timeout_ms,
            })??;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ManifestFetch(format!("{} returned {}", url, status)));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(feature = "runtime")]
#[async_trait]
impl ManifestLoader for HttpManifestLoader {
    #[instrument(skip(self), fields(url = %url))]
    async fn load(&self, url: &Url) -> Result<MasterManifest> {
        let mut attempt = 0;
        let body = loop {
            match self.fetch_once(url).await {
                Ok(body) => break body,
                Err(e) if e.is_recoverable() && attempt < self.budget.max_retries => {
                    let delay = self.budget.delay_for(attempt);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Manifest fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_recoverable() => {
                    return Err(Error::RetriesExhausted {
                        kind: "manifest".to_string(),
                        attempts: attempt + 1,
                    });
                }
                Err(e) => return Err(e),
            }
        };

        let manifest = self.parser.parse(&body, url)?;
        info!(levels = manifest.levels.len(), "Manifest parsed");
        Ok(manifest)
    }
}

/// Pick the level to cap adaptive selection at for a given ceiling height.
///
/// Returns the highest level at or below the ceiling, or the lowest level when
/// none qualifies. `None` only when there are no levels.
pub fn capped_level(levels: &[QualityLevel], ceiling_height: u32) -> Option<usize> {
    levels
        .iter()
        .filter(|l| l.height <= ceiling_height)
        .max_by_key(|l| (l.height, l.bitrate))
        .or_else(|| levels.iter().min_by_key(|l| (l.height, l.bitrate)))
        .map(|l| l.index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(heights: &[u32]) -> Vec<QualityLevel> {
        heights
            .iter()
            .enumerate()
            .map(|(index, &height)| QualityLevel {
                index,
                width: height * 16 / 9,
                height,
                bitrate: height as u64 * 4_000,
            })
            .collect()
    }

    #[test]
    fn test_capped_level_picks_highest_under_ceiling() {
        let levels = levels(&[360, 480, 720, 1080]);
        assert_eq!(capped_level(&levels, 720), Some(2));
        assert_eq!(capped_level(&levels, 800), Some(2));
        assert_eq!(capped_level(&levels, 4320), Some(3));
    }

    #[test]
    fn test_capped_level_forces_lowest() {
        let levels = levels(&[480, 720]);
        assert_eq!(capped_level(&levels, 240), Some(0));
        assert_eq!(capped_level(&[], 720), None);
    }
}
