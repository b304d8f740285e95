//! Progress Reporter
//!
//! Persists the playback position of entitled viewers so they can resume.
//! Best effort: failures are logged and never affect playback or the gate.

use crate::types::AssetId;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[cfg(feature = "runtime")]
use tracing::{debug, instrument};
#[cfg(feature = "runtime")]
use url::Url;

/// Body of `POST /api/watch/progress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub user_id: String,
    pub content_type: String,
    pub content_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    pub progress_seconds: f64,
    pub duration_seconds: f64,
}

impl ProgressUpdate {
    /// Watched far enough to count as finished
    pub fn is_finished(&self) -> bool {
        is_finished(self.progress_seconds, self.duration_seconds)
    }
}

/// Finished once within the last 8% or the last 90 seconds, whichever is later
pub fn is_finished(progress: f64, duration: f64) -> bool {
    duration > 0.0 && progress >= (duration * 0.92).max(duration - 90.0)
}

/// Response of `GET /api/watch/resume`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResumePosition {
    pub position: f64,
    pub duration: f64,
    pub updated_at: i64,
    pub is_finished: bool,
}

impl ResumePosition {
    /// Where to start: nothing for finished or unseen content
    pub fn start_at(&self) -> Option<f64> {
        if self.is_finished || !(self.position.is_finite() && self.position > 0.0) {
            None
        } else {
            Some(self.position)
        }
    }
}

#[async_trait]
pub trait ProgressApi: Send + Sync {
    async fn save(&self, update: &ProgressUpdate) -> Result<()>;

    async fn resume(&self, user_id: &str, asset: &AssetId) -> Result<ResumePosition>;
}

/// Decides when a position is worth reporting
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    user_id: String,
    asset: AssetId,
    series_id: Option<String>,
    interval_ms: f64,
    last_sent_ms: Option<f64>,
    last_position: Option<f64>,
}

impl ProgressReporter {
    pub fn new(user_id: impl Into<String>, asset: AssetId, interval_secs: u64) -> Self {
        Self {
            user_id: user_id.into(),
            asset,
            series_id: None,
            interval_ms: interval_secs as f64 * 1000.0,
            last_sent_ms: None,
            last_position: None,
        }
    }

    pub fn with_series(mut self, series_id: impl Into<String>) -> Self {
        self.series_id = Some(series_id.into());
        self
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    fn update(&self, position: f64, duration: Option<f64>) -> ProgressUpdate {
        ProgressUpdate {
            user_id: self.user_id.clone(),
            content_type: self.asset.content_type.clone(),
            content_id: self.asset.content_id.clone(),
            series_id: self.series_id.clone(),
            progress_seconds: position.max(0.0).floor(),
            duration_seconds: duration.unwrap_or(0.0).max(0.0).floor(),
        }
    }

    fn moved(&self, position: f64) -> bool {
        self.last_position.map_or(true, |last| (position - last).abs() >= 1.0)
    }

    /// Periodic report while playing
    pub fn due(&mut self, now_ms: f64, position: f64, duration: Option<f64>) -> Option<ProgressUpdate> {
        if !position.is_finite() || position <= 0.0 {
            return None;
        }
        let elapsed_ok = self.last_sent_ms.map_or(true, |last| now_ms - last >= self.interval_ms);
        if !elapsed_ok || !self.moved(position) {
            return None;
        }
        self.last_sent_ms = Some(now_ms);
        self.last_position = Some(position);
        Some(self.update(position, duration))
    }

    /// Report on pause or teardown regardless of the interval
    pub fn flush(&mut self, now_ms: f64, position: f64, duration: Option<f64>) -> Option<ProgressUpdate> {
        if !position.is_finite() || position <= 0.0 || !self.moved(position) {
            return None;
        }
        self.last_sent_ms = Some(now_ms);
        self.last_position = Some(position);
        Some(self.update(position, duration))
    }
}

/// In-process progress store, merging like the backend does
#[derive(Debug, Default)]
pub struct MemoryProgressApi {
    rows: Mutex<HashMap<(String, String), ResumePosition>>,
}

impl MemoryProgressApi {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressApi for MemoryProgressApi {
    async fn save(&self, update: &ProgressUpdate) -> Result<()> {
        let key = (update.user_id.clone(), format!("{}:{}", update.content_type, update.content_id));
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| Error::Storage("progress table lock poisoned".into()))?;
        let row = rows.entry(key).or_default();
        row.position = row.position.max(update.progress_seconds);
        row.duration = row.duration.max(update.duration_seconds);
        row.is_finished = row.is_finished || update.is_finished();
        row.updated_at = chrono::Utc::now().timestamp_millis();
        Ok(())
    }

    async fn resume(&self, user_id: &str, asset: &AssetId) -> Result<ResumePosition> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| Error::Storage("progress table lock poisoned".into()))?;
        Ok(rows
            .get(&(user_id.to_string(), asset.storage_key()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Talks to `/api/watch/progress` and `/api/watch/resume`
#[cfg(feature = "runtime")]
pub struct HttpProgressApi {
    client: reqwest::Client,
    base_url: Url,
}

#[cfg(feature = "runtime")]
impl HttpProgressApi {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidConfig(format!("invalid progress base url: {}", e)))
    }
}

#[cfg(feature = "runtime")]
#[async_trait]
impl ProgressApi for HttpProgressApi {
    #[instrument(skip(self, update), fields(content = %update.content_id, position = update.progress_seconds))]
    async fn save(&self, update: &ProgressUpdate) -> Result<()> {
        let url = self.endpoint("/api/watch/progress")?;
        let response = self.client.post(url).json(update).send().await?;
        response.error_for_status()?;
        debug!("Progress saved");
        Ok(())
    }

    #[instrument(skip(self, user_id, asset), fields(asset = %asset))]
    async fn resume(&self, user_id: &str, asset: &AssetId) -> Result<ResumePosition> {
        let mut url = self.endpoint("/api/watch/resume")?;
        url.query_pairs_mut()
            .append_pair("userId", user_id)
            .append_pair("contentType", &asset.content_type)
            .append_pair("contentId", &asset.content_id);

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
