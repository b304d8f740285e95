//! Player and preview-gate configuration
//!
//! `ConversionGateConfig` is the declarative option set the surrounding page
//! passes in; `GateSettings` holds the operator-wide fallbacks; the two are
//! folded into validated `GateParams` before a gate is armed.

use crate::transport::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default preview budget when neither the asset nor the settings provide one
pub const DEFAULT_PREVIEW_MINUTES: f64 = 26.0;

/// Drain multiplier when settings do not name one
pub const DEFAULT_DRAIN_MULTIPLIER: f64 = 1.0;

/// Player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Gate tick period (milliseconds)
    pub tick_interval_ms: u64,
    /// Largest wall-clock delta a single tick may credit (seconds)
    pub max_tick_delta_secs: f64,
    /// Controls hide after this much inactivity while playing (milliseconds)
    pub controls_hide_ms: u64,
    /// Skip-button and arrow-key seek step (seconds)
    pub seek_step_secs: f64,
    /// Speed menu entries
    pub playback_rates: Vec<f64>,
    /// Progress report period for entitled viewers (seconds)
    pub progress_interval_secs: u64,
    /// Retry policy for the adaptive client
    pub retry: RetryPolicy,
    /// URL fragments identifying known live-streaming CDNs
    pub live_signatures: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            max_tick_delta_secs: 15.0,
            controls_hide_ms: 3_000,
            seek_step_secs: 10.0,
            playback_rates: vec![0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0],
            progress_interval_secs: 15,
            retry: RetryPolicy::default(),
            live_signatures: vec![
                "akamaized.net/hls".to_string(),
                "akamaihd.net/i/".to_string(),
                "cloudfront.net/live".to_string(),
                "livepush.io".to_string(),
            ],
        }
    }
}

impl PlayerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig("tick_interval_ms must be positive".into()));
        }
        if !(self.max_tick_delta_secs.is_finite() && self.max_tick_delta_secs > 0.0) {
            return Err(Error::InvalidConfig("max_tick_delta_secs must be positive".into()));
        }
        if self.playback_rates.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(Error::InvalidConfig("playback rates must be positive".into()));
        }
        Ok(())
    }
}

/// Operator-wide fallbacks from the settings provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateSettings {
    pub preview_minutes: f64,
    pub drain_multiplier: f64,
    pub quality_ceiling: Option<u32>,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            preview_minutes: DEFAULT_PREVIEW_MINUTES,
            drain_multiplier: DEFAULT_DRAIN_MULTIPLIER,
            quality_ceiling: None,
        }
    }
}

/// Declarative gate options supplied per asset by the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConversionGateConfig {
    pub enabled: bool,
    pub preview_seconds: Option<f64>,
    pub daily_limit: Option<u32>,
    pub used_today: Option<u32>,
    pub reached_daily_limit: bool,
    /// Maximum vertical resolution while unentitled
    pub quality_cap: Option<u32>,
    pub timer_speed_multiplier: Option<f64>,
    /// Upgrade destination
    pub cta_href: Option<String>,
    pub force_redirect_on_lock: bool,
    pub redirect_delay_ms: Option<u64>,
    /// Title shown on the paywall
    pub content_label: Option<String>,
}

impl ConversionGateConfig {
    pub fn enabled() -> Self {
        Self { enabled: true, ..Default::default() }
    }
}

/// Effective, validated gate parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateParams {
    pub limit_seconds: f64,
    pub drain_multiplier: f64,
    pub quality_ceiling: Option<u32>,
    pub daily_cap_reached: bool,
    pub daily_limit: Option<u32>,
    pub used_today: Option<u32>,
    pub cta_href: Option<String>,
    pub force_redirect_on_lock: bool,
    pub redirect_delay_ms: u64,
    pub content_label: Option<String>,
}

/// Redirect delay used when the page asks for a redirect without a delay
pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 2_500;

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

impl GateParams {
    /// Fold per-asset overrides over the settings-provider fallbacks
    pub fn resolve(config: &ConversionGateConfig, settings: &GateSettings) -> Self {
        // Settings may only tighten the defaults: a shorter preview, a faster drain
        let fallback_limit = positive(Some(settings.preview_minutes))
            .map_or(DEFAULT_PREVIEW_MINUTES, |m| m.min(DEFAULT_PREVIEW_MINUTES))
            * 60.0;
        let fallback_drain = positive(Some(settings.drain_multiplier))
            .map_or(DEFAULT_DRAIN_MULTIPLIER, |d| d.max(DEFAULT_DRAIN_MULTIPLIER));

        Self {
            limit_seconds: positive(config.preview_seconds).unwrap_or(fallback_limit),
            drain_multiplier: positive(config.timer_speed_multiplier).unwrap_or(fallback_drain),
            quality_ceiling: config
                .quality_cap
                .filter(|h| *h > 0)
                .or(settings.quality_ceiling.filter(|h| *h > 0)),
            daily_cap_reached: config.reached_daily_limit,
            daily_limit: config.daily_limit,
            used_today: config.used_today,
            cta_href: config.cta_href.clone().filter(|h| !h.trim().is_empty()),
            force_redirect_on_lock: config.force_redirect_on_lock,
            redirect_delay_ms: config.redirect_delay_ms.unwrap_or(DEFAULT_REDIRECT_DELAY_MS),
            content_label: config.content_label.clone(),
        }
    }

    /// Free plays left today, when the quota collaborator reported one
    pub fn remaining_today(&self) -> Option<u32> {
        match (self.daily_limit, self.used_today) {
            (Some(limit), Some(used)) => Some(limit.saturating_sub(used)),
            (Some(limit), None) => Some(limit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_config_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.tick_interval_ms, 500);
        assert_eq!(config.max_tick_delta_secs, 15.0);
        assert_eq!(config.playback_rates.len(), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_player_config_partial_json() {
        let config = PlayerConfig::from_json_str(r#"{"tick_interval_ms": 250}"#).unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.controls_hide_ms, 3_000);

        assert!(PlayerConfig::from_json_str(r#"{"tick_interval_ms": 0}"#).is_err());
    }

    #[test]
    fn test_gate_config_camel_case() {
        let json = r#"{
            "enabled": true,
            "previewSeconds": 120,
            "reachedDailyLimit": false,
            "dailyLimit": 2,
            "usedToday": 1,
            "qualityCap": 720,
            "timerSpeedMultiplier": 2,
            "ctaHref": "/pricing?src=movie-preview",
            "forceRedirectOnLock": true
        }"#;
        let config: ConversionGateConfig = serde_json::from_str(json).unwrap();
        let params = GateParams::resolve(&config, &GateSettings::default());

        assert_eq!(params.limit_seconds, 120.0);
        assert_eq!(params.drain_multiplier, 2.0);
        assert_eq!(params.quality_ceiling, Some(720));
        assert_eq!(params.remaining_today(), Some(1));
        assert_eq!(params.redirect_delay_ms, DEFAULT_REDIRECT_DELAY_MS);
        assert!(params.force_redirect_on_lock);
    }

    #[test]
    fn test_invalid_overrides_fall_back() {
        let config = ConversionGateConfig {
            enabled: true,
            preview_seconds: Some(-5.0),
            timer_speed_multiplier: Some(0.0),
            quality_cap: Some(0),
            cta_href: Some("  ".into()),
            ..Default::default()
        };
        let settings = GateSettings {
            preview_minutes: 3.0,
            drain_multiplier: 1.5,
            quality_ceiling: Some(480),
        };
        let params = GateParams::resolve(&config, &settings);

        assert_eq!(params.limit_seconds, 180.0);
        assert_eq!(params.drain_multiplier, 1.5);
        assert_eq!(params.quality_ceiling, Some(480));
        assert_eq!(params.cta_href, None);
    }

    #[test]
    fn test_zero_ceiling_everywhere_means_none() {
        let config = ConversionGateConfig { quality_cap: Some(0), ..Default::default() };
        let settings = GateSettings { quality_ceiling: Some(0), ..Default::default() };
        assert_eq!(GateParams::resolve(&config, &settings).quality_ceiling, None);
    }

    #[test]
    fn test_settings_only_tighten_defaults() {
        let config = ConversionGateConfig { enabled: true, ..Default::default() };
        let loose = GateSettings {
            preview_minutes: 90.0,
            drain_multiplier: 0.25,
            quality_ceiling: None,
        };
        let params = GateParams::resolve(&config, &loose);
        assert_eq!(params.limit_seconds, DEFAULT_PREVIEW_MINUTES * 60.0);
        assert_eq!(params.drain_multiplier, DEFAULT_DRAIN_MULTIPLIER);

        let tight = GateSettings {
            preview_minutes: 5.0,
            drain_multiplier: 12.0,
            quality_ceiling: None,
        };
        let params = GateParams::resolve(&config, &tight);
        assert_eq!(params.limit_seconds, 300.0);
        assert_eq!(params.drain_multiplier, 12.0);

        // Per-asset overrides are taken as given
        let config = ConversionGateConfig {
            preview_seconds: Some(3_600.0),
            timer_speed_multiplier: Some(0.5),
            ..config
        };
        let params = GateParams::resolve(&config, &tight);
        assert_eq!(params.limit_seconds, 3_600.0);
        assert_eq!(params.drain_multiplier, 0.5);
    }
}
