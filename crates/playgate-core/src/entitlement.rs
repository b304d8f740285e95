//! Entitlement provider boundary
//!
//! The gate only needs two answers from the outside world: whether the viewer
//! is premium, and whether a redeem code unlocked the current asset.

use crate::types::AssetId;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

#[cfg(feature = "runtime")]
use tracing::{instrument, warn};
#[cfg(feature = "runtime")]
use url::Url;

/// Response of a redeem attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RedeemResult {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Codes are entered by hand; compare them case- and whitespace-insensitively
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[async_trait]
pub trait EntitlementProvider: Send + Sync {
    async fn is_premium(&self) -> Result<bool>;

    async fn redeem_code(&self, code: &str, asset: &AssetId) -> Result<RedeemResult>;
}

/// Fixed entitlement with a table of single-use codes
#[derive(Debug, Default)]
pub struct StaticEntitlement {
    premium: bool,
    /// Code to the asset it unlocks, `None` for any asset
    codes: Mutex<HashMap<String, Option<AssetId>>>,
}

impl StaticEntitlement {
    pub fn new(premium: bool) -> Self {
        Self {
            premium,
            codes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_code(self, code: &str, asset: Option<AssetId>) -> Self {
        if let Ok(mut codes) = self.codes.lock() {
            codes.insert(normalize_code(code), asset);
        }
        self
    }
}

#[async_trait]
impl EntitlementProvider for StaticEntitlement {
    async fn is_premium(&self) -> Result<bool> {
        Ok(self.premium)
    }

    async fn redeem_code(&self, code: &str, asset: &AssetId) -> Result<RedeemResult> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(RedeemResult::rejected("Code is empty"));
        }

        let mut codes = self
            .codes
            .lock()
            .map_err(|_| Error::Redeem("code table lock poisoned".into()))?;

        match codes.get(&code) {
            Some(Some(scope)) if scope != asset => Ok(RedeemResult::rejected("Code is not valid for this title")),
            Some(_) => {
                codes.remove(&code);
                info!(asset = %asset, "Redeem code accepted");
                Ok(RedeemResult::ok())
            }
            None => Ok(RedeemResult::rejected("Invalid code")),
        }
    }
}

#[cfg(feature = "runtime")]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RedeemRequest<'a> {
    code: &'a str,
    device_id: &'a str,
    content_type: &'a str,
    content_id: &'a str,
}

/// Redeems codes against the backend's `/api/redemptions/redeem`
#[cfg(feature = "runtime")]
pub struct HttpEntitlement {
    client: reqwest::Client,
    base_url: Url,
    device_id: String,
    premium: bool,
}

#[cfg(feature = "runtime")]
impl HttpEntitlement {
    pub fn new(base_url: Url, device_id: impl Into<String>, premium: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            device_id: device_id.into(),
            premium,
        }
    }
}

#[cfg(feature = "runtime")]
#[async_trait]
impl EntitlementProvider for HttpEntitlement {
    async fn is_premium(&self) -> Result<bool> {
        Ok(self.premium)
    }

    #[instrument(skip(self, code, asset), fields(asset = %asset))]
    async fn redeem_code(&self, code: &str, asset: &AssetId) -> Result<RedeemResult> {
        let code = normalize_code(code);
        let url = self
            .base_url
            .join("/api/redemptions/redeem")
            .map_err(|e| Error::InvalidConfig(format!("invalid entitlement base url: {}", e)))?;

        let body = RedeemRequest {
            code: &code,
            device_id: &self.device_id,
            content_type: &asset.content_type,
            content_id: &asset.content_id,
        };

        let response = match self.client.post(url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Redeem request failed");
                return Ok(RedeemResult::rejected("Network error"));
            }
        };

        let result: RedeemResult = response.json().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_codes_are_single_use() {
        let asset = AssetId::new("match", "derby");
        let provider = StaticEntitlement::new(false).with_code("gold-2024", None);

        assert!(!provider.is_premium().await.unwrap());
        assert_eq!(provider.redeem_code(" gold-2024 ", &asset).await.unwrap(), RedeemResult::ok());
        assert!(!provider.redeem_code("GOLD-2024", &asset).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_scoped_code() {
        let derby = AssetId::new("match", "derby");
        let other = AssetId::new("match", "final");
        let provider = StaticEntitlement::new(false).with_code("DERBY", Some(derby.clone()));

        let rejected = provider.redeem_code("derby", &other).await.unwrap();
        assert_eq!(rejected.error.as_deref(), Some("Code is not valid for this title"));
        assert!(provider.redeem_code("derby", &derby).await.unwrap().success);
    }

    #[test]
    fn test_blank_code_rejected() {
        let provider = StaticEntitlement::new(true).with_code("VIP", None);
        let result = tokio_test::block_on(provider.redeem_code("   ", &AssetId::new("movie", "m1"))).unwrap();
        assert_eq!(result, RedeemResult::rejected("Code is empty"));
        assert!(tokio_test::block_on(provider.is_premium()).unwrap());
    }

    #[test]
    fn test_redeem_result_json() {
        let parsed: RedeemResult = serde_json::from_str(r#"{"success":false,"error":"Code used"}"#).unwrap();
        assert_eq!(parsed, RedeemResult::rejected("Code used"));
        let parsed: RedeemResult = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(parsed.success);
    }
}
