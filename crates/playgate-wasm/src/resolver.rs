//! Stream resolution for page scripts

use crate::{secure_origin, to_js};
use playgate_core::{DeclaredType, PlayerConfig, StreamResolver, StreamSource};
use wasm_bindgen::prelude::*;

/// Resolves configured mirrors to an effective URL and transport
#[wasm_bindgen]
pub struct PlaygateResolver {
    inner: StreamResolver,
}

#[wasm_bindgen]
impl PlaygateResolver {
    /// Upgrades `http://` URLs when the page is on HTTPS
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            inner: StreamResolver::new(secure_origin(), PlayerConfig::default().live_signatures),
        }
    }

    /// Returns `{ effectiveUrl, transportType }`
    #[wasm_bindgen]
    pub fn resolve(&self, url: &str, is_protected: bool, declared_type: Option<String>) -> Result<JsValue, JsValue> {
        let mut source = StreamSource::new(url);
        if is_protected {
            source = source.obfuscated();
        }
        if let Some(declared) = declared_type {
            let declared = declared
                .parse::<DeclaredType>()
                .map_err(crate::js_error)?;
            source = source.with_type(declared);
        }
        to_js(&self.inner.resolve(&source))
    }

    /// Transport sniffed from the URL alone
    #[wasm_bindgen(js_name = detectTransport)]
    pub fn detect_transport(&self, url: &str) -> String {
        self.inner.detect(url).to_string()
    }
}

impl Default for PlaygateResolver {
    fn default() -> Self {
        Self::new()
    }
}
