//! Playgate WASM - Gated player logic for the browser
//!
//! Provides the playback and access-control core to a web page:
//! - Stream resolution for configured mirrors
//! - The player state machine with its preview gate
//! - Controls, touch gestures and keyboard shortcuts honoring the lock
//! - Preview floors persisted in `localStorage`
//!
//! ## Integration with a video element and hls.js
//!
//! ```javascript
//! import init, { PlaygatePlayer } from '@playgate/wasm';
//!
//! await init();
//! const player = new PlaygatePlayer();
//! player.mount({ source: { url, type: 'm3u8' }, asset: { contentType: 'movie', contentId: id },
//!                gate: { enabled: true, previewSeconds: 300 } });
//! setInterval(() => { player.tick(); applyCommands(player.takeCommands()); }, 500);
//! ```

use serde::Serialize;
use wasm_bindgen::prelude::*;

mod player;
mod resolver;
mod storage;

pub use player::PlaygatePlayer;
pub use resolver::PlaygateResolver;
pub use storage::LocalStorageFloorStore;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    playgate_core::init();
    web_sys::console::log_1(&"[Playgate WASM] Initialized".into());
}

/// Library version
#[wasm_bindgen]
pub fn version() -> String {
    playgate_core::VERSION.to_string()
}

/// Plain JS objects rather than `Map`s
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn js_error(error: playgate_core::Error) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// Monotonic page clock in milliseconds
pub(crate) fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}

/// Whether the page itself is served over HTTPS
pub(crate) fn secure_origin() -> bool {
    web_sys::window()
        .and_then(|w| w.location().protocol().ok())
        .map_or(true, |protocol| protocol == "https:")
}
