//! Player bindings
//!
//! The page owns the `<video>` element (or iframe, or hls.js instance). It
//! forwards media events here and applies the commands it gets back from
//! `takeCommands()`; every call timestamps itself with the page clock.

use crate::storage::LocalStorageFloorStore;
use crate::{from_js, js_error, now_ms, secure_origin, to_js};
use playgate_core::{
    key_action, ControlAction, ControlOutcome, GateSettings, GestureTracker, MediaEvent, MountRequest, Player,
    PlayerConfig, RecordingSurface, StreamSource, Viewport,
};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct PlaygatePlayer {
    player: Player,
    surface: RecordingSurface,
    gestures: GestureTracker,
}

#[wasm_bindgen]
impl PlaygatePlayer {
    /// `config` is an optional `PlayerConfig` object, `settings` optional `GateSettings`
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, settings: JsValue) -> Result<PlaygatePlayer, JsValue> {
        let config: PlayerConfig = if config.is_undefined() || config.is_null() {
            PlayerConfig::default()
        } else {
            from_js(config)?
        };
        config.validate().map_err(js_error)?;
        let settings: GateSettings = if settings.is_undefined() || settings.is_null() {
            GateSettings::default()
        } else {
            from_js(settings)?
        };

        let surface = RecordingSurface::new();
        let player = Player::new(
            config,
            settings,
            Box::new(surface.clone()),
            Box::new(LocalStorageFloorStore::new()),
            secure_origin(),
        );
        Ok(Self {
            player,
            surface,
            gestures: GestureTracker::new(Viewport { width: 0.0, height: 0.0 }),
        })
    }

    /// Mount `{ source, asset, gate, entitled }`; returns the resolved source
    #[wasm_bindgen]
    pub fn mount(&mut self, request: JsValue) -> Result<JsValue, JsValue> {
        let request: MountRequest = from_js(request)?;
        let resolved = self.player.mount(now_ms(), request).map_err(js_error)?;
        to_js(&resolved)
    }

    /// Switch to another mirror of the mounted asset
    #[wasm_bindgen(js_name = switchSource)]
    pub fn switch_source(&mut self, source: JsValue) -> Result<JsValue, JsValue> {
        let source: StreamSource = from_js(source)?;
        let resolved = self.player.switch_source(now_ms(), source).map_err(js_error)?;
        to_js(&resolved)
    }

    #[wasm_bindgen]
    pub fn unmount(&mut self) {
        self.player.unmount(now_ms());
    }

    /// Forward a media event, e.g. `{ event: "time_update", position: 12.3 }`
    #[wasm_bindgen(js_name = handleMediaEvent)]
    pub fn handle_media_event(&mut self, event: JsValue) -> Result<(), JsValue> {
        let event: MediaEvent = from_js(event)?;
        self.player.handle_media_event(now_ms(), &event);
        Ok(())
    }

    /// Call on the configured tick interval
    #[wasm_bindgen]
    pub fn tick(&mut self) {
        self.player.tick(now_ms());
    }

    /// Dispatch `{ action, value }`; returns the outcome
    #[wasm_bindgen]
    pub fn dispatch(&mut self, action: JsValue) -> Result<JsValue, JsValue> {
        let action: ControlAction = from_js(action)?;
        self.dispatch_action(action)
    }

    /// Keyboard shortcut by `KeyboardEvent.key`; `null` when unmapped
    #[wasm_bindgen]
    pub fn key(&mut self, key: &str) -> Result<JsValue, JsValue> {
        match key_action(key) {
            Some(action) => self.dispatch_action(action),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = setViewport)]
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.gestures.set_viewport(Viewport { width, height });
    }

    #[wasm_bindgen(js_name = touchStart)]
    pub fn touch_start(&mut self, x: f64, y: f64) {
        let volume = self.player.engine().volume();
        let brightness = self.player.controls().brightness();
        self.gestures.touch_start(x, y, volume, brightness);
    }

    /// Live gesture feedback (volume, brightness); `null` when nothing applies yet
    #[wasm_bindgen(js_name = touchMove)]
    pub fn touch_move(&mut self, x: f64, y: f64) -> Result<JsValue, JsValue> {
        match self.gestures.touch_move(x, y) {
            Some(action) => self.dispatch_action(action),
            None => Ok(JsValue::NULL),
        }
    }

    #[wasm_bindgen(js_name = touchEnd)]
    pub fn touch_end(&mut self) -> Result<JsValue, JsValue> {
        match self.gestures.touch_end(now_ms()) {
            Some(action) => self.dispatch_action(action),
            None => Ok(JsValue::NULL),
        }
    }

    /// Seconds a horizontal swipe would seek by, for the overlay
    #[wasm_bindgen(js_name = seekPreview)]
    pub fn seek_preview(&self) -> f64 {
        self.gestures.seek_preview()
    }

    #[wasm_bindgen(js_name = setDailyCapReached)]
    pub fn set_daily_cap_reached(&mut self, reached: bool) {
        self.player.set_daily_cap_reached(now_ms(), reached);
    }

    /// After the page confirmed an upgrade or a redeemed code
    #[wasm_bindgen(js_name = confirmEntitlement)]
    pub fn confirm_entitlement(&mut self) -> Result<(), JsValue> {
        self.player.confirm_entitlement().map_err(js_error)
    }

    #[wasm_bindgen(js_name = setResumePosition)]
    pub fn set_resume_position(&mut self, position: Option<f64>) {
        self.player.set_resume_position(position);
    }

    #[wasm_bindgen(getter, js_name = isLocked)]
    pub fn is_locked(&self) -> bool {
        self.player.is_locked()
    }

    #[wasm_bindgen]
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_js(&self.player.snapshot())
    }

    /// Events since the last call, oldest first
    #[wasm_bindgen(js_name = drainEvents)]
    pub fn drain_events(&mut self) -> Result<JsValue, JsValue> {
        to_js(&self.player.drain_events())
    }

    /// Media commands for the page to apply, oldest first
    #[wasm_bindgen(js_name = takeCommands)]
    pub fn take_commands(&self) -> Result<JsValue, JsValue> {
        to_js(&self.surface.take())
    }
}

impl PlaygatePlayer {
    fn dispatch_action(&mut self, action: ControlAction) -> Result<JsValue, JsValue> {
        let outcome: ControlOutcome = self.player.dispatch(now_ms(), action).map_err(js_error)?;
        to_js(&outcome)
    }
}
