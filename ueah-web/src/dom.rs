use serde::Serialize;
use serde_json::Value;
use serde_wasm_bindgen::Serializer;
use ueah_profile::ProfileChanged;
use ueah_profile::constants::PROFILE_CHANGED_EVENT;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CustomEvent, CustomEventInit, Storage, Window};

/// Retrieve the global `window` object, if running in a page.
#[must_use]
pub fn window() -> Option<Window> {
    web_sys::window()
}

/// Convert a JavaScript value into a readable string for error reporting.
#[must_use]
pub fn js_error_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| err.message().into())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

/// Access the browser `localStorage` handle.
///
/// # Errors
/// Returns an error if there is no window, `localStorage` access throws
/// (private browsing, sandboxed frames) or it is disabled.
pub fn local_storage() -> Result<Storage, JsValue> {
    window()
        .ok_or_else(|| JsValue::from_str("window unavailable"))?
        .local_storage()?
        .ok_or_else(|| JsValue::from_str("localStorage unavailable"))
}

/// Serialize into plain JS objects (maps become objects, `None` becomes `null`).
///
/// # Errors
/// Returns an error if the value cannot be represented in JavaScript.
pub fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(JsValue::from)
}

/// Read an arbitrary JS value as JSON; anything unrepresentable is `null`.
#[must_use]
pub fn from_js(value: JsValue) -> Value {
    if value.is_undefined() || value.is_null() {
        return Value::Null;
    }
    serde_wasm_bindgen::from_value(value).unwrap_or(Value::Null)
}

/// Fire the `ueah:profile-changed` event on `window` with `detail = { at }`.
///
/// # Errors
/// Returns an error if the event cannot be constructed or dispatched.
pub fn dispatch_profile_changed(event: &ProfileChanged) -> Result<(), JsValue> {
    let Some(win) = window() else {
        return Ok(());
    };
    let init = CustomEventInit::new();
    init.set_detail(&to_js(event)?);
    let custom = CustomEvent::new_with_event_init_dict(PROFILE_CHANGED_EVENT, &init)?;
    win.dispatch_event(&custom)?;
    Ok(())
}
