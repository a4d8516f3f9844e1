//! The `ProfileStore` class the quiz runners call into.
use ueah_profile::{ImportOptions, ImportOutcome, ProfileInfo, ProfileStore, SaveOptions};
use wasm_bindgen::prelude::*;

use crate::dom::{self, from_js, to_js};
use crate::scoring::JsScoringStrategy;
use crate::storage::LocalStorage;

/// Options objects are optional on the JS side; missing or malformed ones
/// fall back to defaults.
fn options<T: serde::de::DeserializeOwned + Default>(value: JsValue) -> T {
    if value.is_undefined() || value.is_null() {
        return T::default();
    }
    serde_wasm_bindgen::from_value(value).unwrap_or_default()
}

#[wasm_bindgen(js_name = ProfileStore)]
pub struct WebProfileStore {
    inner: ProfileStore<LocalStorage>,
}

#[wasm_bindgen(js_class = ProfileStore)]
impl WebProfileStore {
    /// Open the store, migrating whatever `localStorage` holds.
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new() -> Self {
        let mut inner = ProfileStore::new(LocalStorage)
            .with_scoring(JsScoringStrategy::global());
        inner.subscribe(|event| {
            if let Err(err) = dom::dispatch_profile_changed(event) {
                log::warn!(
                    "profile change notification failed: {}",
                    dom::js_error_message(&err)
                );
            }
        });
        inner.bootstrap();
        Self { inner }
    }

    #[wasm_bindgen(js_name = getProfile)]
    pub fn get_profile(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.get_profile())
    }

    pub fn get(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.get())
    }

    pub fn save(&self, profile: JsValue, opts: JsValue) -> Result<JsValue, JsValue> {
        let opts: SaveOptions = options(opts);
        to_js(&self.inner.save(&from_js(profile), opts))
    }

    pub fn set(&self, data: JsValue) -> Result<JsValue, JsValue> {
        to_js(&self.inner.set(&from_js(data)))
    }

    pub fn update(&self, patch: JsValue) -> Result<JsValue, JsValue> {
        to_js(&self.inner.update(&from_js(patch)))
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    #[wasm_bindgen(js_name = setProfileInfo)]
    pub fn set_profile_info(&self, info: JsValue) -> Result<JsValue, JsValue> {
        let info: ProfileInfo = options(info);
        to_js(&self.inner.set_profile_info(info))
    }

    #[wasm_bindgen(js_name = addIelsScore)]
    pub fn add_iels_score(&self, entry: JsValue) -> Result<JsValue, JsValue> {
        to_js(&self.inner.add_iels_score(&from_js(entry)))
    }

    #[wasm_bindgen(js_name = getIelsHistory)]
    pub fn get_iels_history(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.get_iels_history())
    }

    #[wasm_bindgen(js_name = addAgeSkillScore)]
    pub fn add_age_skill_score(
        &self,
        age_group: &str,
        skill: &str,
        entry: JsValue,
    ) -> Result<JsValue, JsValue> {
        to_js(&self.inner.add_age_skill_score(age_group, skill, &from_js(entry)))
    }

    #[wasm_bindgen(js_name = clearAgeResults)]
    pub fn clear_age_results(&self, age_group: Option<String>) -> Result<JsValue, JsValue> {
        to_js(&self.inner.clear_age_results(age_group.as_deref()))
    }

    #[wasm_bindgen(js_name = exportData)]
    pub fn export_data(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.export_data())
    }

    /// Accepts an export object, a bare profile object, or either as a JSON
    /// string. Resolves to `{ok, mode?, updatedAt?, reason?}`.
    #[wasm_bindgen(js_name = importData)]
    pub fn import_data(&self, payload: JsValue, opts: JsValue) -> Result<JsValue, JsValue> {
        let opts: ImportOptions = options(opts);
        let result = match payload.as_string() {
            Some(text) => self.inner.import_json(&text, opts),
            None => self.inner.import_data(&from_js(payload), opts),
        };
        to_js(&ImportOutcome::from(result))
    }
}

impl Default for WebProfileStore {
    fn default() -> Self {
        Self::new()
    }
}
