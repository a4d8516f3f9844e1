//! Scoring strategy backed by a JavaScript object.
//!
//! The page may install `window.UEAH_SCORING` before or after the store is
//! created, so the global is looked up on every call.
use js_sys::{Array, Function, Object, Reflect};
use serde_json::Value;
use ueah_profile::constants::SCORING_GLOBAL;
use ueah_profile::{
    LevelInfo, OverallVerdict, ScoringError, ScoringStrategy, SkillScores, level_from_value,
    verdict_from_value,
};
use wasm_bindgen::{JsCast, JsValue};

use crate::dom;

#[derive(Debug, Clone)]
enum Target {
    Global,
    Object(Object),
}

#[derive(Debug, Clone)]
pub struct JsScoringStrategy {
    target: Target,
}

impl JsScoringStrategy {
    /// Resolve `window.UEAH_SCORING` lazily.
    #[must_use]
    pub const fn global() -> Self {
        Self {
            target: Target::Global,
        }
    }

    /// Use a specific object implementing `computeOverall`/`deriveLevel`.
    #[must_use]
    pub const fn from_object(object: Object) -> Self {
        Self {
            target: Target::Object(object),
        }
    }

    fn resolve(&self) -> Option<Object> {
        match &self.target {
            Target::Object(object) => Some(object.clone()),
            Target::Global => {
                let win = dom::window()?;
                Reflect::get(&win, &JsValue::from_str(SCORING_GLOBAL))
                    .ok()?
                    .dyn_into::<Object>()
                    .ok()
            }
        }
    }

    fn method(object: &Object, name: &str) -> Option<Function> {
        Reflect::get(object, &JsValue::from_str(name))
            .ok()?
            .dyn_into::<Function>()
            .ok()
    }

    fn call(
        object: &Object,
        function: &Function,
        args: &[JsValue],
    ) -> Result<Value, ScoringError> {
        let list = args.iter().collect::<Array>();
        let result = function
            .apply(object, &list)
            .map_err(|err| ScoringError::Failed(dom::js_error_message(&err)))?;
        Ok(dom::from_js(result))
    }
}

fn js_arg<T: serde::Serialize + ?Sized>(value: &T) -> Result<JsValue, ScoringError> {
    dom::to_js(value).map_err(|err| ScoringError::Malformed(dom::js_error_message(&err)))
}

impl ScoringStrategy for JsScoringStrategy {
    fn compute_overall(
        &self,
        age_group: &str,
        scores: &SkillScores,
    ) -> Result<OverallVerdict, ScoringError> {
        let Some(object) = self.resolve() else {
            return Ok(OverallVerdict::Incomplete);
        };
        let Some(function) = Self::method(&object, "computeOverall") else {
            return Ok(OverallVerdict::Incomplete);
        };
        let args = [JsValue::from_str(age_group), js_arg(scores)?];
        verdict_from_value(&Self::call(&object, &function, &args)?)
    }

    fn derive_level(
        &self,
        age_group: &str,
        slug: &str,
        score: u8,
        extra: &Value,
    ) -> Result<Option<LevelInfo>, ScoringError> {
        let Some(object) = self.resolve() else {
            return Ok(None);
        };
        let Some(function) = Self::method(&object, "deriveLevel") else {
            return Ok(None);
        };
        let args = [
            JsValue::from_str(age_group),
            JsValue::from_str(slug),
            JsValue::from(score),
            js_arg(extra)?,
        ];
        Ok(level_from_value(&Self::call(&object, &function, &args)?))
    }
}
