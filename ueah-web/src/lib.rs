//! Browser bindings for the UEAH profile store.
#![forbid(unsafe_code)]
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
pub mod api;
pub mod dom;
pub mod scoring;
pub mod storage;

#[cfg(target_arch = "wasm32")]
pub use api::WebProfileStore;
pub use scoring::JsScoringStrategy;
pub use storage::{LocalStorage, WebStorageError};

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
