//! `localStorage` backend for the profile store.
use ueah_profile::ProfileStorage;
use wasm_bindgen::JsValue;

use crate::dom;

/// Profile storage in the page origin's `localStorage`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

#[derive(Debug, thiserror::Error)]
pub enum WebStorageError {
    #[error("localStorage unavailable: {0}")]
    Unavailable(String),
    #[error("localStorage {op} failed: {message}")]
    Rejected { op: &'static str, message: String },
}

impl WebStorageError {
    fn rejected(op: &'static str, err: &JsValue) -> Self {
        Self::Rejected {
            op,
            message: dom::js_error_message(err),
        }
    }
}

fn handle() -> Result<web_sys::Storage, WebStorageError> {
    dom::local_storage().map_err(|err| WebStorageError::Unavailable(dom::js_error_message(&err)))
}

impl ProfileStorage for LocalStorage {
    type Error = WebStorageError;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        handle()?
            .get_item(key)
            .map_err(|err| WebStorageError::rejected("read", &err))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        handle()?
            .set_item(key, value)
            .map_err(|err| WebStorageError::rejected("write", &err))
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        handle()?
            .remove_item(key)
            .map_err(|err| WebStorageError::rejected("remove", &err))
    }
}
