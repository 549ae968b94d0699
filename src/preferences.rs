//! User preferences
//!
//! Only the theme is persisted. It is stored as the text `true` / `false`
//! in device storage so older data written by the browser client still loads.

use crate::storage::{KeyValueStore, StorageError};
use tracing::{info, warn};

/// Storage key for the theme preference
pub(crate) const DARK_MODE_KEY: &str = "darkMode";

/// Default dark mode setting (dark)
const DEFAULT_IS_DARK_MODE: bool = true;

/// Get the dark mode setting
/// Returns true (dark mode) if not set or unreadable
pub(crate) fn load_dark_mode(storage: &dyn KeyValueStore) -> bool {
    match storage.get(DARK_MODE_KEY) {
        Ok(Some(value)) => match value.trim() {
            "true" => true,
            "false" => false,
            other => {
                warn!("Ignoring unrecognised dark mode value: {:?}", other);
                DEFAULT_IS_DARK_MODE
            }
        },
        Ok(None) => DEFAULT_IS_DARK_MODE,
        Err(e) => {
            warn!("Failed to read dark mode preference: {}", e);
            DEFAULT_IS_DARK_MODE
        }
    }
}

/// Set the dark mode setting
pub(crate) fn save_dark_mode(
    storage: &dyn KeyValueStore,
    is_dark: bool,
) -> Result<(), StorageError> {
    storage.set(DARK_MODE_KEY, if is_dark { "true" } else { "false" })?;
    info!("Saved dark mode preference: {}", is_dark);
    Ok(())
}
