//! System clipboard access
//!
//! Copy failures are logged and reported to the caller, never fatal.

use arboard::Clipboard;
use tracing::{error, info};

/// Copy text to the clipboard, returning whether it succeeded
pub(crate) fn copy_to_clipboard(text: &str) -> bool {
    if text.trim().is_empty() {
        info!("Nothing to copy (empty)");
        return false;
    }

    match Clipboard::new() {
        Ok(mut clipboard) => match clipboard.set_text(text) {
            Ok(()) => {
                info!("Copied to clipboard ({} chars)", text.len());
                true
            }
            Err(e) => {
                error!("Failed to copy to clipboard: {}", e);
                false
            }
        },
        Err(e) => {
            error!("Failed to initialize clipboard: {}", e);
            false
        }
    }
}
