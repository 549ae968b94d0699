//! Generated content types
//!
//! An [`OutputBundle`] is what the generation service returns for one prompt;
//! a [`GenerationRecord`] is the bundle plus the prompt and metadata kept in
//! history and favorites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text shown when there is nothing better to display (e.g. a broken share link)
const FALLBACK_SCRIPT: &str =
    "Here's your AI-generated short: 'Boost your productivity in 30 seconds with these 3 hacks...'";

/// Placeholder for an empty thumbnail preview
const FALLBACK_THUMBNAIL: &str = "Your thumbnail text will appear here...";

/// The generated content for one prompt
///
/// Bundles are never mutated after they are produced; a new generation
/// yields a new bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutputBundle {
    pub script: String,
    pub caption: String,
    pub hashtags: String,
    pub thumbnail_text: String,
}

impl OutputBundle {
    pub(crate) fn new(
        script: impl Into<String>,
        caption: impl Into<String>,
        hashtags: impl Into<String>,
        thumbnail_text: impl Into<String>,
    ) -> Self {
        Self {
            script: script.into(),
            caption: caption.into(),
            hashtags: hashtags.into(),
            thumbnail_text: thumbnail_text.into(),
        }
    }

    /// Bundle displayed when hydration from a share link fails
    pub(crate) fn fallback() -> Self {
        Self {
            script: FALLBACK_SCRIPT.to_string(),
            caption: String::new(),
            hashtags: String::new(),
            thumbnail_text: FALLBACK_THUMBNAIL.to_string(),
        }
    }

    /// True when every field is blank
    pub(crate) fn is_empty(&self) -> bool {
        [
            &self.script,
            &self.caption,
            &self.hashtags,
            &self.thumbnail_text,
        ]
        .iter()
        .all(|field| field.trim().is_empty())
    }
}

/// One successful generation, as kept in history and favorites
///
/// `timestamp` identifies the record inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct GenerationRecord {
    pub prompt: String,
    #[serde(flatten)]
    pub bundle: OutputBundle,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl GenerationRecord {
    pub(crate) fn new(prompt: &str, bundle: OutputBundle, timestamp: DateTime<Utc>) -> Self {
        Self {
            prompt: prompt.to_string(),
            bundle,
            tags: derive_tags(prompt),
            timestamp,
        }
    }

    /// Identity key used for favorite toggling
    pub(crate) fn key(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Extract `#tags` from a prompt
///
/// Keeps whitespace-separated tokens starting with `#`, with every character
/// outside `[A-Za-z0-9#]` removed.
pub(crate) fn derive_tags(prompt: &str) -> Vec<String> {
    prompt
        .split_whitespace()
        .filter(|word| word.starts_with('#'))
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '#')
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_derive_tags_keeps_hash_tokens_in_order() {
        assert_eq!(
            derive_tags("study tips #focus #exam"),
            vec!["#focus".to_string(), "#exam".to_string()]
        );
    }

    #[test]
    fn test_derive_tags_strips_punctuation() {
        assert_eq!(
            derive_tags("#déjà-vu, and #c++! #2024"),
            vec!["#djvu".to_string(), "#c".to_string(), "#2024".to_string()]
        );
    }

    #[test]
    fn test_derive_tags_ignores_inner_hashes() {
        assert!(derive_tags("issue no#5 today").is_empty());
        assert!(derive_tags("").is_empty());
    }

    #[test]
    fn test_record_serializes_flat_like_local_storage() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = GenerationRecord::new(
            "morning #routine",
            OutputBundle::new("s", "c", "#h", "T"),
            timestamp,
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["prompt"], "morning #routine");
        assert_eq!(json["thumbnailText"], "T");
        assert_eq!(json["tags"][0], "#routine");

        let back: GenerationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_fallback_bundle_is_not_empty() {
        assert!(!OutputBundle::fallback().is_empty());
        assert!(OutputBundle::default().is_empty());
    }
}
