//! Local generator used when no endpoint is configured

use super::GenerationService;
use crate::error::ServiceError;
use crate::model::{derive_tags, OutputBundle};
use async_trait::async_trait;

/// Maximum number of hashtags built from prompt words
const MAX_WORD_TAGS: usize = 5;

/// Builds a deterministic bundle from the prompt text alone
pub(crate) struct OfflineGenerator;

impl OfflineGenerator {
    fn bundle_for(prompt: &str) -> OutputBundle {
        let topic = prompt
            .split_whitespace()
            .filter(|word| !word.starts_with('#'))
            .collect::<Vec<_>>()
            .join(" ");
        let topic = if topic.is_empty() {
            prompt.trim().to_string()
        } else {
            topic
        };

        let script = format!(
            "Generated short for: \"{}\" 🚀\n\nHook: Stop scrolling, this changes how you think about {}.\nBody: Three quick moves, ten seconds each.\nOutro: Follow for part two.",
            prompt.trim(),
            topic
        );
        let caption = format!("{} in under 30 seconds ⚡", topic);

        let mut tags = derive_tags(prompt);
        if tags.is_empty() {
            tags = topic
                .split_whitespace()
                .map(|word| {
                    word.chars()
                        .filter(|c| c.is_ascii_alphanumeric())
                        .collect::<String>()
                        .to_lowercase()
                })
                .filter(|word| word.len() > 2)
                .take(MAX_WORD_TAGS)
                .map(|word| format!("#{}", word))
                .collect();
        }
        tags.push("#shorts".to_string());

        OutputBundle::new(script, caption, tags.join(" "), topic.to_uppercase())
    }
}

#[async_trait]
impl GenerationService for OfflineGenerator {
    async fn generate(&self, prompt: &str) -> Result<OutputBundle, ServiceError> {
        Ok(Self::bundle_for(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_uses_prompt_tags() {
        let bundle = OfflineGenerator::bundle_for("study tips #focus #exam");
        assert!(bundle.script.starts_with("Generated short for: \"study tips #focus #exam\""));
        assert_eq!(bundle.hashtags, "#focus #exam #shorts");
        assert_eq!(bundle.thumbnail_text, "STUDY TIPS");
        assert_eq!(bundle.caption, "study tips in under 30 seconds ⚡");
    }

    #[test]
    fn test_bundle_builds_tags_from_words() {
        let bundle = OfflineGenerator::bundle_for("How to study 2x faster");
        assert_eq!(bundle.hashtags, "#how #study #faster #shorts");
    }

    #[tokio::test]
    async fn test_generation_is_deterministic() {
        let first = OfflineGenerator.generate("morning routine").await.unwrap();
        let second = OfflineGenerator.generate("morning routine").await.unwrap();
        assert_eq!(first, second);
    }
}
