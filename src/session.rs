//! Session state
//!
//! [`Session::init`] loads history, favorites and the dark-mode preference
//! before anything becomes interactive, then owns every component the front
//! end talks to: prompt input, voice input, the orchestrator and favorites.

use crate::collection::{CollectionStore, Toggled, FAVORITES_KEY, HISTORY_KEY};
use crate::config::Config;
use crate::debounce::DebouncedInput;
use crate::error::AppError;
use crate::generation::GenerationService;
use crate::model::{GenerationRecord, OutputBundle};
use crate::orchestrator::{GenerationOrchestrator, SubmitOutcome};
use crate::preferences;
use crate::share::{self, DecodeError};
use crate::storage::KeyValueStore;
use crate::voice::{SpeechRecognizer, VoiceEvent, VoiceInput, VoiceToggle};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use url::Url;

/// Result of opening a link
#[derive(Debug)]
pub(crate) enum HydrateOutcome {
    /// The shared bundle is now current
    Hydrated,
    /// The token was malformed; the fallback bundle is shown instead
    Fallback(DecodeError),
    /// The link has no share token; nothing changed
    NotShareLink,
}

pub(crate) struct Session {
    storage: Arc<dyn KeyValueStore>,
    share_origin: Url,
    input: DebouncedInput,
    voice: VoiceInput,
    orchestrator: Arc<GenerationOrchestrator>,
    favorites: CollectionStore<GenerationRecord>,
    dark_mode: bool,
}

impl Session {
    /// Build a session from persisted state
    pub(crate) fn init(
        config: &Config,
        storage: Arc<dyn KeyValueStore>,
        service: Arc<dyn GenerationService>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
    ) -> Result<Self, AppError> {
        let share_origin = config.share_origin()?;
        let input = DebouncedInput::new(config.debounce_window());
        let voice = VoiceInput::new(recognizer, input.committer());

        let history = CollectionStore::load(
            storage.clone(),
            HISTORY_KEY,
            config.collections.history_capacity,
        );
        let favorites = CollectionStore::load(
            storage.clone(),
            FAVORITES_KEY,
            config.collections.favorites_capacity,
        );
        let dark_mode = preferences::load_dark_mode(storage.as_ref());
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            service,
            input.subscribe(),
            history,
        ));

        info!(
            favorites = favorites.len(),
            favorites_capacity = favorites.capacity(),
            dark_mode,
            voice = voice.is_supported(),
            "Session initialized"
        );

        Ok(Self {
            storage,
            share_origin,
            input,
            voice,
            orchestrator,
            favorites,
            dark_mode,
        })
    }

    /// Record a raw prompt edit
    pub(crate) fn edit_prompt(&mut self, raw: impl Into<String>) {
        self.input.on_change(raw);
    }

    /// The committed prompt
    pub(crate) fn prompt(&self) -> String {
        self.input.value()
    }

    /// True while an edit is waiting to be committed
    pub(crate) fn has_pending_edit(&self) -> bool {
        self.input.has_pending()
    }

    /// Submit the prompt, committing any pending edit first
    ///
    /// The returned future owns what it needs, so the caller may spawn it and
    /// keep handling input while the request runs.
    pub(crate) fn generate(&mut self) -> impl Future<Output = SubmitOutcome> + Send + 'static {
        self.input.flush();
        let orchestrator = self.orchestrator.clone();
        async move { orchestrator.regenerate().await }
    }

    /// Submit the committed prompt again
    pub(crate) fn regenerate(&self) -> impl Future<Output = SubmitOutcome> + Send + 'static {
        let orchestrator = self.orchestrator.clone();
        async move { orchestrator.regenerate().await }
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.orchestrator.is_loading()
    }

    pub(crate) fn current_bundle(&self) -> Option<OutputBundle> {
        self.orchestrator.current_bundle()
    }

    /// History, newest first
    pub(crate) fn history(&self) -> Vec<GenerationRecord> {
        self.orchestrator.history()
    }

    /// Favorites, newest first
    pub(crate) fn favorites(&self) -> &[GenerationRecord] {
        self.favorites.items()
    }

    pub(crate) fn is_favorite(&self, record: &GenerationRecord) -> bool {
        self.favorites.contains_by(record, GenerationRecord::key)
    }

    /// Add `record` to favorites, or remove it if already there
    pub(crate) fn toggle_favorite(&mut self, record: GenerationRecord) -> Toggled {
        let toggled = self.favorites.toggle(record, GenerationRecord::key);
        info!(?toggled, count = self.favorites.len(), "Favorites updated");
        toggled
    }

    /// Toggle the favorite state of history entry `index`
    pub(crate) fn toggle_favorite_from_history(&mut self, index: usize) -> Option<Toggled> {
        let record = self.orchestrator.history_entry(index)?;
        Some(self.toggle_favorite(record))
    }

    /// Toggle favorites entry `index`, which removes it
    pub(crate) fn toggle_favorite_entry(&mut self, index: usize) -> Option<Toggled> {
        let record = self.favorites.get(index)?.clone();
        Some(self.toggle_favorite(record))
    }

    pub(crate) fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    /// Flip and persist the dark-mode preference
    pub(crate) fn toggle_dark_mode(&mut self) -> bool {
        self.dark_mode = !self.dark_mode;
        if let Err(e) = preferences::save_dark_mode(self.storage.as_ref(), self.dark_mode) {
            error!("Failed to save dark mode preference: {}", e);
        }
        self.dark_mode
    }

    /// Shareable link for the current bundle
    pub(crate) fn share_link(&self) -> Option<Url> {
        let bundle = self.current_bundle()?;
        match share::share_url(&self.share_origin, &bundle) {
            Ok(url) => Some(url),
            Err(e) => {
                error!("Failed to build share link: {}", e);
                None
            }
        }
    }

    /// Show the bundle carried by a share link, without generating
    pub(crate) fn hydrate(&self, link: &str) -> HydrateOutcome {
        let Some(token) = share::token_from_url(link) else {
            return HydrateOutcome::NotShareLink;
        };

        match share::decode(&token) {
            Ok(bundle) => {
                info!("Hydrated output from share link");
                self.orchestrator.set_current_bundle(bundle);
                HydrateOutcome::Hydrated
            }
            Err(e) => {
                warn!(error = %e, "Invalid share link, showing fallback output");
                self.orchestrator.set_current_bundle(OutputBundle::fallback());
                HydrateOutcome::Fallback(e)
            }
        }
    }

    /// Start or stop voice capture
    pub(crate) fn toggle_voice(&mut self) -> VoiceToggle {
        self.voice.toggle()
    }

    pub(crate) fn voice_events(&self) -> broadcast::Receiver<VoiceEvent> {
        self.voice.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Echoes the prompt back as the script
    struct EchoService;

    #[async_trait]
    impl GenerationService for EchoService {
        async fn generate(&self, prompt: &str) -> Result<OutputBundle, ServiceError> {
            Ok(OutputBundle::new(
                format!("script for {}", prompt),
                "caption",
                "#tag",
                "THUMB",
            ))
        }
    }

    fn session_with(storage: Arc<dyn KeyValueStore>) -> Session {
        Session::init(&Config::for_tests(), storage, Arc::new(EchoService), None).unwrap()
    }

    async fn generate(session: &mut Session, prompt: &str) -> GenerationRecord {
        session.edit_prompt(prompt);
        match session.generate().await {
            SubmitOutcome::Succeeded(record) => record,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_init_defaults() {
        let session = session_with(Arc::new(MemoryStore::default()));
        assert!(session.history().is_empty());
        assert!(session.favorites().is_empty());
        assert!(session.dark_mode());
        assert!(session.current_bundle().is_none());
        assert!(session.share_link().is_none());
        assert_eq!(session.prompt(), "");
    }

    #[tokio::test]
    async fn test_generate_flushes_pending_prompt() {
        let mut session = session_with(Arc::new(MemoryStore::default()));
        let record = generate(&mut session, "study tips #focus").await;

        assert_eq!(record.prompt, "study tips #focus");
        assert_eq!(record.tags, vec!["#focus"]);
        assert_eq!(
            session.current_bundle().unwrap().script,
            "script for study tips #focus"
        );
        assert_eq!(session.history().len(), 1);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        {
            let mut session = session_with(storage.clone());
            let record = generate(&mut session, "first").await;
            session.toggle_favorite(record);
            session.toggle_dark_mode();
        }

        let session = session_with(storage);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.favorites().len(), 1);
        assert_eq!(session.favorites()[0].prompt, "first");
        assert!(!session.dark_mode());
    }

    #[tokio::test]
    async fn test_favorites_outlive_history_eviction() {
        let mut config = Config::for_tests();
        config.collections.history_capacity = 2;
        let mut session = Session::init(
            &config,
            Arc::new(MemoryStore::default()),
            Arc::new(EchoService),
            None,
        )
        .unwrap();

        let first = generate(&mut session, "one").await;
        assert_eq!(session.toggle_favorite_from_history(0), Some(Toggled::Added));
        generate(&mut session, "two").await;
        generate(&mut session, "three").await;

        let history: Vec<_> = session.history().into_iter().map(|r| r.prompt).collect();
        assert_eq!(history, vec!["three", "two"]);
        assert!(session.is_favorite(&first));
        assert_eq!(session.favorites().len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_favorite_twice_restores_membership() {
        let mut session = session_with(Arc::new(MemoryStore::default()));
        let record = generate(&mut session, "toggle me").await;

        assert_eq!(session.toggle_favorite(record.clone()), Toggled::Added);
        assert!(session.is_favorite(&record));
        assert_eq!(session.toggle_favorite(record.clone()), Toggled::Removed);
        assert!(!session.is_favorite(&record));

        session.toggle_favorite(record.clone());
        assert_eq!(session.toggle_favorite_entry(0), Some(Toggled::Removed));
        assert_eq!(session.toggle_favorite_entry(0), None);
        assert_eq!(session.toggle_favorite_from_history(5), None);
    }

    #[tokio::test]
    async fn test_share_link_round_trips_through_hydrate() {
        let mut sender = session_with(Arc::new(MemoryStore::default()));
        generate(&mut sender, "share this").await;
        let link = sender.share_link().unwrap();
        assert!(link
            .as_str()
            .starts_with("http://localhost:5173/share/"));

        let receiver = session_with(Arc::new(MemoryStore::default()));
        assert!(matches!(
            receiver.hydrate(link.as_str()),
            HydrateOutcome::Hydrated
        ));
        assert_eq!(receiver.current_bundle(), sender.current_bundle());
        assert!(receiver.history().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_token_shows_fallback() {
        let session = session_with(Arc::new(MemoryStore::default()));
        assert!(matches!(
            session.hydrate("http://localhost:5173/share/%%%not-base64"),
            HydrateOutcome::Fallback(_)
        ));
        assert_eq!(session.current_bundle(), Some(OutputBundle::fallback()));
    }

    #[tokio::test]
    async fn test_non_share_link_is_ignored() {
        let session = session_with(Arc::new(MemoryStore::default()));
        assert!(matches!(
            session.hydrate("http://localhost:5173/"),
            HydrateOutcome::NotShareLink
        ));
        assert!(session.current_bundle().is_none());
    }

    #[tokio::test]
    async fn test_generation_replaces_hydrated_bundle() {
        let mut session = session_with(Arc::new(MemoryStore::default()));
        let token = share::encode(&OutputBundle::new("shared", "c", "h", "t"));
        session.hydrate(&format!("/share/{}", token));
        assert_eq!(session.current_bundle().unwrap().script, "shared");

        generate(&mut session, "fresh").await;
        assert_eq!(session.current_bundle().unwrap().script, "script for fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_regenerate_uses_committed_prompt() {
        let mut session = session_with(Arc::new(MemoryStore::default()));
        session.edit_prompt("typed slowly");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.prompt(), "typed slowly");

        match session.regenerate().await {
            SubmitOutcome::Succeeded(record) => assert_eq!(record.prompt, "typed slowly"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_voice_unsupported_without_recognizer() {
        let mut session = session_with(Arc::new(MemoryStore::default()));
        assert_eq!(session.toggle_voice(), VoiceToggle::Unsupported);
    }
}
