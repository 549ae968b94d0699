//! Voice input
//!
//! [`VoiceInput`] toggles between idle and listening. Starting a capture asks
//! the platform [`SpeechRecognizer`] for one utterance; the transcript is
//! committed as the prompt. Progress is broadcast as [`VoiceEvent`]s for the
//! front end to display.
//!
//! The microphone recognizer is only compiled with the `microphone` feature;
//! without it, or without an API key, voice input reports itself unsupported.

#[cfg(feature = "microphone")]
mod audio;
#[cfg(feature = "microphone")]
mod transcriber;

use crate::config::VoiceConfig;
use crate::debounce::PromptCommitter;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Single-shot speech recognition capability
#[async_trait]
pub(crate) trait SpeechRecognizer: Send + Sync {
    /// Capture one utterance and return its transcript
    async fn recognize_once(&self) -> Result<String, SpeechError>;
}

/// Errors from a speech capture
#[derive(Debug, thiserror::Error)]
#[cfg_attr(not(feature = "microphone"), allow(dead_code))]
pub(crate) enum SpeechError {
    #[error("No speech was recognized")]
    NoSpeech,

    #[error("Audio capture failed: {0}")]
    Capture(String),

    #[error("Transcription request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Transcription service error ({status}): {message}")]
    Service { status: u16, message: String },
}

/// Voice input events for subscribers
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum VoiceEvent {
    /// A capture started
    Listening,
    /// A transcript was committed as the prompt
    Captured { transcript: String },
    /// The capture failed
    Error { message: String },
    /// The capture was stopped by the user
    Stopped,
}

/// Result of [`VoiceInput::toggle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VoiceToggle {
    Started,
    Stopped,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoiceState {
    Idle,
    Listening { capture_id: u64 },
}

/// Idle ⇄ listening adapter over an optional recognizer
pub(crate) struct VoiceInput {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    prompt: PromptCommitter,
    state: Arc<Mutex<VoiceState>>,
    capture: Option<JoinHandle<()>>,
    next_capture_id: u64,
    event_tx: broadcast::Sender<VoiceEvent>,
}

impl VoiceInput {
    pub(crate) fn new(
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        prompt: PromptCommitter,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            recognizer,
            prompt,
            state: Arc::new(Mutex::new(VoiceState::Idle)),
            capture: None,
            next_capture_id: 0,
            event_tx,
        }
    }

    /// Subscribe to voice events
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    pub(crate) fn is_listening(&self) -> bool {
        matches!(*lock_state(&self.state), VoiceState::Listening { .. })
    }

    /// Start a capture, or stop the active one
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn toggle(&mut self) -> VoiceToggle {
        let Some(recognizer) = self.recognizer.clone() else {
            warn!("Speech recognition is not available");
            return VoiceToggle::Unsupported;
        };

        if self.is_listening() {
            self.stop();
            return VoiceToggle::Stopped;
        }

        self.next_capture_id += 1;
        let capture_id = self.next_capture_id;
        *lock_state(&self.state) = VoiceState::Listening { capture_id };
        let _ = self.event_tx.send(VoiceEvent::Listening);
        info!(capture_id, "Listening for voice input");

        let state = self.state.clone();
        let prompt = self.prompt.clone();
        let event_tx = self.event_tx.clone();
        self.capture = Some(tokio::spawn(async move {
            let result = recognizer.recognize_once().await;

            {
                let mut state = lock_state(&state);
                if *state != (VoiceState::Listening { capture_id }) {
                    return;
                }
                *state = VoiceState::Idle;
            }

            match result {
                Ok(transcript) => {
                    info!(capture_id, len = transcript.len(), "Voice input captured");
                    // Supersedes any typed edit still inside its window
                    prompt.commit(transcript.clone());
                    let _ = event_tx.send(VoiceEvent::Captured { transcript });
                }
                Err(e) => {
                    warn!(capture_id, error = %e, "Voice capture failed");
                    let _ = event_tx.send(VoiceEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
        }));

        VoiceToggle::Started
    }

    fn stop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.abort();
        }
        *lock_state(&self.state) = VoiceState::Idle;
        let _ = self.event_tx.send(VoiceEvent::Stopped);
        info!("Voice capture stopped");
    }
}

impl Drop for VoiceInput {
    fn drop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.abort();
        }
    }
}

fn lock_state(state: &Mutex<VoiceState>) -> MutexGuard<'_, VoiceState> {
    match state.lock() {
        Ok(state) => state,
        Err(poisoned) => {
            warn!("Voice state mutex was poisoned, recovering data");
            poisoned.into_inner()
        }
    }
}

/// The platform recognizer, if this build and configuration provide one
#[cfg(feature = "microphone")]
pub(crate) fn platform_recognizer(config: &VoiceConfig) -> Option<Arc<dyn SpeechRecognizer>> {
    if !config.enabled {
        info!("Voice input disabled in configuration");
        return None;
    }
    let Some(api_key) = config.api_key.clone() else {
        info!(
            "No {} set, voice input unavailable",
            crate::config::ENV_OPENAI_API_KEY
        );
        return None;
    };
    match transcriber::MicrophoneTranscriber::new(config, api_key) {
        Ok(transcriber) => Some(Arc::new(transcriber)),
        Err(e) => {
            warn!("Failed to create speech transcriber: {}", e);
            None
        }
    }
}

/// The platform recognizer, if this build and configuration provide one
#[cfg(not(feature = "microphone"))]
pub(crate) fn platform_recognizer(config: &VoiceConfig) -> Option<Arc<dyn SpeechRecognizer>> {
    if config.enabled {
        info!(
            has_api_key = config.api_key.is_some(),
            "Built without the `microphone` feature, voice input unavailable"
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::DebouncedInput;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeRecognizer {
        calls: AtomicUsize,
        delay: Duration,
        transcript: Option<&'static str>,
    }

    impl FakeRecognizer {
        fn new(delay: Duration, transcript: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                transcript,
            })
        }
    }

    #[async_trait]
    impl SpeechRecognizer for FakeRecognizer {
        async fn recognize_once(&self) -> Result<String, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.transcript
                .map(str::to_string)
                .ok_or(SpeechError::NoSpeech)
        }
    }

    fn voice_with(recognizer: Option<Arc<FakeRecognizer>>) -> (VoiceInput, DebouncedInput) {
        let input = DebouncedInput::default();
        let recognizer = recognizer.map(|r| r as Arc<dyn SpeechRecognizer>);
        (VoiceInput::new(recognizer, input.committer()), input)
    }

    #[tokio::test]
    async fn test_unsupported_without_recognizer() {
        let (mut voice, input) = voice_with(None);
        let mut events = voice.subscribe();

        assert!(!voice.is_supported());
        assert_eq!(voice.toggle(), VoiceToggle::Unsupported);
        assert!(!voice.is_listening());
        assert!(events.try_recv().is_err());
        assert_eq!(input.value(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcript_becomes_prompt() {
        let recognizer = FakeRecognizer::new(Duration::from_millis(200), Some("ideas for #gym"));
        let (mut voice, input) = voice_with(Some(recognizer.clone()));
        let mut events = voice.subscribe();

        assert_eq!(voice.toggle(), VoiceToggle::Started);
        assert!(voice.is_listening());
        assert_eq!(events.recv().await.unwrap(), VoiceEvent::Listening);
        assert_eq!(
            events.recv().await.unwrap(),
            VoiceEvent::Captured {
                transcript: "ideas for #gym".to_string()
            }
        );

        assert_eq!(input.value(), "ideas for #gym");
        assert!(!voice.is_listening());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcript_wins_over_pending_typed_edit() {
        let recognizer = FakeRecognizer::new(Duration::from_millis(100), Some("spoken prompt"));
        let (mut voice, mut input) = voice_with(Some(recognizer));

        input.on_change("typed draft");
        assert_eq!(voice.toggle(), VoiceToggle::Started);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(input.value(), "spoken prompt");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(input.value(), "spoken prompt");
        assert!(!input.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recognizer_error_returns_to_idle() {
        let recognizer = FakeRecognizer::new(Duration::from_millis(50), None);
        let (mut voice, input) = voice_with(Some(recognizer));
        let mut events = voice.subscribe();

        voice.toggle();
        assert_eq!(events.recv().await.unwrap(), VoiceEvent::Listening);
        assert!(matches!(
            events.recv().await.unwrap(),
            VoiceEvent::Error { .. }
        ));
        assert!(!voice.is_listening());
        assert_eq!(input.value(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_while_listening_stops_capture() {
        let recognizer = FakeRecognizer::new(Duration::from_secs(10), Some("too late"));
        let (mut voice, input) = voice_with(Some(recognizer.clone()));
        let mut events = voice.subscribe();

        assert_eq!(voice.toggle(), VoiceToggle::Started);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(voice.toggle(), VoiceToggle::Stopped);
        assert!(!voice.is_listening());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(input.value(), "");
        assert_eq!(events.recv().await.unwrap(), VoiceEvent::Listening);
        assert_eq!(events.recv().await.unwrap(), VoiceEvent::Stopped);
        assert!(events.try_recv().is_err());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop_uses_new_capture() {
        let recognizer = FakeRecognizer::new(Duration::from_millis(300), Some("second try"));
        let (mut voice, input) = voice_with(Some(recognizer.clone()));

        voice.toggle();
        tokio::time::sleep(Duration::from_millis(10)).await;
        voice.toggle();
        assert_eq!(voice.toggle(), VoiceToggle::Started);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(input.value(), "second try");
        assert!(!voice.is_listening());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_platform_recognizer_requires_configuration() {
        let mut config = crate::config::Config::for_tests().voice;
        config.enabled = false;
        config.api_key = Some("sk-test".to_string());
        assert!(platform_recognizer(&config).is_none());

        config.enabled = true;
        config.api_key = None;
        assert!(platform_recognizer(&config).is_none());
    }
}
