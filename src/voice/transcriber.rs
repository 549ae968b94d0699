//! Microphone recognizer backed by a Whisper-style transcription endpoint
//!
//! Records one utterance (bounded by the configured capture window), wraps it
//! in a WAV container and uploads it as multipart form data.

use super::audio::{self, AudioChunk};
use super::{SpeechError, SpeechRecognizer};
use crate::config::VoiceConfig;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{info, instrument};
use zeroize::Zeroize;

const BITS_PER_SAMPLE: u16 = 16;
const CHANNELS: u16 = 1;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub(super) struct MicrophoneTranscriber {
    api_url: String,
    api_key: String,
    model: String,
    language: String,
    capture_window: Duration,
    client: reqwest::Client,
}

impl MicrophoneTranscriber {
    pub(super) fn new(config: &VoiceConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client for MicrophoneTranscriber")?;

        Ok(Self {
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
            capture_window: Duration::from_secs(config.capture_secs),
            client,
        })
    }

    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, SpeechError> {
        let part = Part::bytes(wav)
            .file_name("speech.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .part("file", part);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(SpeechError::Service { status, message });
        }

        let body: TranscriptionResponse = response.json().await?;
        Ok(body.text.trim().to_string())
    }
}

impl Drop for MicrophoneTranscriber {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

#[async_trait]
impl SpeechRecognizer for MicrophoneTranscriber {
    #[instrument(skip(self), fields(window_secs = self.capture_window.as_secs()))]
    async fn recognize_once(&self) -> Result<String, SpeechError> {
        let (handle, chunks) = tokio::task::spawn_blocking(audio::start_capture)
            .await
            .map_err(|e| SpeechError::Capture(e.to_string()))?
            .map_err(|e| SpeechError::Capture(e.to_string()))?;

        let (samples, sample_rate) =
            collect_until(chunks, Instant::now() + self.capture_window).await;
        drop(handle);

        if samples.is_empty() {
            return Err(SpeechError::NoSpeech);
        }
        info!(samples = samples.len(), sample_rate, "Captured utterance");

        let transcript = self.transcribe(encode_wav(&samples, sample_rate)).await?;
        if transcript.is_empty() {
            return Err(SpeechError::NoSpeech);
        }
        Ok(transcript)
    }
}

/// Gather chunks until the deadline passes or the capture ends
async fn collect_until(
    mut chunks: mpsc::Receiver<AudioChunk>,
    deadline: Instant,
) -> (Vec<i16>, u32) {
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    while let Ok(Some(chunk)) = timeout_at(deadline, chunks.recv()).await {
        sample_rate = chunk.sample_rate;
        samples.extend_from_slice(&chunk.samples);
    }
    (samples, sample_rate)
}

/// Mono 16-bit PCM wrapped in a 44-byte RIFF/WAVE header
fn encode_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_size = (samples.len() * 2) as u32;

    let mut wav = Vec::with_capacity(44 + samples.len() * 2);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&CHANNELS.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    for sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }
    wav
}
