//! Microphone capture using cpal
//!
//! Captures the default input device at its native rate, mixed down to mono
//! 16-bit PCM. Chunks are streamed over an mpsc channel until the handle is
//! stopped or dropped.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Chunks buffered before the capture callback starts dropping audio
const CHANNEL_CAPACITY: usize = 600;

/// Mono PCM samples from the microphone
#[derive(Debug, Clone)]
pub(super) struct AudioChunk {
    pub(super) samples: Vec<i16>,
    pub(super) sample_rate: u32,
}

/// Stops the capture thread when stopped or dropped
pub(super) struct AudioCaptureHandle {
    is_capturing: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioCaptureHandle {
    pub(super) fn stop(&mut self) {
        self.is_capturing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            info!("Audio capture stopped");
        }
    }
}

impl Drop for AudioCaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, thiserror::Error)]
pub(super) enum AudioCaptureError {
    #[error("No audio input device found")]
    NoInputDevice,

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio capture thread exited before starting")]
    ThreadExited,

    #[error("Audio stream error: {0}")]
    Stream(#[from] cpal::BuildStreamError),

    #[error("Audio play error: {0}")]
    Play(#[from] cpal::PlayStreamError),

    #[error("Default config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
}

/// Start capturing on a dedicated thread
///
/// Blocks until the input stream is playing, so device errors surface here
/// rather than in the capture thread's log.
pub(super) fn start_capture(
) -> Result<(AudioCaptureHandle, mpsc::Receiver<AudioChunk>), AudioCaptureError> {
    let is_capturing = Arc::new(AtomicBool::new(true));
    let is_capturing_thread = is_capturing.clone();
    let (chunk_tx, chunk_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (ready_tx, ready_rx) = std_mpsc::channel();

    let thread_handle = thread::spawn(move || {
        run_capture(is_capturing_thread, chunk_tx, ready_tx);
    });

    let mut handle = AudioCaptureHandle {
        is_capturing,
        thread_handle: Some(thread_handle),
    };

    match ready_rx.recv() {
        Ok(Ok(())) => Ok((handle, chunk_rx)),
        Ok(Err(e)) => {
            handle.stop();
            Err(e)
        }
        Err(_) => {
            handle.stop();
            Err(AudioCaptureError::ThreadExited)
        }
    }
}

fn run_capture(
    is_capturing: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
    ready_tx: std_mpsc::Sender<Result<(), AudioCaptureError>>,
) {
    let stream = match open_stream(is_capturing.clone(), chunk_tx) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    while is_capturing.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
}

fn open_stream(
    is_capturing: Arc<AtomicBool>,
    chunk_tx: mpsc::Sender<AudioChunk>,
) -> Result<cpal::Stream, AudioCaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(AudioCaptureError::NoInputDevice)?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio input device: {}", device_name);

    let supported = device.default_input_config()?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;
    let channels = usize::from(config.channels);
    info!("Audio config: {} channels, {} Hz", channels, sample_rate);

    let err_callback = |err| {
        error!("Audio stream error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| {
                if is_capturing.load(Ordering::SeqCst) {
                    send_mono(data, channels, sample_rate, &chunk_tx);
                }
            },
            err_callback,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| {
                if is_capturing.load(Ordering::SeqCst) {
                    let samples: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                        .collect();
                    send_mono(&samples, channels, sample_rate, &chunk_tx);
                }
            },
            err_callback,
            None,
        )?,
        other => {
            return Err(AudioCaptureError::UnsupportedFormat(format!("{:?}", other)));
        }
    };

    stream.play()?;
    info!("Audio capture started");
    Ok(stream)
}

fn send_mono(data: &[i16], channels: usize, sample_rate: u32, sender: &mpsc::Sender<AudioChunk>) {
    let samples = mix_to_mono(data, channels);
    if samples.is_empty() {
        return;
    }
    if sender
        .try_send(AudioChunk {
            samples,
            sample_rate,
        })
        .is_err()
    {
        warn!("Audio channel full or closed, dropping chunk");
    }
}

/// Average interleaved frames into a single channel
fn mix_to_mono(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}
