//! One-shot utterance capture for the listen endpoint.
//!
//! [`UtteranceSource`] is the hardware seam: one call records until the
//! speaker stops talking and returns the utterance as WAV bytes.
//! [`MicSource`] is the cpal implementation; [`Endpointer`] is the
//! hardware-independent state machine that decides where the utterance
//! starts and ends, so it can be tested without a microphone.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::audio::pcm::{resample, rms, to_mono};
use crate::audio::wav::encode_pcm16_mono;
use crate::config::ListenConfig;

const TARGET_RATE: u32 = 16_000;
/// 30 ms frames at 16 kHz.
const FRAME_SIZE: usize = 480;
const FRAME_MS: u64 = 30;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("no speech detected before the start timeout")]
    NoSpeech,

    #[error("audio stream ended unexpectedly")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// UtteranceSource
// ---------------------------------------------------------------------------

/// Captures exactly one utterance and returns it as encoded WAV bytes.
///
/// Blocking by nature (waits on hardware); callers run it under
/// `spawn_blocking`.
pub trait UtteranceSource: Send + Sync {
    fn capture_utterance(&self) -> Result<Vec<u8>, CaptureError>;
}

// ---------------------------------------------------------------------------
// Endpointer
// ---------------------------------------------------------------------------

/// What the endpointer decided after consuming one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointerEvent {
    /// Keep feeding frames.
    Pending,
    /// The utterance is complete (silence window elapsed or length cap hit).
    Finished,
    /// Speech never started within the start timeout.
    StartTimeout,
}

/// Energy-based utterance boundary detector.
///
/// Consumes fixed-size 16 kHz mono frames. Speech starts at the first frame
/// whose RMS exceeds the threshold; the utterance ends after a continuous
/// run of silent frames or when the length cap is reached.
pub struct Endpointer {
    rms_threshold: f32,
    frame_size: usize,
    silence_frames_to_end: usize,
    max_speech_frames: usize,
    start_timeout_frames: usize,
    in_speech: bool,
    silent_run: usize,
    frames_seen: usize,
    speech_frames: usize,
}

impl Endpointer {
    pub fn new(
        rms_threshold: f32,
        frame_size: usize,
        silence_frames_to_end: usize,
        max_speech_frames: usize,
        start_timeout_frames: usize,
    ) -> Self {
        Self {
            rms_threshold,
            frame_size,
            silence_frames_to_end: silence_frames_to_end.max(1),
            max_speech_frames: max_speech_frames.max(1),
            start_timeout_frames: start_timeout_frames.max(1),
            in_speech: false,
            silent_run: 0,
            frames_seen: 0,
            speech_frames: 0,
        }
    }

    /// Endpointer tuned from the listen config, using 30 ms frames.
    pub fn from_config(cfg: &ListenConfig) -> Self {
        let silence_frames = (cfg.silence_ms / FRAME_MS).max(1) as usize;
        let max_frames = (cfg.max_utterance_secs * 1000.0 / FRAME_MS as f32).ceil() as usize;
        let start_frames = (cfg.start_timeout_secs * 1000.0 / FRAME_MS as f32).ceil() as usize;
        Self::new(
            cfg.rms_threshold,
            FRAME_SIZE,
            silence_frames,
            max_frames,
            start_frames,
        )
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// True once speech has been detected.
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    /// Consume one frame and report the boundary decision.
    pub fn push_frame(&mut self, frame: &[f32]) -> EndpointerEvent {
        self.frames_seen += 1;
        let voiced = rms(frame) > self.rms_threshold;

        if !self.in_speech {
            if voiced {
                self.in_speech = true;
                self.speech_frames = 1;
                return EndpointerEvent::Pending;
            }
            if self.frames_seen >= self.start_timeout_frames {
                return EndpointerEvent::StartTimeout;
            }
            return EndpointerEvent::Pending;
        }

        self.speech_frames += 1;
        if voiced {
            self.silent_run = 0;
        } else {
            self.silent_run += 1;
            if self.silent_run >= self.silence_frames_to_end {
                return EndpointerEvent::Finished;
            }
        }

        if self.speech_frames >= self.max_speech_frames {
            return EndpointerEvent::Finished;
        }

        EndpointerEvent::Pending
    }
}

// ---------------------------------------------------------------------------
// MicSource
// ---------------------------------------------------------------------------

/// Default-microphone capture via cpal.
///
/// The device and stream are opened per capture and live on the calling
/// thread (cpal streams are not `Send`); the struct itself only carries the
/// endpointing knobs.
pub struct MicSource {
    listen: ListenConfig,
}

impl MicSource {
    /// Verify a default input device exists and remember the listen knobs.
    pub fn new(listen: ListenConfig) -> Result<Self, CaptureError> {
        cpal::default_host()
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;
        Ok(Self { listen })
    }
}

impl UtteranceSource for MicSource {
    fn capture_utterance(&self) -> Result<Vec<u8>, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Ignore send errors; the receiver may have been dropped.
                let _ = tx.send(data.to_vec());
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        let mut endpointer = Endpointer::from_config(&self.listen);
        let frame = endpointer.frame_size();
        let mut mono16k: Vec<f32> = Vec::new();
        let mut consumed = 0usize;
        let mut speech_start: Option<usize> = None;

        loop {
            let chunk = rx.recv().map_err(|_| CaptureError::Disconnected)?;
            let mono = to_mono(&chunk, channels);
            mono16k.extend(resample(&mono, sample_rate, TARGET_RATE));

            while (consumed + 1) * frame <= mono16k.len() {
                let start = consumed * frame;
                let event = endpointer.push_frame(&mono16k[start..start + frame]);

                if speech_start.is_none() && endpointer.in_speech() {
                    // Keep one frame of pre-roll so the first syllable
                    // is not clipped.
                    speech_start = Some(start.saturating_sub(frame));
                }

                match event {
                    EndpointerEvent::Pending => {}
                    EndpointerEvent::Finished => {
                        let from = speech_start.unwrap_or(0);
                        let to = ((consumed + 1) * frame).min(mono16k.len());
                        log::debug!(
                            "utterance captured: {} samples ({} ms)",
                            to - from,
                            (to - from) as u64 * 1000 / TARGET_RATE as u64
                        );
                        return Ok(encode_pcm16_mono(&mono16k[from..to], TARGET_RATE));
                    }
                    EndpointerEvent::StartTimeout => return Err(CaptureError::NoSpeech),
                }

                consumed += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SILENT: [f32; 4] = [0.0; 4];
    const VOICED: [f32; 4] = [0.5; 4];

    fn endpointer() -> Endpointer {
        // 4-sample frames, 2 silent frames end, 10 frame cap, 5 frame start timeout
        Endpointer::new(0.01, 4, 2, 10, 5)
    }

    #[test]
    fn silence_only_times_out() {
        let mut ep = endpointer();
        for _ in 0..4 {
            assert_eq!(ep.push_frame(&SILENT), EndpointerEvent::Pending);
        }
        assert_eq!(ep.push_frame(&SILENT), EndpointerEvent::StartTimeout);
        assert!(!ep.in_speech());
    }

    #[test]
    fn speech_then_silence_finishes() {
        let mut ep = endpointer();
        assert_eq!(ep.push_frame(&VOICED), EndpointerEvent::Pending);
        assert!(ep.in_speech());
        assert_eq!(ep.push_frame(&VOICED), EndpointerEvent::Pending);
        assert_eq!(ep.push_frame(&SILENT), EndpointerEvent::Pending);
        assert_eq!(ep.push_frame(&SILENT), EndpointerEvent::Finished);
    }

    #[test]
    fn short_pause_does_not_end_utterance() {
        let mut ep = endpointer();
        ep.push_frame(&VOICED);
        assert_eq!(ep.push_frame(&SILENT), EndpointerEvent::Pending);
        // Speech resumes before the silence window elapses.
        assert_eq!(ep.push_frame(&VOICED), EndpointerEvent::Pending);
        assert_eq!(ep.push_frame(&SILENT), EndpointerEvent::Pending);
        assert_eq!(ep.push_frame(&SILENT), EndpointerEvent::Finished);
    }

    #[test]
    fn length_cap_ends_continuous_speech() {
        let mut ep = endpointer();
        for _ in 0..9 {
            assert_eq!(ep.push_frame(&VOICED), EndpointerEvent::Pending);
        }
        assert_eq!(ep.push_frame(&VOICED), EndpointerEvent::Finished);
    }

    #[test]
    fn late_speech_beats_start_timeout() {
        let mut ep = endpointer();
        for _ in 0..4 {
            ep.push_frame(&SILENT);
        }
        // Speech on the last frame before the timeout would fire.
        assert_eq!(ep.push_frame(&VOICED), EndpointerEvent::Pending);
        assert!(ep.in_speech());
    }

    #[test]
    fn from_config_frame_math() {
        let cfg = ListenConfig {
            rms_threshold: 0.02,
            silence_ms: 900,
            max_utterance_secs: 3.0,
            start_timeout_secs: 1.5,
        };
        let ep = Endpointer::from_config(&cfg);
        assert_eq!(ep.frame_size(), 480);
        assert_eq!(ep.silence_frames_to_end, 30);
        assert_eq!(ep.max_speech_frames, 100);
        assert_eq!(ep.start_timeout_frames, 50);
    }
}
