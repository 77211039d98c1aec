//! Live microphone capture via cpal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::error::RecognitionFailure;
use crate::listen::UtteranceSource;
use crate::segment::{ListenSettings, SpeechSegmenter};
use crate::stt::{samples_to_wav, Transcriber};

const CHUNK_WAIT: Duration = Duration::from_millis(50);

/// Default input device, mono, at the requested sample rate.
pub struct AudioCapture {
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    pub fn new(sample_rate: u32) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("no input device available"))?;
        let supported = device
            .supported_input_configs()
            .context("failed to list input configs")?
            .find(|config| {
                config.channels() == 1
                    && config.min_sample_rate() <= SampleRate(sample_rate)
                    && config.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| anyhow!("no mono input config supports {sample_rate} Hz"))?;
        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            "audio capture initialized"
        );
        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| anyhow!("no input device available"))?;
        let buffer = Arc::clone(&self.buffer);
        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| tracing::error!(error = %err, "audio capture error"),
                None,
            )
            .context("failed to open input stream")?;
        stream.play().context("failed to start input stream")?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}

/// Segments live audio by energy and transcribes each segment.
pub struct MicrophoneSource<T> {
    capture: AudioCapture,
    segmenter: SpeechSegmenter,
    transcriber: T,
    settings: ListenSettings,
    interrupt: Arc<AtomicBool>,
}

impl<T: Transcriber> MicrophoneSource<T> {
    pub fn open(
        settings: ListenSettings,
        transcriber: T,
        interrupt: Arc<AtomicBool>,
    ) -> anyhow::Result<Self> {
        let mut capture = AudioCapture::new(settings.sample_rate)?;
        capture.start()?;
        Ok(Self {
            capture,
            segmenter: SpeechSegmenter::new(settings),
            transcriber,
            settings,
            interrupt,
        })
    }

    /// Samples room noise for the configured calibration window.
    pub fn calibrate(&mut self) -> f32 {
        self.capture.clear_buffer();
        let deadline = Instant::now() + self.settings.calibration;
        let mut ambient = Vec::new();
        while Instant::now() < deadline && !self.interrupt.load(Ordering::SeqCst) {
            thread::sleep(CHUNK_WAIT);
            ambient.extend(self.capture.take_buffer());
        }
        self.segmenter.calibrate(&ambient)
    }
}

impl<T: Transcriber> UtteranceSource for MicrophoneSource<T> {
    fn listen(&mut self) -> Result<Option<String>, RecognitionFailure> {
        self.capture.clear_buffer();
        self.segmenter.reset();
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return Ok(None);
            }
            thread::sleep(CHUNK_WAIT);
            let chunk = self.capture.take_buffer();
            let Some(segment) = self.segmenter.push(&chunk) else {
                continue;
            };
            tracing::debug!(samples = segment.len(), "speech segment captured");
            let wav = samples_to_wav(&segment, self.settings.sample_rate)
                .map_err(|err| RecognitionFailure::ServiceUnavailable(err.to_string()))?;
            return self.transcriber.transcribe(&wav).map(Some);
        }
    }
}
