//! Turns a request into an audio artifact on disk.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::{AudioWriter, WavFileWriter};
use crate::cache::PipelineCache;
use crate::engine::{engine_from_settings, SpeechEngine, SplitPattern};
use crate::error::TtsError;
use crate::settings::Settings;

/// Every artifact is written at this rate.
pub const SAMPLE_RATE: u32 = 24_000;

/// Speed factor handed to the model.
pub const SPEED: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisJob {
    pub text: String,
    pub voice: String,
    pub lang_code: String,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synthesis {
    pub output_path: PathBuf,
    pub duration: f64,
    pub sample_rate: u32,
}

pub struct Synthesizer {
    cache: PipelineCache,
    writer: Box<dyn AudioWriter>,
}

impl Synthesizer {
    pub fn new(engine: Box<dyn SpeechEngine>) -> Self {
        Self::with_writer(engine, Box::new(WavFileWriter))
    }

    pub fn with_writer(engine: Box<dyn SpeechEngine>, writer: Box<dyn AudioWriter>) -> Self {
        Self {
            cache: PipelineCache::new(engine),
            writer,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, TtsError> {
        Ok(Self::new(engine_from_settings(settings)?))
    }

    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    /// Runs one job to completion. Engine errors, write errors and engine
    /// panics all come back as `Err`; nothing escapes this call.
    pub fn synthesize(&mut self, job: &SynthesisJob) -> Result<Synthesis, TtsError> {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.render(job)))
            .unwrap_or_else(|payload| Err(TtsError::SynthesisFailure(panic_message(payload))));

        match &result {
            Ok(synthesis) => info!(
                lang_code = %job.lang_code,
                voice = %job.voice,
                duration = synthesis.duration,
                elapsed_ms = started.elapsed().as_millis() as u64,
                output_path = %synthesis.output_path.display(),
                "Generated audio"
            ),
            Err(e) => warn!(
                lang_code = %job.lang_code,
                voice = %job.voice,
                error = %e,
                "Audio generation failed"
            ),
        }
        result
    }

    fn render(&mut self, job: &SynthesisJob) -> Result<Synthesis, TtsError> {
        let pipeline = self
            .cache
            .get(&job.lang_code)
            .map_err(TtsError::synthesis)?;
        let stream = pipeline
            .run(&job.text, &job.voice, SPEED, SplitPattern::NewlineRuns)
            .map_err(TtsError::synthesis)?;

        // Collect everything before touching the disk; a failure part way
        // through leaves no artifact behind.
        let mut samples: Vec<f32> = Vec::new();
        let mut chunks = 0usize;
        for segment in stream {
            let segment = segment.map_err(TtsError::synthesis)?;
            debug!(
                chunk = chunks,
                samples = segment.audio.len(),
                graphemes = %segment.graphemes,
                "Received audio chunk"
            );
            samples.extend_from_slice(&segment.audio);
            chunks += 1;
        }

        if chunks == 0 {
            return Err(TtsError::EmptyOutput);
        }

        self.writer
            .write(&samples, SAMPLE_RATE, &job.output_path)
            .map_err(|e| TtsError::write_failed(&job.output_path, e))?;

        Ok(Synthesis {
            output_path: job.output_path.clone(),
            duration: samples.len() as f64 / SAMPLE_RATE as f64,
            sample_rate: SAMPLE_RATE,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "Speech engine panicked".to_string()
}
