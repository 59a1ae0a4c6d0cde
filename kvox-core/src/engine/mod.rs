//! The synthesis model as an injected capability.
//!
//! A [`SpeechEngine`] builds one [`Pipeline`] per language code. A pipeline
//! turns text into a lazy sequence of [`Segment`]s; the caller decides how
//! much of the sequence to pull.

pub mod command;
pub mod mock;

use anyhow::Result;

pub use command::CommandEngine;
pub use mock::{MockBehavior, MockEngine};

use crate::error::TtsError;
use crate::settings::{EngineConfig, Settings};

/// One unit of synthesized speech as produced by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub graphemes: String,
    pub phonemes: Option<String>,
    pub audio: Vec<f32>,
}

/// Lazy sequence of segments. Each item is produced on demand.
pub type SegmentStream<'a> = Box<dyn Iterator<Item = Result<Segment>> + 'a>;

/// How input text is broken up before the model sub-chunks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitPattern {
    /// Split on one or more consecutive `\n`.
    #[default]
    NewlineRuns,
    /// Hand the whole text to the model at once.
    Whole,
}

impl SplitPattern {
    pub fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        match self {
            SplitPattern::NewlineRuns => text.split('\n').filter(|s| !s.is_empty()).collect(),
            SplitPattern::Whole => vec![text],
        }
    }
}

/// A per-language synthesis pipeline. Not reentrant; callers hold it
/// exclusively while a stream is alive.
pub trait Pipeline: Send {
    fn run<'a>(
        &'a mut self,
        text: &'a str,
        voice: &'a str,
        speed: f32,
        split: SplitPattern,
    ) -> Result<SegmentStream<'a>>;
}

/// Constructs pipelines. Construction may be slow and noisy.
pub trait SpeechEngine: Send {
    fn init(&self, lang_code: &str) -> Result<Box<dyn Pipeline>>;
}

/// Build the engine selected in settings. Fails with
/// [`TtsError::MissingDependency`] when the engine cannot run at all.
pub fn engine_from_settings(settings: &Settings) -> Result<Box<dyn SpeechEngine>, TtsError> {
    match &settings.engine {
        EngineConfig::Command { program, args, env } => Ok(Box::new(CommandEngine::new(
            program,
            args.clone(),
            env.clone(),
            settings.languages.clone(),
        )?)),
        EngineConfig::Mock { behavior } => Ok(Box::new(MockEngine::new(behavior.clone()))),
    }
}
