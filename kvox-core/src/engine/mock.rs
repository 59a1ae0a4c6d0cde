use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::{Pipeline, Segment, SegmentStream, SpeechEngine, SplitPattern};

/// Mock behavior for the mock engine
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MockBehavior {
    /// One chunk of `DEFAULT_CHUNK_SAMPLES` per split segment
    #[default]
    Success,
    /// Yield exactly these chunk sizes, ignoring the split
    Chunks { sizes: Vec<usize> },
    /// Yield nothing at all
    Empty,
    /// Fail while constructing the pipeline
    InitError { message: String },
    /// Yield `after` chunks of `DEFAULT_CHUNK_SAMPLES`, then fail
    StreamError { after: usize, message: String },
    /// Write `message` straight to stdout and stderr during construction and
    /// synthesis, then behave like `Chunks`
    Noisy { sizes: Vec<usize>, message: String },
    /// Panic in the middle of synthesis
    Panic { message: String },
}

pub const DEFAULT_CHUNK_SAMPLES: usize = 2400;

/// What a pipeline was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub struct MockRun {
    pub lang_code: String,
    pub text: String,
    pub voice: String,
    pub speed: f32,
    pub split: SplitPattern,
}

/// Mock engine for testing. Clones share counters, so a test can keep one
/// handle while the worker owns another.
#[derive(Clone, Default)]
pub struct MockEngine {
    behavior: Arc<Mutex<MockBehavior>>,
    init_calls: Arc<Mutex<Vec<String>>>,
    runs: Arc<Mutex<Vec<MockRun>>>,
}

impl MockEngine {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            ..Self::default()
        }
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Number of pipelines constructed so far, across all languages.
    pub fn init_count(&self) -> usize {
        self.init_calls.lock().unwrap().len()
    }

    /// Number of pipelines constructed for one language code.
    pub fn init_count_for(&self, lang_code: &str) -> usize {
        self.init_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|code| code.as_str() == lang_code)
            .count()
    }

    pub fn runs(&self) -> Vec<MockRun> {
        self.runs.lock().unwrap().clone()
    }
}

impl SpeechEngine for MockEngine {
    fn init(&self, lang_code: &str) -> Result<Box<dyn Pipeline>> {
        let behavior = self.behavior.lock().unwrap().clone();
        match &behavior {
            MockBehavior::InitError { message } => return Err(anyhow!(message.clone())),
            MockBehavior::Noisy { message, .. } => shout(message),
            _ => {}
        }

        self.init_calls.lock().unwrap().push(lang_code.to_string());
        Ok(Box::new(MockPipeline {
            lang_code: lang_code.to_string(),
            behavior: self.behavior.clone(),
            runs: self.runs.clone(),
        }))
    }
}

struct MockPipeline {
    lang_code: String,
    behavior: Arc<Mutex<MockBehavior>>,
    runs: Arc<Mutex<Vec<MockRun>>>,
}

impl Pipeline for MockPipeline {
    fn run<'a>(
        &'a mut self,
        text: &'a str,
        voice: &'a str,
        speed: f32,
        split: SplitPattern,
    ) -> Result<SegmentStream<'a>> {
        self.runs.lock().unwrap().push(MockRun {
            lang_code: self.lang_code.clone(),
            text: text.to_string(),
            voice: voice.to_string(),
            speed,
            split,
        });

        let behavior = self.behavior.lock().unwrap().clone();
        let stream: SegmentStream<'a> = match behavior {
            MockBehavior::Success => Box::new(
                split
                    .split(text)
                    .into_iter()
                    .map(|piece| segment(piece, DEFAULT_CHUNK_SAMPLES)),
            ),
            MockBehavior::Chunks { sizes } => {
                Box::new(sizes.into_iter().map(move |n| segment(text, n)))
            }
            MockBehavior::Empty => Box::new(std::iter::empty::<Result<Segment>>()),
            MockBehavior::InitError { message } => return Err(anyhow!(message)),
            MockBehavior::StreamError { after, message } => Box::new(
                std::iter::repeat_with(move || segment(text, DEFAULT_CHUNK_SAMPLES))
                    .take(after)
                    .chain(std::iter::once(Err(anyhow!(message)))),
            ),
            MockBehavior::Noisy { sizes, message } => Box::new(sizes.into_iter().map(move |n| {
                shout(&message);
                segment(text, n)
            })),
            MockBehavior::Panic { message } => Box::new(std::iter::once_with(
                move || -> Result<Segment> { panic!("{message}") },
            )),
        };
        Ok(stream)
    }
}

fn segment(text: &str, samples: usize) -> Result<Segment> {
    Ok(Segment {
        graphemes: text.to_string(),
        phonemes: None,
        audio: vec![0.25; samples],
    })
}

/// Bypasses logging on purpose: this is how a badly behaved framework
/// corrupts a protocol channel.
fn shout(message: &str) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{message}");
    let _ = stdout.flush();
    let _ = writeln!(std::io::stderr(), "{message}");
}
