pub mod audio;
pub mod cache;
pub mod capture;
pub mod engine;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod settings;
pub mod synth;

// Public library API used by the worker binaries.
pub use capture::{CapturedOutput, StdioCapture};
pub use engine::{Pipeline, SpeechEngine};
pub use error::TtsError;
pub use protocol::{Action, Request, Response};
pub use settings::{Settings, SettingsManager};
pub use synth::{Synthesis, SynthesisJob, Synthesizer, SAMPLE_RATE};
