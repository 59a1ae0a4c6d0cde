use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use kvox_core::{Response, StdioCapture, SynthesisJob, Synthesizer, TtsError};

pub const USAGE: &str = "Usage: kvox <text> <voice> <lang_code> <output_path>";

/// Builds the job from the four positional values. Every value must be
/// non-empty.
pub fn job_from_args(
    text: String,
    voice: String,
    lang_code: String,
    output_path: PathBuf,
) -> Result<SynthesisJob, TtsError> {
    if text.is_empty()
        || voice.is_empty()
        || lang_code.is_empty()
        || output_path.as_os_str().is_empty()
    {
        return Err(TtsError::InvalidArguments(USAGE.to_string()));
    }
    Ok(SynthesisJob {
        text,
        voice,
        lang_code,
        output_path,
    })
}

/// Runs one job with the process's stdio captured, so the result line is
/// the only thing that reaches `out`. Captured engine output is replayed
/// on `diagnostics`, followed by the error line when synthesis fails.
///
/// Returns whether synthesis succeeded.
pub fn run(
    job: &SynthesisJob,
    synthesizer: &mut Synthesizer,
    out: &mut impl Write,
    diagnostics: &mut impl Write,
) -> Result<bool> {
    let capture = StdioCapture::begin().context("Failed to capture engine output")?;
    let result = synthesizer.synthesize(job);
    let captured = capture
        .finish()
        .context("Failed to restore standard streams")?;

    if !captured.is_empty() {
        debug!(
            stdout_bytes = captured.stdout.len(),
            stderr_bytes = captured.stderr.len(),
            "Replaying engine output"
        );
    }
    captured
        .replay(diagnostics)
        .context("Failed to replay engine output")?;

    let succeeded = result.is_ok();
    let line = Response::from(result).to_line();
    if succeeded {
        out.write_all(line.as_bytes())?;
        out.flush()?;
    } else {
        diagnostics.write_all(line.as_bytes())?;
        diagnostics.flush()?;
    }
    Ok(succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvox_core::engine::{MockBehavior, MockEngine};
    use serde_json::Value;
    use tempfile::tempdir;

    #[test]
    fn test_empty_argument_is_usage_error() {
        let err = job_from_args(
            "hello".into(),
            String::new(),
            "a".into(),
            PathBuf::from("out.wav"),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), USAGE);
    }

    #[test]
    fn test_noise_is_moved_to_diagnostics() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("hello.wav");
        let engine = MockEngine::new(MockBehavior::Noisy {
            sizes: vec![24_000],
            message: "Defaulting repo_id to hexgrad/Kokoro-82M".to_string(),
        });
        let mut synth = Synthesizer::new(Box::new(engine));
        let job = job_from_args(
            "Hello".into(),
            "af_heart".into(),
            "a".into(),
            output_path.clone(),
        )
        .unwrap();

        let mut out = Vec::new();
        let mut diagnostics = Vec::new();
        let ok = run(&job, &mut synth, &mut out, &mut diagnostics).unwrap();

        assert!(ok);
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 1);
        let response: Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(response["success"], true);
        assert_eq!(response["duration"], 1.0);
        assert_eq!(response["sample_rate"], 24000);
        assert!(String::from_utf8(diagnostics)
            .unwrap()
            .contains("Defaulting repo_id"));
        assert!(output_path.exists());
    }

    #[test]
    fn test_failure_goes_to_diagnostics_only() {
        let dir = tempdir().unwrap();
        let mut synth = Synthesizer::new(Box::new(MockEngine::new(MockBehavior::Empty)));
        let job = SynthesisJob {
            text: "...".to_string(),
            voice: "af_heart".to_string(),
            lang_code: "a".to_string(),
            output_path: dir.path().join("silent.wav"),
        };

        let mut out = Vec::new();
        let mut diagnostics = Vec::new();
        let ok = run(&job, &mut synth, &mut out, &mut diagnostics).unwrap();

        assert!(!ok);
        assert!(out.is_empty());
        assert!(String::from_utf8(diagnostics)
            .unwrap()
            .ends_with("{\"success\":false,\"error\":\"No audio generated\"}\n"));
    }
}
