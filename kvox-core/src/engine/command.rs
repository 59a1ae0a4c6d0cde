//! Speech engine backed by an external synthesis program.
//!
//! The program is started once per text segment. It receives the segment on
//! stdin and must write a complete mono WAV stream at 24 kHz to stdout.
//! Arguments may reference `{voice}`, `{language}`, `{lang_code}` and
//! `{speed}`.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};

use super::{Pipeline, Segment, SegmentStream, SpeechEngine, SplitPattern};
use crate::error::TtsError;
use crate::synth::SAMPLE_RATE;

pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    languages: BTreeMap<String, String>,
}

impl CommandEngine {
    pub fn new(
        program: &str,
        args: Vec<String>,
        env: HashMap<String, String>,
        languages: BTreeMap<String, String>,
    ) -> Result<Self, TtsError> {
        let Some(resolved) = resolve_program(program) else {
            return Err(TtsError::MissingDependency(format!(
                "Speech engine '{program}' not found. Install it or set engine.program in the kvox settings file"
            )));
        };

        info!(
            program = %resolved.display(),
            languages = languages.len(),
            "Detected speech engine"
        );

        Ok(Self {
            program: resolved,
            args,
            env,
            languages,
        })
    }
}

impl SpeechEngine for CommandEngine {
    fn init(&self, lang_code: &str) -> Result<Box<dyn Pipeline>> {
        let language = self
            .languages
            .get(lang_code)
            .ok_or_else(|| anyhow!("Unsupported language code '{lang_code}'"))?;

        debug!(lang_code, language = %language, "Prepared command pipeline");
        Ok(Box::new(CommandPipeline {
            program: self.program.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            lang_code: lang_code.to_string(),
            language: language.clone(),
        }))
    }
}

struct CommandPipeline {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    lang_code: String,
    language: String,
}

impl Pipeline for CommandPipeline {
    fn run<'a>(
        &'a mut self,
        text: &'a str,
        voice: &'a str,
        speed: f32,
        split: SplitPattern,
    ) -> Result<SegmentStream<'a>> {
        let this: &'a CommandPipeline = self;
        Ok(Box::new(
            split
                .split(text)
                .into_iter()
                .map(move |piece| this.synthesize_piece(piece, voice, speed)),
        ))
    }
}

impl CommandPipeline {
    fn expand(&self, arg: &str, voice: &str, speed: f32) -> String {
        arg.replace("{voice}", voice)
            .replace("{language}", &self.language)
            .replace("{lang_code}", &self.lang_code)
            .replace("{speed}", &speed.to_string())
    }

    fn synthesize_piece(&self, piece: &str, voice: &str, speed: f32) -> Result<Segment> {
        let mut command = Command::new(&self.program);
        for arg in &self.args {
            command.arg(self.expand(arg, voice, speed));
        }
        command.envs(&self.env);

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| {
                format!("Failed to spawn speech engine '{}'", self.program.display())
            })?;

        // Feed stdin from another thread so a chatty engine cannot deadlock
        // against a full stdout pipe.
        let mut stdin = child
            .stdin
            .take()
            .context("Speech engine stdin was not captured")?;
        let input = piece.to_string();
        let feeder = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .context("Failed to wait for speech engine")?;

        match feeder.join() {
            Ok(Err(e)) if e.kind() != ErrorKind::BrokenPipe => {
                debug!(error = %e, "Failed to write text to speech engine");
            }
            _ => {}
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!(target: "kvox::engine", "{line}");
        }

        if !output.status.success() {
            let detail = stderr.trim();
            if detail.is_empty() {
                bail!("Speech engine exited with {}", output.status);
            }
            bail!("Speech engine exited with {}: {detail}", output.status);
        }

        let audio = decode_wav(&output.stdout)?;
        Ok(Segment {
            graphemes: piece.to_string(),
            phonemes: None,
            audio,
        })
    }
}

/// Decode a mono WAV produced by the engine into normalized f32 samples.
pub fn decode_wav(bytes: &[u8]) -> Result<Vec<f32>> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .context("Speech engine did not produce WAV audio")?;
    let spec = reader.spec();

    if spec.channels != 1 {
        bail!(
            "Speech engine produced {} channels, expected mono",
            spec.channels
        );
    }
    if spec.sample_rate != SAMPLE_RATE {
        bail!(
            "Speech engine produced {} Hz audio, expected {SAMPLE_RATE} Hz",
            spec.sample_rate
        );
    }

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Malformed WAV from speech engine")?,
        hound::SampleFormat::Int => {
            let scale = pcm_scale(spec.bits_per_sample)?;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .context("Malformed WAV from speech engine")?
        }
    };
    Ok(samples)
}

/// Full-scale value for signed integer PCM of the given depth.
fn pcm_scale(bits_per_sample: u16) -> Result<f32> {
    if !(8..=32).contains(&bits_per_sample) {
        bail!("Speech engine produced {bits_per_sample}-bit PCM, expected 8 to 32 bits");
    }
    Ok((1i64 << (bits_per_sample - 1)) as f32)
}

/// Locate `program` either as an explicit path or on `PATH`.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.trim().is_empty() {
        return None;
    }

    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn languages() -> BTreeMap<String, String> {
        BTreeMap::from([("a".to_string(), "en-us".to_string())])
    }

    #[test]
    fn test_decode_wav_normalizes_pcm16() {
        let samples = decode_wav(&wav_bytes(SAMPLE_RATE, 1, &[0, 16384, -32768])).unwrap();
        assert_eq!(samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_decode_wav_rejects_other_sample_rates() {
        let err = decode_wav(&wav_bytes(22050, 1, &[0; 4])).unwrap_err();
        assert!(err.to_string().contains("22050 Hz"), "{err}");
    }

    #[test]
    fn test_decode_wav_rejects_stereo() {
        let err = decode_wav(&wav_bytes(SAMPLE_RATE, 2, &[0; 4])).unwrap_err();
        assert!(err.to_string().contains("expected mono"), "{err}");
    }

    #[test]
    fn test_pcm_scale_rejects_unusable_depths() {
        assert_eq!(pcm_scale(16).unwrap(), 32768.0);
        assert_eq!(pcm_scale(8).unwrap(), 128.0);
        for bits in [0, 1, 7, 33, 64] {
            let err = pcm_scale(bits).unwrap_err();
            assert!(err.to_string().contains(&format!("{bits}-bit PCM")), "{err}");
        }
    }

    #[test]
    fn test_decode_wav_rejects_garbage() {
        let err = decode_wav(b"definitely not audio").unwrap_err();
        assert!(err.to_string().contains("did not produce WAV"), "{err}");
    }

    #[test]
    fn test_missing_program_is_missing_dependency() {
        let err = CommandEngine::new(
            "kvox-no-such-engine-binary",
            vec![],
            HashMap::new(),
            languages(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, TtsError::MissingDependency(_)));
        assert!(err.to_string().contains("kvox-no-such-engine-binary"));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use tempfile::tempdir;

        fn shell_engine(script: String) -> CommandEngine {
            CommandEngine::new(
                "sh",
                vec!["-c".to_string(), script],
                HashMap::new(),
                languages(),
            )
            .unwrap()
        }

        #[test]
        fn test_unknown_language_fails_init() {
            let engine = shell_engine("true".to_string());
            let err = engine.init("q").err().unwrap();
            assert_eq!(err.to_string(), "Unsupported language code 'q'");
        }

        #[test]
        fn test_one_process_per_segment() {
            let dir = tempdir().unwrap();
            let fixture = dir.path().join("chunk.wav");
            std::fs::write(&fixture, wav_bytes(SAMPLE_RATE, 1, &[100; 240])).unwrap();

            let engine = shell_engine(format!("cat > /dev/null; cat '{}'", fixture.display()));
            let mut pipeline = engine.init("a").unwrap();
            let segments: Vec<Segment> = pipeline
                .run("first\n\nsecond", "af_heart", 1.0, SplitPattern::NewlineRuns)
                .unwrap()
                .collect::<Result<_>>()
                .unwrap();

            assert_eq!(segments.len(), 2);
            assert_eq!(segments[0].graphemes, "first");
            assert_eq!(segments[1].graphemes, "second");
            assert!(segments.iter().all(|s| s.audio.len() == 240));
        }

        #[test]
        fn test_arguments_are_expanded() {
            let dir = tempdir().unwrap();
            let fixture = dir.path().join("chunk.wav");
            let seen = dir.path().join("seen.txt");
            std::fs::write(&fixture, wav_bytes(SAMPLE_RATE, 1, &[0; 24])).unwrap();

            let engine = CommandEngine::new(
                "sh",
                vec![
                    "-c".to_string(),
                    format!(
                        "echo \"$0 $1 $2 $3\" > '{}'; cat > /dev/null; cat '{}'",
                        seen.display(),
                        fixture.display()
                    ),
                    "{voice}".to_string(),
                    "{language}".to_string(),
                    "{lang_code}".to_string(),
                    "{speed}".to_string(),
                ],
                HashMap::new(),
                languages(),
            )
            .unwrap();

            let mut pipeline = engine.init("a").unwrap();
            let count = pipeline
                .run("hello", "af_heart", 1.0, SplitPattern::NewlineRuns)
                .unwrap()
                .count();
            assert_eq!(count, 1);
            assert_eq!(
                std::fs::read_to_string(&seen).unwrap().trim(),
                "af_heart en-us a 1"
            );
        }

        #[test]
        fn test_failed_engine_reports_stderr() {
            let engine = shell_engine("echo 'voice not found' >&2; exit 3".to_string());
            let mut pipeline = engine.init("a").unwrap();
            let err = pipeline
                .run("hello", "zz_nobody", 1.0, SplitPattern::NewlineRuns)
                .unwrap()
                .next()
                .unwrap()
                .unwrap_err();
            let message = err.to_string();
            assert!(message.contains("voice not found"), "{message}");
        }
    }
}
