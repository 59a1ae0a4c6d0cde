//! Encoding the final sample buffer to disk.

use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Writes a finished sample buffer to `path`.
pub trait AudioWriter: Send {
    fn write(&self, samples: &[f32], sample_rate: u32, path: &Path) -> Result<()>;
}

/// Mono 16-bit PCM WAV. The file is staged next to the target and renamed
/// into place once finalized, so `path` either holds a complete artifact or
/// is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavFileWriter;

impl AudioWriter for WavFileWriter {
    fn write(&self, samples: &[f32], sample_rate: u32, path: &Path) -> Result<()> {
        if let Some(ext) = path.extension() {
            if !ext.eq_ignore_ascii_case("wav") {
                bail!("unsupported audio format '{}'", ext.to_string_lossy());
            }
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let staging = tempfile::Builder::new()
            .prefix(".kvox-")
            .suffix(".wav.part")
            .tempfile_in(dir)
            .with_context(|| format!("Failed to create staging file in {}", dir.display()))?;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(BufWriter::new(staging.as_file()), spec)
            .context("Failed to start WAV stream")?;
        for &sample in samples {
            let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(scaled)?;
        }
        writer.finalize().context("Failed to finalize WAV stream")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(staging.path(), std::fs::Permissions::from_mode(0o644))
                .context("Failed to set audio file permissions")?;
        }

        staging.persist(path)?;
        Ok(())
    }
}
