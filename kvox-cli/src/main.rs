use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use kvox_core::{Response, SettingsManager, Synthesizer};

mod one_shot;

#[derive(Parser, Debug)]
#[command(name = "kvox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "kvox - synthesize one utterance to a WAV file")]
struct Args {
    /// Text to speak
    text: String,

    /// Voice identifier, e.g. af_heart
    voice: String,

    /// Single-letter language code, e.g. a for American English
    lang_code: String,

    /// Where to write the WAV file
    output_path: PathBuf,

    /// Load settings from a specific file instead of ~/.kvox/settings.toml
    #[arg(long, value_name = "PATH")]
    settings_path: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(_) => {
            report_failure(one_shot::USAGE);
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            report_failure(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let job = one_shot::job_from_args(args.text, args.voice, args.lang_code, args.output_path)?;

    let settings = match args.settings_path {
        Some(path) => SettingsManager::from_path(path)?,
        None => SettingsManager::new()?,
    };
    let _guard = kvox_core::logging::setup_tracing(&settings.settings().logging)?;
    info!(
        lang_code = %job.lang_code,
        voice = %job.voice,
        output_path = %job.output_path.display(),
        "One-shot synthesis"
    );

    let mut synthesizer = Synthesizer::from_settings(settings.settings())?;
    one_shot::run(&job, &mut synthesizer, &mut io::stdout(), &mut io::stderr())
}

fn report_failure(message: &str) {
    let line = Response::failure(message).to_line();
    let mut stderr = io::stderr();
    let _ = stderr.write_all(line.as_bytes());
    let _ = stderr.flush();
}
