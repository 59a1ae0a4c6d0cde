use anyhow::Context;
use std::path::PathBuf;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use kvox_core::capture;
use kvox_core::{Action, Request, Response, SettingsManager, Synthesizer, TtsError};

/// What the loop does after handling one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Respond(Response),
    Skip,
    Exit,
}

/// Handle a single input line.
pub fn dispatch(line: &str, synthesizer: &mut Synthesizer) -> Dispatch {
    let line = line.trim();
    if line.is_empty() {
        return Dispatch::Skip;
    }

    let request = match Request::parse(line) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejected request line");
            return Dispatch::Respond(Response::from(&e));
        }
    };

    match request.action {
        Some(Action::Generate) => match request.to_job() {
            Ok(job) => Dispatch::Respond(Response::from(synthesizer.synthesize(&job))),
            Err(e) => Dispatch::Respond(Response::from(&e)),
        },
        Some(Action::Ping) => Dispatch::Respond(Response::pong()),
        Some(Action::Exit) => Dispatch::Exit,
        Some(Action::Unknown) | None => Dispatch::Respond(Response::from(&TtsError::UnknownAction)),
    }
}

/// Read requests from `input` until EOF or an `exit` action, writing one
/// response line per request to `output`. Only failing to read the input
/// or write the output ends the loop with an error; a line that is not
/// UTF-8 is answered like any other malformed request.
pub async fn serve<R, W>(
    input: R,
    mut output: W,
    synthesizer: &mut Synthesizer,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .context("Failed to read request from input stream")?;
        if read == 0 {
            break;
        }

        let next = match std::str::from_utf8(&buf) {
            Ok(line) => dispatch(line, synthesizer),
            Err(e) => {
                debug!(error = %e, "Request line is not UTF-8");
                Dispatch::Respond(Response::from(&TtsError::InvalidJson))
            }
        };

        match next {
            Dispatch::Respond(response) => {
                output
                    .write_all(response.to_line().as_bytes())
                    .await
                    .context("Failed to write response")?;
                output.flush().await.context("Failed to flush response")?;
            }
            Dispatch::Skip => continue,
            Dispatch::Exit => {
                info!("Exit requested");
                break;
            }
        }
    }
    Ok(())
}

/// Run the worker on the process's stdin/stdout until EOF, `exit`, or
/// Ctrl-C.
pub async fn run_subprocess(settings_path: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = match settings_path {
        Some(path) => SettingsManager::from_path(path)?,
        None => SettingsManager::new()?,
    };
    let _guard = kvox_core::logging::setup_tracing(&settings.settings().logging)?;

    let mut synthesizer = Synthesizer::from_settings(settings.settings())?;
    info!(settings = ?settings.path(), "kvox worker ready");

    let served = match capture::detach_stdout() {
        Ok(protocol) => {
            let output = tokio::fs::File::from_std(protocol);
            serve_until_interrupted(output, &mut synthesizer).await
        }
        Err(e) => {
            warn!(error = %e, "Serving on shared stdout");
            serve_until_interrupted(io::stdout(), &mut synthesizer).await
        }
    };
    info!(pipelines = synthesizer.cache().len(), "kvox worker stopped");
    served
}

async fn serve_until_interrupted<W>(output: W, synthesizer: &mut Synthesizer) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Synthesis blocks this thread, so an interrupt is only observed at the
    // next await point. Polling the signal first keeps it ahead of the
    // pending response write.
    tokio::select! {
        biased;
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
        result = serve(io::stdin(), output, synthesizer) => result,
    }
}
