use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use kvox_core::Response;
use kvox_subprocess::run_subprocess;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut settings_path: Option<PathBuf> = None;
    let mut i = 1;
    while i < args.len() {
        if args[i].as_str() == "--settings-path" {
            i += 1;
            if i < args.len() {
                settings_path = Some(PathBuf::from(&args[i]));
            }
        }
        i += 1;
    }

    let result = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => {
            let result = runtime.block_on(run_subprocess(settings_path));
            // A stdin read may still be parked on the blocking pool.
            runtime.shutdown_background();
            result
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let line = Response::failure(format!("{e:#}")).to_line();
            let _ = std::io::stderr().write_all(line.as_bytes());
            ExitCode::FAILURE
        }
    }
}
