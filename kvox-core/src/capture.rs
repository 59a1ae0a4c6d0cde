//! Keeps stray writes away from the protocol channel.
//!
//! Native model code does not go through Rust's `std::io`, so redirection
//! happens at the file-descriptor level.

use std::fs::File;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

static CAPTURE_LOCK: Mutex<()> = Mutex::new(());

/// Whatever was written to stdout and stderr while a capture was active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    /// Re-emit everything on a diagnostic stream.
    pub fn replay(&self, diagnostics: &mut impl Write) -> io::Result<()> {
        diagnostics.write_all(self.stderr.as_bytes())?;
        diagnostics.write_all(self.stdout.as_bytes())?;
        diagnostics.flush()
    }
}

/// Scoped redirection of fds 1 and 2 into private buffers. Dropping the
/// guard restores the original streams; [`StdioCapture::finish`] restores
/// them and hands back what was captured.
///
/// Only one capture may be active per process; `begin` blocks until any
/// other capture has finished.
pub struct StdioCapture {
    // Field order is drop order: streams are restored before the lock is
    // released.
    stdout: sys::Redirect,
    stderr: sys::Redirect,
    _lock: MutexGuard<'static, ()>,
}

impl StdioCapture {
    pub fn begin() -> io::Result<Self> {
        let lock = CAPTURE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        flush_std();
        let stdout = sys::Redirect::install(sys::STDOUT)?;
        let stderr = sys::Redirect::install(sys::STDERR)?;
        Ok(Self {
            stdout,
            stderr,
            _lock: lock,
        })
    }

    pub fn finish(self) -> io::Result<CapturedOutput> {
        let Self {
            mut stdout,
            mut stderr,
            _lock,
        } = self;
        flush_std();
        stdout.restore();
        stderr.restore();
        Ok(CapturedOutput {
            stdout: stdout.contents()?,
            stderr: stderr.contents()?,
        })
    }
}

/// Takes the real stdout for protocol output and points fd 1 at stderr, so
/// anything else that prints to stdout ends up on the diagnostic channel.
#[cfg(unix)]
pub fn detach_stdout() -> io::Result<File> {
    use std::os::unix::io::FromRawFd;

    flush_std();
    // SAFETY: dup/dup2 on the process's standard descriptors; the duplicate
    // is owned by the returned File.
    unsafe {
        let protocol = libc::dup(libc::STDOUT_FILENO);
        if protocol < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) < 0 {
            let err = io::Error::last_os_error();
            libc::close(protocol);
            return Err(err);
        }
        Ok(File::from_raw_fd(protocol))
    }
}

#[cfg(not(unix))]
pub fn detach_stdout() -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "stdout detaching is only available on unix",
    ))
}

fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io::{self, Read, Seek, SeekFrom};
    use std::os::unix::io::{AsRawFd, RawFd};

    pub const STDOUT: RawFd = libc::STDOUT_FILENO;
    pub const STDERR: RawFd = libc::STDERR_FILENO;

    pub struct Redirect {
        fd: RawFd,
        saved: Option<RawFd>,
        sink: File,
    }

    impl Redirect {
        pub fn install(fd: RawFd) -> io::Result<Self> {
            // An unlinked temp file rather than a pipe: a pipe would block
            // the writer once its buffer fills.
            let sink = tempfile::tempfile()?;
            // SAFETY: plain descriptor duplication; `saved` is closed in
            // `restore` or on the error path below.
            unsafe {
                let saved = libc::dup(fd);
                if saved < 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::dup2(sink.as_raw_fd(), fd) < 0 {
                    let err = io::Error::last_os_error();
                    libc::close(saved);
                    return Err(err);
                }
                Ok(Self {
                    fd,
                    saved: Some(saved),
                    sink,
                })
            }
        }

        pub fn restore(&mut self) {
            if let Some(saved) = self.saved.take() {
                // SAFETY: `saved` came from dup in `install` and is closed
                // exactly once.
                unsafe {
                    libc::dup2(saved, self.fd);
                    libc::close(saved);
                }
            }
        }

        pub fn contents(&mut self) -> io::Result<String> {
            let mut bytes = Vec::new();
            self.sink.seek(SeekFrom::Start(0))?;
            self.sink.read_to_end(&mut bytes)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    impl Drop for Redirect {
        fn drop(&mut self) {
            if self.saved.is_some() {
                super::flush_std();
                self.restore();
            }
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::io;

    pub const STDOUT: i32 = 1;
    pub const STDERR: i32 = 2;

    pub struct Redirect;

    impl Redirect {
        pub fn install(_fd: i32) -> io::Result<Self> {
            Ok(Self)
        }

        pub fn restore(&mut self) {}

        pub fn contents(&mut self) -> io::Result<String> {
            Ok(String::new())
        }
    }
}
