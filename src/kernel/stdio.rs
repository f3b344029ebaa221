//! Inherited standard stream handles and the one-time stdout/stderr rebind.
//!
//! The stdio transport must keep talking to the streams the host handed us
//! even after diagnostics rebinds descriptors 1 and 2 to a log file, so the
//! inherited handles are duplicated before any rebinding happens.

use std::fs::File;
use std::io::{self, Write};

/// Duplicated inherited stdin/stdout, owned independently of fd 0 and 1.
///
/// Both sides are raw `File`s: reads and writes go straight to the
/// descriptor with no userspace buffering.
#[derive(Debug)]
pub struct InheritedStdio {
    pub input: File,
    pub output: File,
}

impl InheritedStdio {
    /// Duplicate the process's inherited standard input and output.
    #[cfg(unix)]
    pub fn capture() -> io::Result<Self> {
        use std::os::fd::AsFd;

        let input = io::stdin().as_fd().try_clone_to_owned()?;
        let output = io::stdout().as_fd().try_clone_to_owned()?;
        Ok(Self {
            input: File::from(input),
            output: File::from(output),
        })
    }

    /// Duplicate the process's inherited standard input and output.
    #[cfg(windows)]
    pub fn capture() -> io::Result<Self> {
        use std::os::windows::io::AsHandle;

        let input = io::stdin().as_handle().try_clone_to_owned()?;
        let output = io::stdout().as_handle().try_clone_to_owned()?;
        Ok(Self {
            input: File::from(input),
            output: File::from(output),
        })
    }

    /// Build from already-open handles (pipes in tests, for instance).
    pub fn from_files(input: File, output: File) -> Self {
        Self { input, output }
    }
}

/// Point every descriptor in `targets` at `file`.
#[cfg(unix)]
pub fn rebind_descriptors(file: &File, targets: &[std::os::fd::RawFd]) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    for &target in targets {
        // SAFETY: `file` is open for the duration of the call and dup2(2)
        // atomically replaces `target`; no Rust object owns `target` in a way
        // that relies on its previous open file description.
        let rc = unsafe { libc::dup2(file.as_raw_fd(), target) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Rebind the process-wide stdout and stderr to `file`.
///
/// Called only from `DiagnosticsConfig::install`, once per process.
pub fn rebind_std_streams(file: &File) -> io::Result<()> {
    // Anything still sitting in std's line buffer belongs to the old stream.
    io::stdout().flush()?;

    #[cfg(unix)]
    {
        rebind_descriptors(file, &[libc::STDOUT_FILENO, libc::STDERR_FILENO])
    }

    #[cfg(windows)]
    {
        super::win32::set_std_handles(file)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = file;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "standard stream rebinding is not supported on this platform",
        ))
    }
}
