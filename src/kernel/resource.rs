//! Scheduling priority and address-space primitives.

use std::io;

/// Raise the process niceness by `increment`. Returns the new niceness.
#[cfg(unix)]
pub fn lower_priority(increment: i32) -> io::Result<i32> {
    use nix::errno::Errno;

    // nice(2) may legitimately return -1, so errno is the only failure signal.
    Errno::clear();
    // SAFETY: nice(2) only adjusts the calling process's scheduling priority.
    let niceness = unsafe { libc::nice(increment as libc::c_int) };
    if niceness == -1 && Errno::last() != Errno::UnknownErrno {
        return Err(io::Error::last_os_error());
    }
    Ok(niceness)
}

/// Lower the soft RLIMIT_AS to `bytes`, clamped to the current hard limit.
/// Returns the soft limit actually applied.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub fn cap_address_space(bytes: u64) -> io::Result<u64> {
    use nix::sys::resource::{getrlimit, setrlimit, Resource};

    let (_, hard) = getrlimit(Resource::RLIMIT_AS).map_err(io::Error::from)?;
    let soft = bytes.min(hard as u64);
    setrlimit(Resource::RLIMIT_AS, soft as _, hard).map_err(io::Error::from)?;
    Ok(soft)
}

#[cfg(all(
    unix,
    not(any(target_os = "linux", target_os = "android", target_os = "freebsd"))
))]
pub fn cap_address_space(_bytes: u64) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "RLIMIT_AS is not available on this platform",
    ))
}
