/// Top-level interrupt delivery
///
/// On Unix, SIGINT and SIGTERM are blocked in every thread and collected by
/// one dedicated thread with sigwait(2), which forwards a single shutdown
/// request over a channel. On Windows a console control handler forwards
/// Ctrl-C and Ctrl-Break the same way. Only the holder of the receiving end
/// (the supervisor) ever sees the interrupt.
use crate::config::types::{Result, WorkerError};
use crate::core::types::ShutdownRequest;
use crossbeam_channel::Sender;
use log::{debug, info, warn};

#[cfg(unix)]
use nix::sys::signal::{SigSet, Signal};

#[cfg(unix)]
fn interrupt_set() -> SigSet {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask
}

/// Block interrupt signals in the calling thread and start the watcher.
///
/// Must run before any other thread is spawned so that every later thread
/// inherits the blocked mask.
#[cfg(unix)]
pub fn watch_interrupts(notify: Sender<ShutdownRequest>) -> Result<()> {
    let mask = interrupt_set();
    mask.thread_block()
        .map_err(|e| WorkerError::Signal(format!("Failed to block interrupt signals: {}", e)))?;

    std::thread::Builder::new()
        .name("interrupt-watch".to_string())
        .spawn(move || loop {
            match mask.wait() {
                Ok(signal) => {
                    debug!("Received {}", signal);
                    // The receiver may already be gone if the engine finished.
                    let _ = notify.send(ShutdownRequest::Interrupt {
                        signal: signal as i32,
                    });
                    break;
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    warn!("sigwait failed, interrupts will not be observed: {}", e);
                    break;
                }
            }
        })?;

    info!("Interrupt watcher installed (SIGINT, SIGTERM)");
    Ok(())
}

#[cfg(windows)]
static CONSOLE_NOTIFY: std::sync::Mutex<Option<Sender<ShutdownRequest>>> =
    std::sync::Mutex::new(None);

/// Signal numbers reported for console events, matching the C runtime's.
#[cfg(windows)]
fn console_signal(ctrl_type: u32) -> Option<i32> {
    use crate::kernel::win32::{CTRL_BREAK_EVENT, CTRL_C_EVENT};

    match ctrl_type {
        CTRL_C_EVENT => Some(2),
        CTRL_BREAK_EVENT => Some(21),
        _ => None,
    }
}

/// Runs on a system-created thread. The first Ctrl-C is handed to the
/// supervisor; later ones fall through to the default handler.
#[cfg(windows)]
unsafe extern "system" fn on_console_ctrl(ctrl_type: u32) -> i32 {
    let Some(signal) = console_signal(ctrl_type) else {
        return 0;
    };
    let notify = CONSOLE_NOTIFY
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    match notify {
        Some(notify) => {
            let _ = notify.send(ShutdownRequest::Interrupt { signal });
            1
        }
        None => 0,
    }
}

#[cfg(windows)]
pub fn watch_interrupts(notify: Sender<ShutdownRequest>) -> Result<()> {
    *CONSOLE_NOTIFY.lock().unwrap_or_else(|e| e.into_inner()) = Some(notify);
    crate::kernel::win32::add_console_ctrl_handler(on_console_ctrl).map_err(|e| {
        WorkerError::Signal(format!("Failed to install console control handler: {}", e))
    })?;
    info!("Interrupt watcher installed (Ctrl-C, Ctrl-Break)");
    Ok(())
}

#[cfg(not(any(unix, windows)))]
pub fn watch_interrupts(_notify: Sender<ShutdownRequest>) -> Result<()> {
    debug!("Interrupt watching is not supported on this platform");
    Ok(())
}
