//! Raw kernel32 bindings for the Windows resource limiter and stream rebind.

use std::ffi::c_void;
use std::fs::File;
use std::io;
use std::os::windows::io::IntoRawHandle;

const BELOW_NORMAL_PRIORITY_CLASS: u32 = 0x0000_4000;
const MEM_RESERVE: u32 = 0x0000_2000;
const MEM_TOP_DOWN: u32 = 0x0010_0000;
const PAGE_NOACCESS: u32 = 0x01;
const STD_OUTPUT_HANDLE: u32 = -11i32 as u32;
const STD_ERROR_HANDLE: u32 = -12i32 as u32;
pub const CTRL_C_EVENT: u32 = 0;
pub const CTRL_BREAK_EVENT: u32 = 1;

/// Console control handler routine, `PHANDLER_ROUTINE`.
pub type ConsoleCtrlHandler = unsafe extern "system" fn(ctrl_type: u32) -> i32;

#[link(name = "kernel32")]
extern "system" {
    fn GetCurrentProcess() -> *mut c_void;
    fn SetPriorityClass(process: *mut c_void, priority_class: u32) -> i32;
    fn VirtualAlloc(
        address: *mut c_void,
        size: usize,
        allocation_type: u32,
        protect: u32,
    ) -> *mut c_void;
    fn SetStdHandle(std_handle: u32, handle: *mut c_void) -> i32;
    fn SetConsoleCtrlHandler(handler: Option<ConsoleCtrlHandler>, add: i32) -> i32;
}

/// Move the current process to the below-normal priority class.
pub fn set_below_normal_priority() -> io::Result<()> {
    // SAFETY: GetCurrentProcess returns a pseudo-handle that needs no closing.
    let ok = unsafe { SetPriorityClass(GetCurrentProcess(), BELOW_NORMAL_PRIORITY_CLASS) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Reserve, without committing, `size` bytes of top-down no-access address
/// space. The region is never released; it lives until the process exits.
pub fn reserve_address_space(size: usize) -> io::Result<usize> {
    // SAFETY: a null base address lets the system choose the region; the
    // returned pages are PAGE_NOACCESS and never dereferenced.
    let base = unsafe {
        VirtualAlloc(
            std::ptr::null_mut(),
            size,
            MEM_RESERVE | MEM_TOP_DOWN,
            PAGE_NOACCESS,
        )
    };
    if base.is_null() {
        return Err(io::Error::last_os_error());
    }
    Ok(base as usize)
}

/// Install a duplicate of `file` as the process stdout and stderr handles.
pub fn set_std_handles(file: &File) -> io::Result<()> {
    for std_handle in [STD_OUTPUT_HANDLE, STD_ERROR_HANDLE] {
        // The process keeps the duplicate for its whole lifetime.
        let handle = file.try_clone()?.into_raw_handle();
        // SAFETY: `handle` is a valid, owned file handle that is never closed.
        let ok = unsafe { SetStdHandle(std_handle, handle as *mut c_void) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Add `handler` to the process's console control handler list.
pub fn add_console_ctrl_handler(handler: ConsoleCtrlHandler) -> io::Result<()> {
    // SAFETY: `handler` is a plain function that lives for the whole process.
    let ok = unsafe { SetConsoleCtrlHandler(Some(handler), 1) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
