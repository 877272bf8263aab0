use std::ptr::NonNull;

/// Abstraction over the platform calls that acquire and release a pool's
/// backing block. A pool performs exactly one acquisition when it is created
/// and exactly one release when it is torn down; nothing in between touches
/// the platform.
pub(crate) trait PlatformMemory {
    /// Request one backing block of `len` bytes. Returns a pointer to the
    /// block or `None` if the underlying platform call fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Return the block of `len` bytes starting at `addr` to the platform.
    unsafe fn return_memory(addr: *mut u8, len: usize);
}

/// The platform this build runs on. The trait impl is selected per target
/// below.
pub(crate) struct Platform;

/// Wrapper for [`Platform::request_memory`].
#[inline]
pub(crate) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
    unsafe { Platform::request_memory(len) }
}

/// Wrapper for [`Platform::return_memory`].
#[inline]
pub(crate) unsafe fn return_memory(addr: *mut u8, len: usize) {
    unsafe { Platform::return_memory(addr, len) }
}

#[cfg(unix)]
mod unix {
    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    use libc::{mmap, munmap, off_t, size_t};

    use super::{Platform, PlatformMemory};

    impl PlatformMemory for Platform {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                if addr == libc::MAP_FAILED {
                    None
                } else {
                    Some(NonNull::new_unchecked(addr).cast::<u8>())
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::Memory;

    use super::{Platform, PlatformMemory};

    impl PlatformMemory for Platform {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }
    }
}
