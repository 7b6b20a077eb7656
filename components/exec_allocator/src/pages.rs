//! OS page mappings backing the allocator's chunks.

use std::ptr::NonNull;

use crate::ExecMemoryError;

/// Size of an OS page.
pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    }
    #[cfg(not(unix))]
    {
        4096
    }
}

/// A readable, writable and executable page range, unmapped on drop.
pub(crate) struct PageMapping {
    ptr: NonNull<u8>,
    size: usize,
}

// SAFETY: the mapping is plain memory owned by this value; all access is
// serialized by the allocator's mutex.
unsafe impl Send for PageMapping {}

impl PageMapping {
    /// Maps `size` bytes; `size` must be a multiple of the page size.
    #[cfg(unix)]
    pub(crate) fn map(size: usize) -> Result<Self, ExecMemoryError> {
        debug_assert_eq!(size % page_size(), 0);

        #[cfg(target_os = "macos")]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_JIT;
        #[cfg(not(target_os = "macos"))]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

        // SAFETY: anonymous mapping with no address hint.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ExecMemoryError::MapFailed {
                size,
                errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
            });
        }
        NonNull::new(ptr as *mut u8)
            .map(|ptr| PageMapping { ptr, size })
            .ok_or(ExecMemoryError::MapFailed { size, errno: 0 })
    }

    /// Fallback for non-Unix hosts: page-aligned heap memory that is not
    /// executable.
    #[cfg(not(unix))]
    pub(crate) fn map(size: usize) -> Result<Self, ExecMemoryError> {
        let layout = std::alloc::Layout::from_size_align(size, page_size())
            .map_err(|_| ExecMemoryError::InvalidSize(size))?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr)
            .map(|ptr| PageMapping { ptr, size })
            .ok_or(ExecMemoryError::MapFailed { size, errno: 0 })
    }

    /// First byte of the mapping.
    pub(crate) fn base(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Length of the mapping.
    pub(crate) fn size(&self) -> usize {
        self.size
    }
}

impl Drop for PageMapping {
    fn drop(&mut self) {
        #[cfg(unix)]
        // SAFETY: ptr/size came from a successful mmap and are unmapped once.
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
        }
        #[cfg(not(unix))]
        // SAFETY: allocated in `map` with the same layout.
        unsafe {
            let layout = std::alloc::Layout::from_size_align_unchecked(self.size, page_size());
            std::alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}
