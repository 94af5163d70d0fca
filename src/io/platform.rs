use std::ffi::CString;
use std::os::fd::RawFd;
use std::path::Path;

use crate::error::StriderError;

/// Platform-specific open flags for direct reads.
///
/// - Linux: `O_DIRECT` at open time.
/// - macOS: plain open; the buffer cache is disabled afterwards with
///   `fcntl(F_NOCACHE)`.
#[cfg(target_os = "linux")]
fn direct_open_flags() -> libc::c_int {
    libc::O_RDONLY | libc::O_DIRECT
}

#[cfg(not(target_os = "linux"))]
fn direct_open_flags() -> libc::c_int {
    libc::O_RDONLY
}

#[cfg(target_os = "macos")]
fn configure_direct_io(fd: RawFd) -> std::io::Result<()> {
    let ret = unsafe { libc::fcntl(fd, libc::F_NOCACHE, 1) };
    if ret == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn configure_direct_io(_fd: RawFd) -> std::io::Result<()> {
    Ok(())
}

/// An open block file, direct I/O when the filesystem supports it.
pub struct DirectFile {
    fd: RawFd,
    /// False when the open fell back to buffered I/O (e.g. tmpfs).
    pub direct: bool,
}

impl DirectFile {
    /// Open `path` for direct reads, falling back to buffered I/O when
    /// the filesystem refuses `O_DIRECT`.
    pub fn open(path: &Path) -> Result<Self, StriderError> {
        let c_path = CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|_| StriderError::BadInput(format!("{}: NUL in path", path.display())))?;

        let fd = unsafe { libc::open(c_path.as_ptr(), direct_open_flags()) };
        if fd >= 0 {
            if configure_direct_io(fd).is_ok() {
                return Ok(Self { fd, direct: true });
            }
            unsafe { libc::close(fd) };
        }

        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY) };
        if fd < 0 {
            return Err(StriderError::io(path, std::io::Error::last_os_error()));
        }
        tracing::warn!(path = %path.display(), "direct I/O unavailable, using buffered reads");
        Ok(Self { fd, direct: false })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    /// Positional read that retries short reads until `buf` is full or
    /// EOF. Returns the byte count actually read.
    pub fn pread_full(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let mut total = 0usize;
        while total < buf.len() {
            let ret = unsafe {
                libc::pread(
                    self.fd,
                    buf[total..].as_mut_ptr() as *mut libc::c_void,
                    buf.len() - total,
                    (offset + total as u64) as libc::off_t,
                )
            };
            if ret < 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err);
            }
            if ret == 0 {
                break; // EOF
            }
            total += ret as usize;
        }
        Ok(total)
    }
}

impl Drop for DirectFile {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
