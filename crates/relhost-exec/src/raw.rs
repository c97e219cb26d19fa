//! Async-signal-safe stderr writes for use between `fork()` and `execve()`.

/// Write `msg` followed by ` (errno=<n>)\n` to stderr without allocating.
#[cfg(unix)]
pub(crate) fn write_errno(msg: &[u8], errno: Option<i32>) {
    write_raw(msg);
    if let Some(errno) = errno {
        let mut buf = [0u8; 24];
        let mut idx = buf.len();
        idx -= 1;
        buf[idx] = b')';
        let mut n = errno.unsigned_abs();
        loop {
            idx -= 1;
            buf[idx] = b'0' + (n % 10) as u8;
            n /= 10;
            if n == 0 {
                break;
            }
        }
        if errno < 0 {
            idx -= 1;
            buf[idx] = b'-';
        }
        write_raw(b" (errno=");
        write_raw(&buf[idx..]);
    }
    write_raw(b"\n");
}

#[cfg(unix)]
fn write_raw(bytes: &[u8]) {
    // SAFETY: `write(2)` is async-signal-safe and `bytes` outlives the call.
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        );
    }
}
