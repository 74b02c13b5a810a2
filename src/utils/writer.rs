use core::fmt;

/// Fixed-size formatting buffer that truncates instead of failing.
///
/// Output that does not fit is silently cut, possibly in the middle of a
/// UTF-8 sequence, so the contents are exposed as bytes only.
pub struct FmtBuffer<const N: usize> {
    buf: heapless::Vec<u8, N>,
    truncated: bool,
}

impl<const N: usize> FmtBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            truncated: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// True if some output was cut.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Append as much of `bytes` as fits.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        let take = bytes.len().min(N - self.buf.len());
        // `take` never exceeds the remaining capacity
        let _ = self.buf.extend_from_slice(&bytes[..take]);
        if take < bytes.len() {
            self.truncated = true;
        }
    }
}

impl<const N: usize> Default for FmtBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for FmtBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}
