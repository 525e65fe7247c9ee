//! # Bounded output capture.
//!
//! Each child stream is drained into an [`OutputBuffer`] that keeps at most
//! `cap` bytes. On overflow the oldest bytes are discarded, so the tail of
//! the stream survives and the dropped byte count records the truncation.
//! The reader always consumes the pipe at full speed; the bound never
//! backpressures the child.

use std::borrow::Cow;
use std::collections::VecDeque;

/// Drop-oldest ring of captured bytes.
#[derive(Debug, Default)]
pub(crate) struct OutputBuffer {
    cap: usize,
    data: VecDeque<u8>,
    dropped: u64,
}

impl OutputBuffer {
    /// `cap` bytes retained per stream; `cap == 0` discards everything
    /// while still counting.
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            cap,
            data: VecDeque::with_capacity(cap.min(64 * 1024)),
            dropped: 0,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        if self.cap == 0 {
            self.dropped += chunk.len() as u64;
            return;
        }
        if chunk.len() >= self.cap {
            self.dropped += (self.data.len() + chunk.len() - self.cap) as u64;
            self.data.clear();
            self.data.extend(&chunk[chunk.len() - self.cap..]);
            return;
        }
        let overflow = (self.data.len() + chunk.len()).saturating_sub(self.cap);
        if overflow > 0 {
            self.data.drain(..overflow);
            self.dropped += overflow as u64;
        }
        self.data.extend(chunk);
    }

    fn into_parts(self) -> (Vec<u8>, u64) {
        (Vec::from(self.data), self.dropped)
    }
}

/// Final captured output of one attempt.
///
/// `dropped_*` counts bytes discarded by the bound; nonzero means the
/// matching buffer holds only the newest portion of the stream.
#[derive(Clone, Debug, Default)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub dropped_stdout: u64,
    pub dropped_stderr: u64,
}

impl CapturedOutput {
    pub(crate) fn from_buffers(stdout: OutputBuffer, stderr: OutputBuffer) -> Self {
        let (stdout, dropped_stdout) = stdout.into_parts();
        let (stderr, dropped_stderr) = stderr.into_parts();
        Self {
            stdout,
            stderr,
            dropped_stdout,
            dropped_stderr,
        }
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// True when either stream lost bytes to the bound.
    pub fn is_truncated(&self) -> bool {
        self.dropped_stdout > 0 || self.dropped_stderr > 0
    }
}
