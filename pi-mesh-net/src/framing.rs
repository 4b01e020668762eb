//! Newline framing
//!
//! Faces carry a plain byte stream; packets are newline-terminated lines.
//! [`LineFramer`] reassembles lines from arbitrary chunks and enforces a
//! maximum line length so a face that never sends `\n` cannot grow the
//! buffer without bound.

use alloc::vec::Vec;

use crate::{Error, Result};

/// Longest line accepted by default, terminator excluded
///
/// A Result line with every numeric field at `u32::MAX` is 75 bytes.
pub const DEFAULT_MAX_FRAME: usize = 128;

/// Reassembles newline-terminated frames from a byte stream
#[derive(Debug, Clone)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME)
    }
}

impl LineFramer {
    /// Create a framer accepting lines up to `max_len` bytes
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Append received bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    /// Bytes buffered but not yet framed
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, without its terminator
    ///
    /// An overlong line is reported once as [`Error::FrameTooLong`] and its
    /// remaining bytes are skipped up to the next newline.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                if !self.discarding && self.buf.len() > self.max_len {
                    let len = self.buf.len();
                    self.buf.clear();
                    self.discarding = true;
                    return Some(Err(Error::FrameTooLong {
                        len,
                        max: self.max_len,
                    }));
                }
                if self.discarding {
                    self.buf.clear();
                }
                return None;
            };

            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_len {
                return Some(Err(Error::FrameTooLong {
                    len: line.len(),
                    max: self.max_len,
                }));
            }
            return Some(Ok(line));
        }
    }
}
