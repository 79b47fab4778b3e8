// This file is part of rash, a POSIX-compatible shell.
// Copyright (C) 2024 The rash authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Buffered output sinks
//!
//! The shell writes through two sinks, one on standard output and one on
//! standard error. Output accumulates in a buffer and is written out with
//! a write-all-or-set-error contract: short writes are continued,
//! `EINTR` is retried, and any real failure latches a sticky error flag
//! that the caller checks once per command rather than per byte.
//!
//! After `fork`, child code must call [`Output::clear`] on inherited
//! sinks so buffered bytes are not flushed twice.

use nix::errno::Errno;
use nix::unistd::write;
use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

/// Buffered output sink over a file descriptor
#[derive(Debug)]
pub struct Output {
    fd: RawFd,
    buf: Vec<u8>,
    error: bool,
}

impl Output {
    /// Creates a sink writing to the given descriptor.
    ///
    /// The descriptor is borrowed, not owned: dropping the sink does not
    /// close it.
    pub fn new(fd: RawFd) -> Self {
        Output {
            fd,
            buf: Vec::new(),
            error: false,
        }
    }

    /// The descriptor this sink writes to.
    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Appends bytes to the buffer.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends text to the buffer.
    pub fn push_str(&mut self, text: &str) {
        self.push_bytes(text.as_bytes());
    }

    /// Appends one byte to the buffer.
    pub fn push_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Writes the whole buffer to the descriptor.
    ///
    /// On failure the unwritten bytes are discarded and the sticky error
    /// flag is set; use [`take_error`](Self::take_error) to observe it.
    pub fn flush(&mut self) {
        let mut rest: &[u8] = &self.buf;
        while !rest.is_empty() {
            // SAFETY: the fd is owned by the calling process for the
            // lifetime of the shell's standard streams.
            let fd = unsafe { BorrowedFd::borrow_raw(self.fd) };
            match write(fd.as_fd(), rest) {
                Ok(n) => rest = &rest[n..],
                Err(Errno::EINTR) => continue,
                Err(_) => {
                    self.error = true;
                    break;
                }
            }
        }
        self.buf.clear();
    }

    /// Discards buffered bytes and the error flag without writing.
    ///
    /// Post-fork children call this on the sinks they inherit.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.error = false;
    }

    /// Whether any bytes are waiting to be written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Returns and clears the sticky error flag.
    pub fn take_error(&mut self) -> bool {
        std::mem::replace(&mut self.error, false)
    }
}

impl fmt::Write for Output {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

impl AsRawFd for Output {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::io::{Read, Seek, SeekFrom};

    #[test]
    fn buffered_until_flush() {
        let file = tempfile::tempfile().unwrap();
        let mut out = Output::new(file.as_raw_fd());
        out.push_str("hello ");
        out.push_bytes(b"world");
        out.push_byte(b'\n');
        assert!(out.is_dirty());

        let mut contents = String::new();
        let mut reader = file.try_clone().unwrap();
        reader.seek(SeekFrom::Start(0)).unwrap();
        reader.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "");

        out.flush();
        assert!(!out.is_dirty());
        assert!(!out.take_error());

        reader.seek(SeekFrom::Start(0)).unwrap();
        contents.clear();
        reader.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello world\n");
    }

    #[test]
    fn formatted_output() {
        let file = tempfile::tempfile().unwrap();
        let mut out = Output::new(file.as_raw_fd());
        write!(out, "{}: line {}", "rash", 42).unwrap();
        out.flush();

        let mut reader = file.try_clone().unwrap();
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        reader.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "rash: line 42");
    }

    #[test]
    fn write_error_is_sticky_until_taken() {
        // Descriptor -1 is always invalid.
        let mut out = Output::new(-1);
        out.push_str("doomed");
        out.flush();
        assert!(out.take_error());
        assert!(!out.take_error());
    }

    #[test]
    fn clear_discards_pending_bytes() {
        let file = tempfile::tempfile().unwrap();
        let mut out = Output::new(file.as_raw_fd());
        out.push_str("must not appear");
        out.clear();
        out.flush();

        let mut reader = file.try_clone().unwrap();
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        reader.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "");
    }
}
