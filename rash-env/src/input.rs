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

//! File-descriptor input source
//!
//! [`FdReader`] adapts a raw descriptor to [`std::io::Read`] for the
//! input stack, with the retry behavior script input needs: `EINTR` is
//! retried after noting any pending signal, and a descriptor that turns
//! out to be non-blocking is switched back to blocking rather than
//! spinning on `EAGAIN`.

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::io::Read;
use std::os::fd::{BorrowedFd, RawFd};

/// Reader over a borrowed file descriptor
#[derive(Debug)]
pub struct FdReader {
    fd: RawFd,
}

impl FdReader {
    /// Creates a reader. The descriptor is borrowed: dropping the reader
    /// does not close it.
    pub fn new(fd: RawFd) -> Self {
        FdReader { fd }
    }

    fn fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the shell keeps its input descriptors open for the
        // lifetime of the input frame that reads them.
        unsafe { BorrowedFd::borrow_raw(self.fd) }
    }

    /// Clears `O_NONBLOCK` on the descriptor.
    fn make_blocking(&self) -> nix::Result<()> {
        let flags = OFlag::from_bits_retain(fcntl(self.fd(), FcntlArg::F_GETFL)?);
        if flags.contains(OFlag::O_NONBLOCK) {
            fcntl(self.fd(), FcntlArg::F_SETFL(flags & !OFlag::O_NONBLOCK))?;
        }
        Ok(())
    }
}

impl Read for FdReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            match nix::unistd::read(self.fd(), buf) {
                Ok(n) => return Ok(n),
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => {
                    // Someone left our stdin non-blocking.
                    if self.make_blocking().is_err() {
                        return Err(std::io::Error::from(Errno::EAGAIN));
                    }
                }
                Err(errno) => return Err(std::io::Error::from(errno)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};
    use std::os::fd::AsRawFd;

    #[test]
    fn reads_from_descriptor() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"echo ok\n").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut reader = FdReader::new(file.as_raw_fd());
        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"echo ok\n");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn invalid_descriptor_reports_error() {
        let mut reader = FdReader::new(-1);
        let mut buf = [0u8; 4];
        assert!(reader.read(&mut buf).is_err());
    }
}
