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

//! Redirection save stack
//!
//! User-visible descriptors are 0 through 9. Before a redirection
//! clobbers one of them, the previous state is recorded in the current
//! frame: either the descriptor was closed, or it is moved to a copy at
//! 10 or above with close-on-exec set. Popping the frame undoes every
//! redirection of the corresponding command; discarding it instead makes
//! them permanent (the `exec` built-in).

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};
use std::os::fd::{BorrowedFd, RawFd};

/// Number of user-visible descriptors
pub const USER_FDS: usize = 10;
/// Saved copies live at this descriptor or above.
pub const SAVE_FD_BASE: RawFd = 10;

/// Recorded prior state of one descriptor
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SavedFd {
    /// Not touched by this frame
    #[default]
    Empty,
    /// Was closed; restore by closing
    Closed,
    /// Redirected onto itself; restore is a no-op
    ReallyClosed,
    /// Moved to a close-on-exec copy; restore by moving back
    Moved(RawFd),
}

/// Saved states of one command's redirections
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RedirFrame {
    slots: [SavedFd; USER_FDS],
}

/// Stack of redirection frames
#[derive(Clone, Debug, Default)]
pub struct RedirStack {
    frames: Vec<RedirFrame>,
}

fn close_raw(fd: RawFd) {
    // SAFETY: plain close of a descriptor this process owns.
    unsafe { libc::close(fd) };
}

/// `dup2` with the usual retry, as a thin wrapper.
pub fn dup2_raw(from: RawFd, to: RawFd) -> Result<(), Errno> {
    loop {
        // SAFETY: both descriptors are plain integers owned by us.
        let rc = unsafe { libc::dup2(from, to) };
        if rc >= 0 {
            return Ok(());
        }
        let errno = Errno::last();
        if errno != Errno::EINTR {
            return Err(errno);
        }
    }
}

impl RedirStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a frame for one command's redirections.
    pub fn push_frame(&mut self) {
        self.frames.push(RedirFrame::default());
    }

    /// Number of open frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Records the current state of `fd` in the innermost frame before
    /// it is redirected.
    ///
    /// Only the first save per frame and descriptor counts. Without an
    /// open frame this is a no-op (redirections applied in a child that
    /// will exec are never restored).
    pub fn save(&mut self, fd: RawFd) -> Result<(), Errno> {
        let Ok(slot) = usize::try_from(fd) else {
            return Ok(());
        };
        if slot >= USER_FDS {
            return Ok(());
        }
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        if frame.slots[slot] != SavedFd::Empty {
            return Ok(());
        }
        // SAFETY: borrowing a descriptor we are about to duplicate.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        frame.slots[slot] = match fcntl(borrowed, FcntlArg::F_DUPFD_CLOEXEC(SAVE_FD_BASE)) {
            Ok(copy) => SavedFd::Moved(copy),
            Err(Errno::EBADF) => SavedFd::Closed,
            Err(e) => return Err(e),
        };
        Ok(())
    }

    /// Marks a descriptor as redirected onto itself, so the restore pass
    /// leaves it alone.
    pub fn mark_self(&mut self, fd: RawFd) {
        if let Ok(slot) = usize::try_from(fd) {
            if slot < USER_FDS {
                if let Some(frame) = self.frames.last_mut() {
                    if frame.slots[slot] == SavedFd::Empty {
                        frame.slots[slot] = SavedFd::ReallyClosed;
                    }
                }
            }
        }
    }

    /// Closes the innermost frame, restoring every saved descriptor.
    pub fn pop_frame_restore(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for (slot, saved) in frame.slots.into_iter().enumerate() {
            let fd = slot as RawFd;
            match saved {
                SavedFd::Empty | SavedFd::ReallyClosed => {}
                SavedFd::Closed => close_raw(fd),
                SavedFd::Moved(copy) => {
                    let _ = dup2_raw(copy, fd);
                    close_raw(copy);
                }
            }
        }
    }

    /// Closes the innermost frame, keeping the redirections in place and
    /// releasing the saved copies.
    pub fn pop_frame_discard(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for saved in frame.slots {
            if let SavedFd::Moved(copy) = saved {
                close_raw(copy);
            }
        }
    }

    /// Drops all frames, restoring innermost-first (error unwind).
    pub fn unwind_all(&mut self) {
        while self.depth() > 0 {
            self.pop_frame_restore();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};
    use std::os::fd::AsRawFd;

    fn read_all(file: &std::fs::File) -> String {
        let mut clone = file.try_clone().unwrap();
        clone.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        clone.read_to_string(&mut out).unwrap();
        out
    }

    fn write_fd(fd: RawFd, bytes: &[u8]) {
        // SAFETY: writing through a descriptor the test keeps open.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        nix::unistd::write(borrowed, bytes).unwrap();
    }

    #[test]
    fn redirect_and_restore_a_user_fd() {
        let original = tempfile::tempfile().unwrap();
        let replacement = tempfile::tempfile().unwrap();
        let target: RawFd = original.as_raw_fd();

        let mut stack = RedirStack::new();
        stack.push_frame();
        stack.save(target).expect("save");
        dup2_raw(replacement.as_raw_fd(), target).expect("dup2");

        // Writing through the target now reaches the replacement.
        write_fd(target, b"redirected");
        assert_eq!(read_all(&replacement), "redirected");

        stack.pop_frame_restore();
        write_fd(target, b"back");
        assert_eq!(read_all(&original), "back");
        assert_eq!(read_all(&replacement), "redirected");
    }

    #[test]
    fn closed_slot_restores_by_closing() {
        let mut stack = RedirStack::new();
        stack.push_frame();
        // Descriptor 9 is almost surely closed in the test process.
        let probe: RawFd = 9;
        stack.save(probe).expect("save");
        stack.pop_frame_restore();
    }

    #[test]
    fn saves_only_first_state_per_frame() {
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();
        let mut stack = RedirStack::new();
        stack.push_frame();
        stack.save(fd).unwrap();
        let first = stack.frames.last().unwrap().slots[fd as usize];
        stack.save(fd).unwrap();
        assert_eq!(stack.frames.last().unwrap().slots[fd as usize], first);
        stack.pop_frame_restore();
    }

    #[test]
    fn mark_self_is_a_restore_noop() {
        let mut stack = RedirStack::new();
        stack.push_frame();
        stack.mark_self(5);
        assert_eq!(stack.frames.last().unwrap().slots[5], SavedFd::ReallyClosed);
        stack.pop_frame_restore();
    }
}
