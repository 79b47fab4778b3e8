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

//! Applying redirections
//!
//! Targets are expanded (one field, no splitting), files are opened with
//! the mode the operator dictates, and descriptors are moved under the
//! protection of the environment's save stack so the shell can put
//! everything back when the command finishes.
//!
//! Here-document bodies up to the pipe capacity are written into a pipe
//! directly; larger bodies get a writer child so the shell cannot
//! deadlock against its own pipe.

use crate::expand::{expand_heredoc, expand_word};
use rash_env::redir::dup2_raw;
use rash_env::semantics::Result;
use rash_env::{interrupt, option::ShellOption, Env};
use rash_syntax::syntax::{FileMode, Redir, RedirKind};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;

/// Largest here-document written into the pipe without a helper child.
const PIPESIZE: usize = 4096;

/// Applies a list of redirections.
///
/// With `save` set, prior descriptor states are recorded in the
/// innermost frame of the save stack, which the caller must have pushed;
/// without it (a child that is about to exec) nothing is saved.
pub fn apply_redirs(env: &mut Env, redirs: &[Redir], save: bool) -> Result<()> {
    for redir in redirs {
        apply_one(env, redir, save)?;
    }
    Ok(())
}

fn apply_one(env: &mut Env, redir: &Redir, save: bool) -> Result<()> {
    let fd = redir.fd;
    match &redir.kind {
        RedirKind::File { mode, target } => {
            let name = expand_word(env, target)?;
            let opened = open_file(env, *mode, &name.value)?;
            move_fd(env, opened, fd, save);
        }
        RedirKind::DupIn { target } | RedirKind::DupOut { target } => {
            let word = expand_word(env, target)?;
            if word.value == b"-" {
                save_slot(env, fd, save);
                // SAFETY: closing a user-visible descriptor on request.
                unsafe { libc::close(fd) };
                return Ok(());
            }
            let source: RawFd = match word.to_str().and_then(|s| s.parse().ok()) {
                Some(n) => n,
                None => {
                    return env.sh_error(format_args!(
                        "{}: bad file descriptor",
                        String::from_utf8_lossy(&word.value)
                    ));
                }
            };
            if source == fd {
                env.redir_stack.mark_self(fd);
                return Ok(());
            }
            save_slot(env, fd, save);
            if let Err(e) = dup2_raw(source, fd) {
                return env.sh_error(format_args!("{source}: cannot duplicate: {e}"));
            }
        }
        RedirKind::Here { doc } => {
            let body = if doc.expand {
                expand_heredoc(env, doc.body())?
            } else {
                doc.body().text.clone()
            };
            let opened = here_fd(env, &body)?;
            move_fd(env, opened, fd, save);
        }
    }
    Ok(())
}

fn save_slot(env: &mut Env, fd: RawFd, save: bool) {
    if save {
        let _critical = interrupt::CriticalSection::enter();
        let _ = env.redir_stack.save(fd);
    }
}

/// Moves a freshly opened descriptor onto the target number.
fn move_fd(env: &mut Env, opened: RawFd, target: RawFd, save: bool) {
    if opened == target {
        // The open happened to land on the target; record that the slot
        // is ours now.
        if save {
            env.redir_stack.mark_self(target);
        }
        return;
    }
    save_slot(env, target, save);
    let _ = dup2_raw(opened, target);
    // SAFETY: closing the temporary descriptor we just duplicated.
    unsafe { libc::close(opened) };
}

fn open_file(env: &mut Env, mode: FileMode, name: &[u8]) -> Result<RawFd> {
    // Save the slot before opening so an open that lands directly on a
    // closed target descriptor is already accounted for.
    let mut options = std::fs::OpenOptions::new();
    match mode {
        FileMode::In => {
            options.read(true);
        }
        FileMode::Out if env.options.contains(ShellOption::Noclobber) => {
            options.write(true).create_new(true);
        }
        FileMode::Out | FileMode::Clobber => {
            options.write(true).create(true).truncate(true);
        }
        FileMode::Append => {
            options.write(true).create(true).append(true);
        }
        FileMode::InOut => {
            options.read(true).write(true).create(true);
        }
    }
    options.mode(0o666);
    let path = std::ffi::OsStr::from_bytes(name);
    match options.open(path) {
        Ok(file) => Ok(file.into_raw_fd()),
        Err(e) if mode == FileMode::Out && e.kind() == std::io::ErrorKind::AlreadyExists => env
            .sh_error(format_args!(
                "cannot create {}: file exists",
                String::from_utf8_lossy(name)
            )),
        Err(e) => {
            let verb = match mode {
                FileMode::In => "open",
                _ => "create",
            };
            env.sh_error(format_args!(
                "cannot {verb} {}: {e}",
                String::from_utf8_lossy(name)
            ))
        }
    }
}

/// Produces the read side of a pipe holding a here-document body.
fn here_fd(env: &mut Env, body: &[u8]) -> Result<RawFd> {
    use nix::unistd::ForkResult;

    let (read_end, write_end) = match nix::unistd::pipe() {
        Ok(ends) => ends,
        Err(e) => return env.sh_error(format_args!("cannot create pipe: {e}")),
    };
    if body.len() <= PIPESIZE {
        let _ = write_all(write_end.as_raw_fd(), body);
        drop(write_end);
        return Ok(read_end.into_raw_fd());
    }

    // Too big for the pipe buffer: a writer child feeds it.
    env.flush_outputs();
    // SAFETY: the child only writes and exits.
    match unsafe { nix::unistd::fork() } {
        Ok(ForkResult::Child) => {
            drop(read_end);
            interrupt::reset();
            let _ = write_all(write_end.as_raw_fd(), body);
            // SAFETY: terminating the writer child.
            unsafe { libc::_exit(0) }
        }
        Ok(ForkResult::Parent { .. }) => {
            // The writer is not part of any job; it exits on its own and
            // is reaped with the other children.
            drop(write_end);
            Ok(read_end.into_raw_fd())
        }
        Err(e) => env.sh_error(format_args!("cannot fork: {e}")),
    }
}

fn write_all(fd: RawFd, mut bytes: &[u8]) -> std::io::Result<()> {
    use std::os::fd::BorrowedFd;
    while !bytes.is_empty() {
        // SAFETY: the descriptor stays open for the duration.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        match nix::unistd::write(borrowed, bytes) {
            Ok(n) => bytes = &bytes[n..],
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(std::io::Error::from(e)),
        }
    }
    Ok(())
}
