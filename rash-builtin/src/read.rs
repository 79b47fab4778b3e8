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

//! The `read` built-in
//!
//! Reads one line from standard input byte by byte (so nothing beyond
//! the newline is consumed), handles backslash line continuation unless
//! `-r` is given, and splits the line into the named variables using
//! `$IFS`. The last variable receives the remainder of the line.

use crate::{builtin_error, Options};
use rash_env::builtin::Result;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::variable::{is_name, VarFlags};
use rash_env::Env;
use std::os::fd::BorrowedFd;

/// Reads one byte from standard input, retrying on `EINTR`.
fn read_byte() -> Option<u8> {
    let mut buf = [0u8; 1];
    loop {
        // SAFETY: descriptor 0 belongs to the shell.
        let fd = unsafe { BorrowedFd::borrow_raw(0) };
        match nix::unistd::read(fd, &mut buf) {
            Ok(0) => return None,
            Ok(_) => return Some(buf[0]),
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => return None,
        }
    }
}

/// Reads a logical line, applying backslash escapes unless `raw`.
///
/// Returns the line bytes (escaped bytes marked by position) and
/// whether end-of-file was hit before any byte.
fn read_line(raw: bool) -> (Vec<u8>, Vec<bool>, bool) {
    let mut line = Vec::new();
    let mut literal = Vec::new();
    let mut saw_any = false;
    loop {
        match read_byte() {
            None => return (line, literal, !saw_any),
            Some(b'\n') => return (line, literal, false),
            Some(b'\\') if !raw => {
                saw_any = true;
                match read_byte() {
                    None => return (line, literal, false),
                    // Escaped newline: line continuation.
                    Some(b'\n') => {}
                    Some(b) => {
                        line.push(b);
                        literal.push(true);
                    }
                }
            }
            Some(b) => {
                saw_any = true;
                line.push(b);
                literal.push(false);
            }
        }
    }
}

pub fn read(env: &mut Env, args: Vec<Field>) -> Result {
    let mut raw = false;
    let mut options = Options::new(&args);
    loop {
        match options.next("r") {
            Ok(Some('r')) => raw = true,
            Ok(Some(_)) => unreachable!("only r is accepted"),
            Ok(None) => break,
            Err(c) => builtin_error!(env, "read: -{c}: unknown option"),
        }
    }
    let names: Vec<String> = options
        .operands()
        .iter()
        .filter_map(|f| f.to_str().map(str::to_owned))
        .collect();
    if names.is_empty() {
        builtin_error!(env, "read: variable name expected");
    }
    for name in &names {
        if !is_name(name) {
            builtin_error!(env, "read: {name}: bad variable name");
        }
    }

    env.flush_outputs();
    let (line, literal, eof) = read_line(raw);

    // Split into the variables: each IFS hit fills the next one; the
    // last variable takes the rest of the line.
    let ifs = env.ifs();
    let ifs_ws: Vec<u8> = ifs
        .iter()
        .copied()
        .filter(|b| b" \t\n".contains(b))
        .collect();
    let is_sep = |i: usize| !literal.get(i).copied().unwrap_or(false) && ifs.contains(&line[i]);
    let is_ws = |i: usize| is_sep(i) && ifs_ws.contains(&line[i]);

    let mut i = 0;
    let mut values: Vec<Vec<u8>> = Vec::new();
    while values.len() < names.len() {
        // Leading IFS whitespace is skipped.
        while i < line.len() && is_ws(i) {
            i += 1;
        }
        if values.len() == names.len() - 1 {
            // Remainder, with trailing IFS whitespace trimmed.
            let mut end = line.len();
            while end > i && is_ws(end - 1) {
                end -= 1;
            }
            values.push(line[i..end].to_vec());
            break;
        }
        let mut field = Vec::new();
        while i < line.len() && !is_sep(i) {
            field.push(line[i]);
            i += 1;
        }
        if i < line.len() && is_sep(i) && !is_ws(i) {
            i += 1;
        }
        values.push(field);
    }

    for (name, value) in names.iter().zip(values) {
        if let Err(e) = env.set_var(name, value, VarFlags::empty()) {
            builtin_error!(env, "read: {e}");
        }
    }

    Ok(if eof {
        ExitStatus::FAILURE
    } else {
        ExitStatus::SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::fields;
    use rash_env::redir::dup2_raw;
    use std::io::{Seek, SeekFrom, Write};
    use std::os::fd::AsRawFd;

    // Standard input is process-global; serialize the tests.
    static STDIN_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Runs `read` with descriptor 0 temporarily fed from a buffer.
    fn with_stdin(input: &str, f: impl FnOnce() -> super::Result) -> super::Result {
        let _guard = STDIN_LOCK.lock().unwrap();
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(input.as_bytes()).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let saved = nix::unistd::dup(unsafe { BorrowedFd::borrow_raw(0) }).unwrap();
        dup2_raw(file.as_raw_fd(), 0).unwrap();
        let result = f();
        dup2_raw(saved.as_raw_fd(), 0).unwrap();
        result
    }

    #[test]
    fn reads_fields_into_variables() {
        let mut env = Env::new();
        let result = with_stdin("alpha beta  gamma\nnext\n", || {
            read(&mut env, fields(&["read", "a", "b"]))
        });
        assert_eq!(result, Ok(ExitStatus::SUCCESS));
        assert_eq!(env.variables.get("a"), Some(&b"alpha"[..]));
        assert_eq!(env.variables.get("b"), Some(&b"beta  gamma"[..]));
    }

    #[test]
    fn eof_returns_failure() {
        let mut env = Env::new();
        let result = with_stdin("", || read(&mut env, fields(&["read", "x"])));
        assert_eq!(result, Ok(ExitStatus::FAILURE));
        assert_eq!(env.variables.get("x"), Some(&b""[..]));
    }

    #[test]
    fn backslash_continuation_unless_raw() {
        let mut env = Env::new();
        let result = with_stdin("one\\\ntwo\n", || {
            read(&mut env, fields(&["read", "x"]))
        });
        assert_eq!(result, Ok(ExitStatus::SUCCESS));
        assert_eq!(env.variables.get("x"), Some(&b"onetwo"[..]));

        let result = with_stdin("one\\ttwo\n", || {
            read(&mut env, fields(&["read", "-r", "x"]))
        });
        assert_eq!(result, Ok(ExitStatus::SUCCESS));
        assert_eq!(env.variables.get("x"), Some(&b"one\\ttwo"[..]));
    }

    #[test]
    fn requires_a_variable_name() {
        let mut env = Env::new();
        assert_eq!(
            read(&mut env, fields(&["read"])),
            Err(rash_env::semantics::Divert::Error)
        );
    }
}
