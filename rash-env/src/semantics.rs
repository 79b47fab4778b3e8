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

//! Types used in the whole shell to describe execution results
//!
//! The evaluator threads a [`Result`] through every step: `Ok(value)`
//! means execution goes on normally, and `Err(divert)` requests a
//! non-local transfer of control such as an error unwind, a loop `break`,
//! or an orderly exit. This replaces the original implementation's
//! `setjmp`/`longjmp` discipline with an explicit channel the `?`
//! operator propagates.

use nix::sys::wait::WaitStatus;
use std::ffi::CString;
use std::fmt::Display;

/// Number that summarizes how a command ended
///
/// The value is in the range 0 through 255 when observed via `$?`; the
/// constructor masks wider values the same way `exit` does.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExitStatus(pub i32);

impl ExitStatus {
    /// Status of a command that did what was asked
    pub const SUCCESS: ExitStatus = ExitStatus(0);
    /// Status of a command that failed
    pub const FAILURE: ExitStatus = ExitStatus(1);
    /// Status for shell-detected errors (usage, syntax, expansion)
    pub const ERROR: ExitStatus = ExitStatus(2);
    /// Command found but could not be executed
    pub const NOT_EXECUTABLE: ExitStatus = ExitStatus(126);
    /// Command not found
    pub const NOT_FOUND: ExitStatus = ExitStatus(127);

    /// Whether the status is zero.
    #[must_use]
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Status reported for a process killed by the given signal number.
    #[must_use]
    pub fn from_signal(signal: i32) -> Self {
        ExitStatus(128 + signal)
    }
}

impl Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i32> for ExitStatus {
    fn from(value: i32) -> Self {
        ExitStatus(value & 0xFF)
    }
}

impl From<WaitStatus> for ExitStatus {
    /// Converts a wait status to the value `$?` reports.
    ///
    /// Exited processes report their exit code; signaled and stopped
    /// processes report `128 + signal`.
    fn from(status: WaitStatus) -> Self {
        match status {
            WaitStatus::Exited(_, code) => ExitStatus(code & 0xFF),
            WaitStatus::Signaled(_, signal, _) => ExitStatus::from_signal(signal as i32),
            WaitStatus::Stopped(_, signal) => ExitStatus::from_signal(signal as i32),
            _ => ExitStatus::SUCCESS,
        }
    }
}

/// Word that has gone through expansion
///
/// Fields are byte strings: the shell is eight-bit clean, and command
/// arguments or variable values may contain bytes that are not valid
/// UTF-8.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Field {
    /// Value of the field
    pub value: Vec<u8>,
}

impl Field {
    /// Creates a field from anything byte-like.
    pub fn new<B: Into<Vec<u8>>>(value: B) -> Self {
        Field {
            value: value.into(),
        }
    }

    /// The field value as UTF-8 text, if it is valid UTF-8.
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// The field value for an `exec` argument vector.
    ///
    /// Fails if the value contains a NUL byte, which cannot be passed
    /// through `execve`.
    pub fn to_c_string(&self) -> std::result::Result<CString, std::ffi::NulError> {
        CString::new(self.value.clone())
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::new(value.as_bytes().to_vec())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::new(value.into_bytes())
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        String::from_utf8_lossy(&self.value).fmt(f)
    }
}

/// Request for a non-local transfer of control
///
/// A `Divert` travels up the evaluator as the `Err` side of [`Result`]
/// until some frame handles it: loops consume `Break`/`Continue`, function
/// calls consume `Return`, the read-eval loop consumes `Interrupt` and
/// `Error`, and `Exit` terminates the shell after the exit trap.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Divert {
    /// Unwind caused by a SIGINT delivery
    Interrupt,
    /// Unwind caused by a shell error
    ///
    /// The diagnostic has already been printed and the exit status has
    /// been set when this value is produced.
    Error,
    /// Orderly termination of the shell
    ///
    /// The final status is in `Env::exit_status`.
    Exit,
    /// `break n`
    Break {
        /// Remaining number of loops to break out of, counting this one
        count: usize,
    },
    /// `continue n`
    Continue {
        /// Remaining number of loops to skip out of, counting this one
        count: usize,
    },
    /// `return` from a function or dot script
    Return,
}

/// Result of a step of execution
pub type Result<T = ()> = std::result::Result<T, Divert>;
