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

//! Type of built-in utilities
//!
//! Built-ins run in-process against `&mut Env`. The implementations live
//! in their own crate; the environment only knows the dispatch type, so
//! the evaluator can look up and call built-ins without depending on
//! them.

use crate::semantics::{Divert, ExitStatus, Field};
use crate::Env;

/// Classification of a built-in
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BuiltinKind {
    /// POSIX special built-in: assignment-persistent, and an error in it
    /// aborts the surrounding script
    Special,
    /// Ordinary built-in, found before the PATH search
    Regular,
}

/// Result of a built-in: an exit status, or a divert such as the one
/// `exit` or `break` produces.
pub type Result = std::result::Result<ExitStatus, Divert>;

/// Function implementing a built-in
///
/// `fields` is the argument vector including the command name in
/// `fields[0]`.
pub type Main = fn(&mut Env, Vec<Field>) -> Result;

/// A built-in utility
#[derive(Clone, Copy, Debug)]
pub struct Builtin {
    pub kind: BuiltinKind,
    pub execute: Main,
}

impl Builtin {
    #[must_use]
    pub fn is_special(&self) -> bool {
        self.kind == BuiltinKind::Special
    }
}
