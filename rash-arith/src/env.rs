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

//! Variable environment

use std::collections::HashMap;
use std::convert::Infallible;

/// Interface for accessing variables during evaluation
///
/// This crate does not store variables itself. The caller of
/// [`eval`](crate::eval) provides an implementation of this trait through
/// which identifiers in the expression are resolved and assigned.
pub trait Env {
    /// Error returned by variable access and assignment
    type Error;

    /// Returns the value of the named variable, or `None` if unset.
    ///
    /// The value is returned by value because some shell variables are
    /// materialized on lookup. Returning an error aborts the
    /// evaluation; the shell uses this to enforce `set -u`.
    fn get_variable(&self, name: &str) -> Result<Option<String>, Self::Error>;

    /// Assigns a new value to the named variable.
    fn assign_variable(&mut self, name: &str, value: String) -> Result<(), Self::Error>;
}

impl Env for HashMap<String, String> {
    type Error = Infallible;

    fn get_variable(&self, name: &str) -> Result<Option<String>, Infallible> {
        Ok(self.get(name).cloned())
    }

    fn assign_variable(&mut self, name: &str, value: String) -> Result<(), Infallible> {
        self.insert(name.to_owned(), value);
        Ok(())
    }
}
