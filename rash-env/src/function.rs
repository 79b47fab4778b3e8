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

//! Shell functions
//!
//! Function bodies are shared by reference counting: a call in progress
//! holds its own handle to the body, so redefining or unsetting the
//! function while it runs leaves the running call unaffected and frees
//! the old body when the last holder drops it.

use rash_syntax::syntax::Node;
use std::collections::HashMap;
use std::rc::Rc;

/// Definition of a shell function
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    /// Name the function is called by
    pub name: String,
    /// Body of the function
    pub body: Rc<Node>,
}

/// Collection of functions, keyed by name
#[derive(Clone, Debug, Default)]
pub struct FunctionSet {
    entries: HashMap<String, Rc<Function>>,
}

impl FunctionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines or redefines a function.
    pub fn define(&mut self, name: impl Into<String>, body: Rc<Node>) {
        let name = name.into();
        let function = Rc::new(Function {
            name: name.clone(),
            body,
        });
        self.entries.insert(name, function);
    }

    /// Looks up a function.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rc<Function>> {
        self.entries.get(name)
    }

    /// Removes a function definition.
    ///
    /// Returns whether the function existed.
    pub fn unset(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Names of all defined functions.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
