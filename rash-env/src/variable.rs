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

//! Shell variables
//!
//! A [`VariableSet`] maps names to values and attribute flags. An entry
//! may exist without a value: `export foo` and `readonly foo` mark a name
//! whose value is yet to come, and such a name still reads as unset.
//!
//! Functions get local variables through frames: [`VariableSet::
//! push_frame`] opens one, [`make_local`](VariableSet::make_local)
//! captures a variable's pre-call state into it, and
//! [`pop_frame`](VariableSet::pop_frame) restores everything captured.
//! The special `local -` form additionally snapshots the option vector;
//! the frame carries it back to the caller on pop.

use crate::option::OptionSet;
use bitflags::bitflags;
use itertools::Itertools;
use std::collections::HashMap;
use std::ffi::CString;
use thiserror::Error;

bitflags! {
    /// Attribute flags of a variable
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct VarFlags: u8 {
        /// The variable is passed in the environment of executed commands.
        const EXPORTED = 1 << 0;
        /// The variable cannot be assigned or unset.
        const READONLY = 1 << 1;
    }
}

/// Value and attributes of one variable
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Variable {
    /// Value, or `None` for a flagged but unset name
    pub value: Option<Vec<u8>>,
    /// Attribute flags
    pub flags: VarFlags,
}

impl Variable {
    /// Whether the variable is exported.
    #[must_use]
    pub fn is_exported(&self) -> bool {
        self.flags.contains(VarFlags::EXPORTED)
    }

    /// Whether the variable is read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(VarFlags::READONLY)
    }
}

/// Error from assigning or unsetting a read-only variable
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("{name}: is read only")]
pub struct ReadOnlyError {
    /// Name of the variable
    pub name: String,
}

/// Saved state of variables local to one function call
#[derive(Clone, Debug, Default)]
struct LocalFrame {
    /// Pre-call state per captured name; `None` means the name was absent.
    saved: Vec<(String, Option<Variable>)>,
    /// Option vector snapshot taken by `local -`
    options: Option<OptionSet>,
}

/// Collection of variables
#[derive(Clone, Debug, Default)]
pub struct VariableSet {
    all: HashMap<String, Variable>,
    frames: Vec<LocalFrame>,
}

/// Whether a string is a valid variable name.
///
/// Names start with a letter or underscore and continue with letters,
/// digits, and underscores.
#[must_use]
pub fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a variable, or `None` if unset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.all.get(name)?.value.as_deref()
    }

    /// Returns a variable entry, including flagged-but-unset ones.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.all.get(name)
    }

    /// Assigns a value, adding the given flags to any existing ones.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if the variable is read-only.
    pub fn set(
        &mut self,
        name: &str,
        value: Vec<u8>,
        flags: VarFlags,
    ) -> Result<(), ReadOnlyError> {
        let entry = self.all.entry(name.to_owned()).or_default();
        if entry.is_read_only() {
            return Err(ReadOnlyError {
                name: name.to_owned(),
            });
        }
        entry.value = Some(value);
        entry.flags |= flags;
        Ok(())
    }

    /// Adds flags to a name without giving it a value.
    ///
    /// This is `export foo` or `readonly foo` for a currently unset `foo`:
    /// the flags stick, the name still reads as unset.
    pub fn set_flags(&mut self, name: &str, flags: VarFlags) {
        self.all.entry(name.to_owned()).or_default().flags |= flags;
    }

    /// Removes a variable.
    ///
    /// Returns whether the variable was set.
    ///
    /// # Errors
    ///
    /// Fails if the variable is read-only.
    pub fn unset(&mut self, name: &str) -> Result<bool, ReadOnlyError> {
        match self.all.get(name) {
            None => Ok(false),
            Some(var) if var.is_read_only() => Err(ReadOnlyError {
                name: name.to_owned(),
            }),
            Some(_) => Ok(self.all.remove(name).is_some_and(|v| v.value.is_some())),
        }
    }

    /// Opens a local-variable frame for a function call.
    pub fn push_frame(&mut self) {
        self.frames.push(LocalFrame::default());
    }

    /// Whether a local frame is open, i.e. a function is running.
    #[must_use]
    pub fn in_function(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Captures the current state of `name` into the innermost frame.
    ///
    /// The first capture of a name per frame wins; later ones are no-ops,
    /// so repeated `local x` declarations do not clobber the saved state.
    ///
    /// Has no effect when no frame is open (`local` outside a function is
    /// rejected before this point).
    pub fn make_local(&mut self, name: &str) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if frame.saved.iter().any(|(n, _)| n == name) {
            return;
        }
        let state = self.all.get(name).cloned();
        frame.saved.push((name.to_owned(), state));
        // A fresh local starts out unset, but keeps no flags from the
        // outer variable.
        if let Some(var) = self.all.get_mut(name) {
            *var = Variable::default();
        }
    }

    /// Records the option vector in the innermost frame (`local -`).
    ///
    /// Only the first snapshot per frame is kept.
    pub fn snapshot_options(&mut self, options: OptionSet) {
        if let Some(frame) = self.frames.last_mut() {
            frame.options.get_or_insert(options);
        }
    }

    /// Closes the innermost frame, restoring every captured variable.
    ///
    /// When `keep_exports` is set, a variable that was exported inside
    /// the function stays exported after restoration. Returns the option
    /// vector snapshot if `local -` took one.
    pub fn pop_frame(&mut self, keep_exports: bool) -> Option<OptionSet> {
        let frame = self.frames.pop()?;
        for (name, saved) in frame.saved {
            let exported_inside = self
                .all
                .get(&name)
                .is_some_and(Variable::is_exported);
            match saved {
                None => {
                    self.all.remove(&name);
                }
                Some(mut var) => {
                    if keep_exports && exported_inside {
                        var.flags |= VarFlags::EXPORTED;
                    }
                    self.all.insert(name, var);
                }
            }
        }
        frame.options
    }

    /// Builds the environment array for `execve`.
    ///
    /// Exported variables with a value become `name=value` entries;
    /// values containing a NUL byte cannot be represented and are
    /// skipped.
    #[must_use]
    pub fn environ(&self) -> Vec<CString> {
        self.all
            .iter()
            .filter(|(_, var)| var.is_exported())
            .filter_map(|(name, var)| {
                let value = var.value.as_ref()?;
                let mut entry = Vec::with_capacity(name.len() + 1 + value.len());
                entry.extend_from_slice(name.as_bytes());
                entry.push(b'=');
                entry.extend_from_slice(value);
                CString::new(entry).ok()
            })
            .collect()
    }

    /// All entries in name order, for the `set` and `export -p` listings.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.all
            .iter()
            .map(|(name, var)| (name.as_str(), var))
            .sorted_by(|a, b| a.0.cmp(b.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(is_name("x"));
        assert!(is_name("_private"));
        assert!(is_name("PATH"));
        assert!(is_name("v9_x"));
        assert!(!is_name(""));
        assert!(!is_name("9lives"));
        assert!(!is_name("a-b"));
        assert!(!is_name("a.b"));
    }

    #[test]
    fn set_then_get() {
        let mut set = VariableSet::new();
        set.set("foo", b"value".to_vec(), VarFlags::empty()).unwrap();
        assert_eq!(set.get("foo"), Some(&b"value"[..]));
        assert_eq!(set.get("bar"), None);
    }

    #[test]
    fn unset_removes() {
        let mut set = VariableSet::new();
        set.set("foo", b"v".to_vec(), VarFlags::empty()).unwrap();
        assert_eq!(set.unset("foo"), Ok(true));
        assert_eq!(set.get("foo"), None);
        assert_eq!(set.unset("foo"), Ok(false));
    }

    #[test]
    fn read_only_rejects_assignment_and_unset() {
        let mut set = VariableSet::new();
        set.set("ro", b"fixed".to_vec(), VarFlags::READONLY).unwrap();
        assert!(set.set("ro", b"other".to_vec(), VarFlags::empty()).is_err());
        assert!(set.unset("ro").is_err());
        // Value unchanged after the failures.
        assert_eq!(set.get("ro"), Some(&b"fixed"[..]));
    }

    #[test]
    fn export_flag_persists_across_assignment() {
        let mut set = VariableSet::new();
        set.set("e", b"1".to_vec(), VarFlags::EXPORTED).unwrap();
        set.set("e", b"2".to_vec(), VarFlags::empty()).unwrap();
        assert!(set.get_variable("e").unwrap().is_exported());
    }

    #[test]
    fn flagged_but_unset() {
        let mut set = VariableSet::new();
        set.set_flags("pending", VarFlags::EXPORTED);
        assert_eq!(set.get("pending"), None);
        assert!(set.get_variable("pending").unwrap().is_exported());
        // Exported-without-value names do not appear in the environment.
        assert!(set.environ().is_empty());
    }

    #[test]
    fn locals_restore_outer_value() {
        let mut set = VariableSet::new();
        set.set("x", b"1".to_vec(), VarFlags::empty()).unwrap();

        set.push_frame();
        set.make_local("x");
        assert_eq!(set.get("x"), None, "a fresh local starts unset");
        set.set("x", b"2".to_vec(), VarFlags::empty()).unwrap();
        assert_eq!(set.get("x"), Some(&b"2"[..]));
        set.pop_frame(false);

        assert_eq!(set.get("x"), Some(&b"1"[..]));
    }

    #[test]
    fn locals_restore_absence() {
        let mut set = VariableSet::new();
        set.push_frame();
        set.make_local("y");
        set.set("y", b"temp".to_vec(), VarFlags::empty()).unwrap();
        set.pop_frame(false);
        assert_eq!(set.get_variable("y"), None);
    }

    #[test]
    fn repeated_make_local_keeps_first_snapshot() {
        let mut set = VariableSet::new();
        set.set("x", b"outer".to_vec(), VarFlags::empty()).unwrap();
        set.push_frame();
        set.make_local("x");
        set.set("x", b"inner".to_vec(), VarFlags::empty()).unwrap();
        set.make_local("x");
        set.pop_frame(false);
        assert_eq!(set.get("x"), Some(&b"outer"[..]));
    }

    #[test]
    fn pop_frame_can_keep_exports() {
        let mut set = VariableSet::new();
        set.set("x", b"1".to_vec(), VarFlags::empty()).unwrap();
        set.push_frame();
        set.make_local("x");
        set.set("x", b"2".to_vec(), VarFlags::EXPORTED).unwrap();
        set.pop_frame(true);
        let var = set.get_variable("x").unwrap();
        assert_eq!(var.value.as_deref(), Some(&b"1"[..]));
        assert!(var.is_exported());
    }

    #[test]
    fn local_hyphen_round_trips_options() {
        use crate::option::ShellOption;
        let mut set = VariableSet::new();
        set.push_frame();
        let options = OptionSet::only(ShellOption::Errexit);
        set.snapshot_options(options);
        assert_eq!(set.pop_frame(false), Some(options));
    }

    #[test]
    fn environ_contains_exported_values() {
        let mut set = VariableSet::new();
        set.set("A", b"1".to_vec(), VarFlags::EXPORTED).unwrap();
        set.set("B", b"2".to_vec(), VarFlags::empty()).unwrap();
        let environ = set.environ();
        assert_eq!(environ.len(), 1);
        assert_eq!(environ[0].as_bytes(), b"A=1");
    }
}
