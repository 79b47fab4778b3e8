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

//! Defining aliases
//!
//! The lexer consults an [`AliasSet`] when it reads a word in command
//! position. Aliases whose replacement text is currently on the input
//! stack are tracked by the input layer, not here, so removing an alias
//! while it is being read is safe: the entry is reference-counted and the
//! text keeps living until the input frame is popped.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Name-value pair that defines an alias
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Alias {
    /// Name matched against command words
    pub name: String,
    /// Text that substitutes the word
    pub replacement: String,
}

impl Alias {
    /// Whether the replacement ends in a blank, which makes the following
    /// word a candidate for alias substitution as well.
    #[must_use]
    pub fn ends_in_blank(&self) -> bool {
        self.replacement.ends_with([' ', '\t'])
    }
}

/// Wrapper of [`Alias`] for inserting into a hash set
///
/// The `Hash` and `PartialEq` implementations compare names only, so a
/// set of entries acts as a name-keyed map. The alias itself is behind an
/// `Rc` so the definition can outlive its removal from the set.
#[derive(Clone, Debug, Eq)]
pub struct HashEntry(pub Rc<Alias>);

impl HashEntry {
    /// Convenience constructor.
    pub fn new<N: Into<String>, R: Into<String>>(name: N, replacement: R) -> Self {
        HashEntry(Rc::new(Alias {
            name: name.into(),
            replacement: replacement.into(),
        }))
    }
}

impl PartialEq for HashEntry {
    fn eq(&self, other: &HashEntry) -> bool {
        self.0.name == other.0.name
    }
}

impl Hash for HashEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state)
    }
}

impl Borrow<str> for HashEntry {
    fn borrow(&self) -> &str {
        &self.0.name
    }
}

/// Collection of aliases
pub type AliasSet = HashSet<HashEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_acts_as_name_keyed_map() {
        let mut aliases = AliasSet::new();
        aliases.insert(HashEntry::new("ll", "ls -l"));
        let old = aliases.replace(HashEntry::new("ll", "ls -la")).unwrap();
        assert_eq!(old.0.replacement, "ls -l");
        assert_eq!(aliases.get("ll").unwrap().0.replacement, "ls -la");
        assert!(aliases.get("la").is_none());
    }

    #[test]
    fn trailing_blank_detection() {
        assert!(HashEntry::new("a", "echo ").0.ends_in_blank());
        assert!(HashEntry::new("a", "echo\t").0.ends_in_blank());
        assert!(!HashEntry::new("a", "echo").0.ends_in_blank());
    }
}
