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

//! Shell options
//!
//! The option vector is the historical seventeen-entry set. Most options
//! have a single-letter form usable on the command line and with `set`;
//! all have a long name for `-o`/`+o`. The whole vector is a compact
//! [`EnumSet`], which makes the `local -` save/restore and the `$-`
//! expansion cheap copies.

use enumset::{EnumSet, EnumSetType};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Individual shell option
#[derive(Debug, Display, EnumIter, EnumSetType, EnumString, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum ShellOption {
    /// `-e`: exit on the failure of an untested command
    Errexit,
    /// `-f`: disable pathname expansion
    Noglob,
    /// `-I`: ignore end-of-file on interactive input
    Ignoreeof,
    /// `-i`: the shell is interactive
    Interactive,
    /// `-m`: job control
    Monitor,
    /// `-n`: read commands but do not execute them
    Noexec,
    /// `-s`: read commands from standard input
    Stdin,
    /// `-x`: trace commands before execution
    Xtrace,
    /// `-v`: echo input lines as they are read
    Verbose,
    /// `-V`: vi-style line editing
    Vi,
    /// `-E`: emacs-style line editing
    Emacs,
    /// `-C`: do not clobber existing files with `>`
    Noclobber,
    /// `-a`: export every assigned variable
    Allexport,
    /// `-b`: report background job completion immediately
    Notify,
    /// `-u`: expanding an unset parameter is an error
    Nounset,
    /// no letter: do not record function definitions in history
    Nolog,
    /// no letter: internal debug output
    Debug,
}

impl ShellOption {
    /// The single-letter form of this option, if it has one.
    #[must_use]
    pub fn letter(self) -> Option<char> {
        use ShellOption::*;
        Some(match self {
            Errexit => 'e',
            Noglob => 'f',
            Ignoreeof => 'I',
            Interactive => 'i',
            Monitor => 'm',
            Noexec => 'n',
            Stdin => 's',
            Xtrace => 'x',
            Verbose => 'v',
            Vi => 'V',
            Emacs => 'E',
            Noclobber => 'C',
            Allexport => 'a',
            Notify => 'b',
            Nounset => 'u',
            Nolog | Debug => return None,
        })
    }

    /// Looks an option up by its single-letter form.
    #[must_use]
    pub fn from_letter(letter: char) -> Option<Self> {
        Self::iter().find(|option| option.letter() == Some(letter))
    }
}

/// The shell's option vector
pub type OptionSet = EnumSet<ShellOption>;

/// Formats the active single-letter options, the value of `$-`.
#[must_use]
pub fn option_letters(options: OptionSet) -> String {
    options.iter().filter_map(ShellOption::letter).collect()
}
