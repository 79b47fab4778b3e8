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

//! Shell execution environment
//!
//! [`Env`] gathers the whole interpreter state: variables, functions,
//! aliases, options, jobs, traps, the transient-string arena, and the
//! output sinks. The command loop owns one `Env`; the evaluator and the
//! built-ins take `&mut Env`.

pub mod arena;
pub mod builtin;
pub mod function;
pub mod input;
pub mod interrupt;
pub mod job;
pub mod option;
pub mod output;
pub mod redir;
pub mod semantics;
pub mod trap;
pub mod variable;

use crate::arena::Arena;
use crate::builtin::Builtin;
use crate::function::FunctionSet;
use crate::job::JobSet;
use crate::option::{OptionSet, ShellOption};
use crate::output::Output;
use crate::semantics::{Divert, ExitStatus};
use crate::trap::TrapSet;
use crate::variable::{ReadOnlyError, VarFlags, VariableSet};
use nix::unistd::Pid;
use rash_syntax::alias::AliasSet;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Remembered location of an external command (`hash`)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CachedCmd {
    /// Full path of the executable
    pub path: Vec<u8>,
    /// Index of the `$PATH` element it was found under
    pub index: usize,
}

/// The interpreter state
#[derive(Debug)]
pub struct Env {
    /// Region allocator for transient strings
    pub arena: Arena,
    /// Shell variables
    pub variables: VariableSet,
    /// Shell functions
    pub functions: FunctionSet,
    /// Aliases, consulted by the parser
    pub aliases: AliasSet,
    /// Option vector
    pub options: OptionSet,
    /// Job table
    pub jobs: JobSet,
    /// Trap actions and recorded signals
    pub traps: TrapSet,
    /// Built-in utilities by name
    pub builtins: HashMap<&'static str, Builtin>,
    /// `$?`
    pub exit_status: ExitStatus,
    /// Exit status of the last command substitution
    pub back_exit_status: ExitStatus,
    /// Positional parameters (`$1`…)
    pub positional: Vec<Vec<u8>>,
    /// `$0`
    pub arg0: String,
    /// Line number of the command being executed (`$LINENO`)
    pub lineno: u64,
    /// `$$`: the main shell's process ID, stable across subshells
    pub shell_pid: Pid,
    /// `$PPID`
    pub ppid: Pid,
    /// Cached `$PATH` lookups
    pub cmd_cache: HashMap<String, CachedCmd>,
    /// Buffered standard output
    pub out1: Output,
    /// Buffered standard error
    pub out2: Output,
    /// Redirection save stack
    pub redir_stack: redir::RedirStack,
    /// Nesting depth of function calls
    pub fn_depth: usize,
    /// This process is a forked child of the main shell
    pub in_subshell: bool,
    /// A trap action is running (suppresses nested trap dispatch)
    pub running_trap: bool,
    /// `getopts` resumes at this argument index
    pub getopts_next: usize,
    /// Byte offset within the grouped option argument `getopts` is at
    pub getopts_offset: usize,
}

impl Env {
    pub fn new() -> Self {
        Env {
            arena: Arena::new(),
            variables: VariableSet::new(),
            functions: FunctionSet::new(),
            aliases: AliasSet::new(),
            options: OptionSet::empty(),
            jobs: JobSet::new(),
            traps: TrapSet::new(),
            builtins: HashMap::new(),
            exit_status: ExitStatus::SUCCESS,
            back_exit_status: ExitStatus::SUCCESS,
            positional: Vec::new(),
            arg0: "rash".to_owned(),
            lineno: 0,
            shell_pid: nix::unistd::getpid(),
            ppid: nix::unistd::getppid(),
            cmd_cache: HashMap::new(),
            out1: Output::new(1),
            out2: Output::new(2),
            redir_stack: redir::RedirStack::new(),
            fn_depth: 0,
            in_subshell: false,
            running_trap: false,
            getopts_next: 1,
            getopts_offset: 0,
        }
    }

    /// Whether the shell is interactive.
    #[must_use]
    pub fn interactive(&self) -> bool {
        self.options.contains(ShellOption::Interactive)
    }

    /// Whether job control is active.
    #[must_use]
    pub fn job_control(&self) -> bool {
        self.options.contains(ShellOption::Monitor)
    }

    /// The field separator set, `$IFS` or its default.
    #[must_use]
    pub fn ifs(&self) -> Vec<u8> {
        self.variables
            .get("IFS")
            .map_or_else(|| b" \t\n".to_vec(), <[u8]>::to_vec)
    }

    /// Looks a variable up, materializing the dynamic ones.
    ///
    /// `LINENO` is formatted from the current line number on every
    /// lookup, so scripts can read it at any statement.
    #[must_use]
    pub fn lookup_var(&self, name: &str) -> Option<Vec<u8>> {
        if name == "LINENO" {
            return Some(self.lineno.to_string().into_bytes());
        }
        self.variables.get(name).map(<[u8]>::to_vec)
    }

    /// Assigns a variable, honoring `allexport` and running the
    /// variable's hook.
    pub fn set_var(
        &mut self,
        name: &str,
        value: Vec<u8>,
        mut flags: VarFlags,
    ) -> Result<(), ReadOnlyError> {
        let _critical = interrupt::CriticalSection::enter();
        if self.options.contains(ShellOption::Allexport) {
            flags |= VarFlags::EXPORTED;
        }
        let old_path = (name == "PATH").then(|| self.variables.get("PATH").map(<[u8]>::to_vec));
        self.variables.set(name, value, flags)?;
        match name {
            "PATH" => {
                let old = old_path.flatten();
                let new = self.variables.get("PATH").map(<[u8]>::to_vec);
                self.path_changed(old.as_deref(), new.as_deref());
            }
            "OPTIND" => {
                let parsed = self
                    .variables
                    .get("OPTIND")
                    .and_then(|v| std::str::from_utf8(v).ok())
                    .and_then(|v| v.trim().parse::<usize>().ok());
                self.getopts_next = parsed.unwrap_or(1);
                self.getopts_offset = 0;
            }
            _ => {}
        }
        Ok(())
    }

    /// Removes a variable, running the hook for `PATH`.
    pub fn unset_var(&mut self, name: &str) -> Result<bool, ReadOnlyError> {
        let _critical = interrupt::CriticalSection::enter();
        let was_set = self.variables.unset(name)?;
        if name == "PATH" && was_set {
            self.cmd_cache.clear();
        }
        Ok(was_set)
    }

    /// Invalidates command-cache entries made stale by a `$PATH` change.
    ///
    /// Entries found under a path element at or past the first changed
    /// element are dropped; earlier entries are still valid.
    fn path_changed(&mut self, old: Option<&[u8]>, new: Option<&[u8]>) {
        let old: Vec<&[u8]> = old.unwrap_or_default().split(|&b| b == b':').collect();
        let new: Vec<&[u8]> = new.unwrap_or_default().split(|&b| b == b':').collect();
        let first_change = old
            .iter()
            .zip(&new)
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| old.len().min(new.len()));
        self.cmd_cache
            .retain(|_, cached| cached.index < first_change);
    }

    /// Prints a shell error in the historical format and requests the
    /// error unwind.
    ///
    /// Callers `return env.raise_error(...)` with the exit status
    /// already set, or use the default of 2 via [`Env::sh_error`].
    pub fn raise_error<T>(&mut self, message: std::fmt::Arguments<'_>) -> semantics::Result<T> {
        let prefix = if self.lineno > 0 {
            format!("{}: line {}: ", self.arg0, self.lineno)
        } else {
            format!("{}: ", self.arg0)
        };
        self.out2.push_str(&prefix);
        let _ = self.out2.write_fmt(message);
        self.out2.push_byte(b'\n');
        self.out2.flush();
        Err(Divert::Error)
    }

    /// [`raise_error`](Self::raise_error) with exit status 2, the status
    /// of shell-detected errors.
    pub fn sh_error<T>(&mut self, message: std::fmt::Arguments<'_>) -> semantics::Result<T> {
        self.exit_status = ExitStatus::ERROR;
        self.raise_error(message)
    }

    /// Observes a pending interrupt at a safe point.
    ///
    /// Consumes the interrupt and requests the unwind if one is
    /// deliverable; otherwise continues.
    pub fn poll_interrupt(&mut self) -> semantics::Result<()> {
        if interrupt::take() {
            self.exit_status = ExitStatus::from_signal(libc::SIGINT);
            if self.interactive() {
                self.out2.push_byte(b'\n');
                self.out2.flush();
            }
            Err(Divert::Interrupt)
        } else {
            Ok(())
        }
    }

    /// Flushes both output sinks.
    pub fn flush_outputs(&mut self) {
        self.out1.flush();
        self.out2.flush();
    }

    /// Resets inherited state in a freshly forked child.
    pub fn enter_subshell(&mut self) {
        interrupt::reset();
        self.in_subshell = true;
        self.out1.clear();
        self.out2.clear();
        let interactive = false;
        self.options.remove(ShellOption::Interactive);
        self.traps.reset_for_subshell(interactive, self.job_control());
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineno_is_materialized_on_lookup() {
        let mut env = Env::new();
        env.lineno = 42;
        assert_eq!(env.lookup_var("LINENO"), Some(b"42".to_vec()));
        env.lineno = 43;
        assert_eq!(env.lookup_var("LINENO"), Some(b"43".to_vec()));
    }

    #[test]
    fn allexport_marks_assignments_exported() {
        let mut env = Env::new();
        env.options |= ShellOption::Allexport;
        env.set_var("x", b"1".to_vec(), VarFlags::empty()).unwrap();
        assert!(env.variables.get_variable("x").unwrap().is_exported());
    }

    #[test]
    fn path_change_invalidates_later_entries() {
        let mut env = Env::new();
        env.set_var("PATH", b"/a:/b:/c".to_vec(), VarFlags::empty())
            .unwrap();
        env.cmd_cache.insert(
            "early".to_owned(),
            CachedCmd {
                path: b"/a/early".to_vec(),
                index: 0,
            },
        );
        env.cmd_cache.insert(
            "late".to_owned(),
            CachedCmd {
                path: b"/c/late".to_vec(),
                index: 2,
            },
        );
        // /a is unchanged, /b and /c change places.
        env.set_var("PATH", b"/a:/c:/b".to_vec(), VarFlags::empty())
            .unwrap();
        assert!(env.cmd_cache.contains_key("early"));
        assert!(!env.cmd_cache.contains_key("late"));
    }

    #[test]
    fn optind_assignment_resets_getopts() {
        let mut env = Env::new();
        env.getopts_next = 5;
        env.getopts_offset = 2;
        env.set_var("OPTIND", b"1".to_vec(), VarFlags::empty())
            .unwrap();
        assert_eq!(env.getopts_next, 1);
        assert_eq!(env.getopts_offset, 0);
    }

    #[test]
    fn ifs_default() {
        let mut env = Env::new();
        assert_eq!(env.ifs(), b" \t\n");
        env.set_var("IFS", b":".to_vec(), VarFlags::empty()).unwrap();
        assert_eq!(env.ifs(), b":");
    }
}
