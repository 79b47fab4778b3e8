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

//! Traps and signal dispositions
//!
//! Signal handlers may only touch atomic flags. The handler installed
//! here records the signal in a per-signal flag array and, for SIGINT,
//! arms the interrupt machinery; the evaluator polls
//! [`TrapSet::pending`] at safe points and runs the recorded actions via
//! [`TrapSet::take_pending`]. No user code ever runs inside a handler.
//!
//! The disposition of each signal is derived from the user's trap, the
//! shell's interactivity, and job control, following the historical
//! rules: an interactive shell ignores SIGQUIT and SIGTERM and catches
//! SIGINT to abort the running command; a job-control shell additionally
//! ignores SIGTSTP, SIGTTIN, and SIGTTOU.

#[doc(no_inline)]
pub use nix::sys::signal::Signal;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Highest signal number tracked, inclusive.
const NSIG: usize = 64;

static GOT_SIG: [AtomicBool; NSIG + 1] = {
    #[allow(clippy::declare_interior_mutable_const)]
    const FLAG: AtomicBool = AtomicBool::new(false);
    [FLAG; NSIG + 1]
};
static PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(signo: libc::c_int) {
    note_signal(signo);
}

/// Records a signal delivery. Async-signal-safe.
pub fn note_signal(signo: i32) {
    if let Ok(index) = usize::try_from(signo) {
        if index <= NSIG {
            GOT_SIG[index].store(true, Ordering::Relaxed);
            PENDING.store(true, Ordering::Relaxed);
        }
    }
    if signo == libc::SIGINT {
        crate::interrupt::set_pending();
    }
}

/// Whether any signal has been recorded since the last
/// [`TrapSet::take_pending`].
#[must_use]
pub fn pending() -> bool {
    PENDING.load(Ordering::Relaxed)
}

/// Whether the given signal has been recorded; does not clear it.
#[must_use]
pub fn got_signal(signal: Signal) -> bool {
    GOT_SIG[signal as usize].load(Ordering::Relaxed)
}

/// Clears the record of one signal.
pub fn clear_signal(signal: Signal) {
    GOT_SIG[signal as usize].store(false, Ordering::Relaxed);
}

/// Discards all recorded signals (post-fork child state).
pub fn clear_all_signals() {
    for flag in &GOT_SIG {
        flag.store(false, Ordering::Relaxed);
    }
    PENDING.store(false, Ordering::Relaxed);
}

/// What a trap can be set to
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Default signal behavior (`trap - SIG`)
    Default,
    /// Ignore the signal (`trap '' SIG`)
    Ignore,
    /// Run a command string when the signal is delivered
    Command(Rc<str>),
}

/// What a trap can be attached to
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Condition {
    /// `EXIT` (or `0`): the shell terminating
    Exit,
    /// A signal, by number
    Signal(i32),
}

impl Condition {
    /// Parses a trap condition: `EXIT`, `0`, a signal number, or a
    /// signal name with or without the `SIG` prefix.
    #[must_use]
    pub fn parse(text: &str) -> Option<Condition> {
        if text.eq_ignore_ascii_case("EXIT") || text == "0" {
            return Some(Condition::Exit);
        }
        if let Ok(number) = text.parse::<i32>() {
            return (1..=NSIG as i32)
                .contains(&number)
                .then_some(Condition::Signal(number));
        }
        let upper = text.to_ascii_uppercase();
        let name = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{upper}")
        };
        name.parse::<Signal>().ok().map(|s| Condition::Signal(s as i32))
    }

    /// Name for the `trap` listing.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Condition::Exit => "EXIT".to_owned(),
            Condition::Signal(number) => match Signal::try_from(number) {
                Ok(signal) => signal.as_str().trim_start_matches("SIG").to_owned(),
                Err(_) => number.to_string(),
            },
        }
    }
}

/// Per-shell trap state
#[derive(Clone, Debug, Default)]
pub struct TrapSet {
    actions: BTreeMap<Condition, Action>,
    /// Whether the SIGCHLD handler is installed (job control)
    sigchld_caught: bool,
}

impl TrapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The action for a condition.
    #[must_use]
    pub fn action(&self, cond: Condition) -> Action {
        self.actions.get(&cond).cloned().unwrap_or(Action::Default)
    }

    /// Number of non-default traps installed.
    #[must_use]
    pub fn count(&self) -> usize {
        self.actions.len()
    }

    /// Installs a trap and updates the signal disposition.
    pub fn set_action(
        &mut self,
        cond: Condition,
        action: Action,
        interactive: bool,
        job_control: bool,
    ) {
        if action == Action::Default {
            self.actions.remove(&cond);
        } else {
            self.actions.insert(cond, action);
        }
        if let Condition::Signal(number) = cond {
            self.apply_disposition(number, interactive, job_control);
        }
    }

    /// All installed traps, for the `trap` listing.
    pub fn iter(&self) -> impl Iterator<Item = (Condition, &Action)> {
        self.actions.iter().map(|(c, a)| (*c, a))
    }

    /// Takes the recorded pending signals that have command traps.
    ///
    /// Only the flags of signals this trap set has a command for are
    /// consumed; the rest were handled by their disposition alone and
    /// their stale flags are harmless.
    pub fn take_pending(&mut self) -> Vec<(Condition, Rc<str>)> {
        if !PENDING.swap(false, Ordering::Relaxed) {
            return Vec::new();
        }
        let mut out = Vec::new();
        for signo in 1..=NSIG as i32 {
            if !matches!(self.action(Condition::Signal(signo)), Action::Command(_)) {
                continue;
            }
            if GOT_SIG[signo as usize].swap(false, Ordering::Relaxed) {
                if let Action::Command(cmd) = self.action(Condition::Signal(signo)) {
                    out.push((Condition::Signal(signo), cmd));
                }
            }
        }
        out
    }

    /// The EXIT trap command, taken so it runs only once.
    pub fn take_exit_action(&mut self) -> Option<Rc<str>> {
        match self.actions.remove(&Condition::Exit) {
            Some(Action::Command(cmd)) => Some(cmd),
            _ => None,
        }
    }

    /// Sets the initial dispositions for the whole signal set.
    pub fn initialize_dispositions(&mut self, interactive: bool, job_control: bool) {
        for signal in [
            libc::SIGINT,
            libc::SIGQUIT,
            libc::SIGTERM,
            libc::SIGTSTP,
            libc::SIGTTIN,
            libc::SIGTTOU,
        ] {
            self.apply_disposition(signal, interactive, job_control);
        }
    }

    /// Installs the SIGCHLD notification handler (job control only).
    pub fn catch_sigchld(&mut self) {
        if !self.sigchld_caught {
            set_handler(libc::SIGCHLD, Disposition::Catch);
            self.sigchld_caught = true;
        }
    }

    /// Resets command traps for a subshell: they revert to the default
    /// disposition, while ignored signals stay ignored. The EXIT trap is
    /// dropped.
    pub fn reset_for_subshell(&mut self, interactive: bool, job_control: bool) {
        let commands: Vec<Condition> = self
            .actions
            .iter()
            .filter(|(_, action)| matches!(action, Action::Command(_)))
            .map(|(cond, _)| *cond)
            .collect();
        for cond in commands {
            self.actions.remove(&cond);
            if let Condition::Signal(number) = cond {
                self.apply_disposition(number, interactive, job_control);
            }
        }
        self.actions.remove(&Condition::Exit);
        clear_all_signals();
    }

    /// Derives and installs the disposition of one signal.
    fn apply_disposition(&self, signo: i32, interactive: bool, job_control: bool) {
        let disposition = match self.action(Condition::Signal(signo)) {
            Action::Ignore => Disposition::Ignore,
            Action::Command(_) => Disposition::Catch,
            Action::Default => match signo {
                libc::SIGINT => {
                    if interactive {
                        Disposition::Catch
                    } else {
                        Disposition::Default
                    }
                }
                libc::SIGQUIT | libc::SIGTERM => {
                    if interactive {
                        Disposition::Ignore
                    } else {
                        Disposition::Default
                    }
                }
                libc::SIGTSTP | libc::SIGTTIN | libc::SIGTTOU => {
                    if job_control {
                        Disposition::Ignore
                    } else {
                        Disposition::Default
                    }
                }
                _ => Disposition::Default,
            },
        };
        set_handler(signo, disposition);
    }
}

/// Sets a signal back to its default disposition (forked children).
pub fn default_signal(signo: i32) {
    set_handler(signo, Disposition::Default);
}

/// Ignores a signal outright (background children without job control).
pub fn ignore_signal(signo: i32) {
    set_handler(signo, Disposition::Ignore);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Disposition {
    Default,
    Ignore,
    Catch,
}

fn set_handler(signo: i32, disposition: Disposition) {
    let Ok(signal) = Signal::try_from(signo) else {
        return;
    };
    // SIGKILL and SIGSTOP cannot be caught or ignored.
    if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP) {
        return;
    }
    let handler = match disposition {
        Disposition::Default => SigHandler::SigDfl,
        Disposition::Ignore => SigHandler::SigIgn,
        Disposition::Catch => SigHandler::Handler(on_signal),
    };
    let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
    // SAFETY: the handler only touches atomic flags.
    let _ = unsafe { sigaction(signal, &action) };
}
