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

//! Running trap actions
//!
//! Signal handlers only record flags; the evaluator calls
//! [`run_pending_traps`] at safe points, which turns recorded signals
//! into evaluations of the installed action strings. `$?` is preserved
//! around trap bodies. A trap running never dispatches further traps,
//! so a busy signal cannot recurse.

use rash_env::semantics::{Divert, Result};
use rash_env::{trap, Env};

/// Runs the actions of all recorded pending signals.
pub fn run_pending_traps(env: &mut Env) -> Result<()> {
    if env.running_trap || !trap::pending() {
        return Ok(());
    }
    let actions = env.traps.take_pending();
    if actions.is_empty() {
        return Ok(());
    }

    env.running_trap = true;
    let saved_status = env.exit_status;
    let mut outcome = Ok(());
    for (_cond, action) in actions {
        match crate::runner::eval_string(env, action.as_bytes()) {
            Ok(()) => {}
            Err(divert) => {
                outcome = Err(divert);
                break;
            }
        }
    }
    env.exit_status = saved_status;
    env.running_trap = false;
    outcome
}

/// Runs the EXIT trap, once.
///
/// The exit status of the shell is the one from before the trap, unless
/// the trap itself calls `exit` with a value.
pub fn run_exit_trap(env: &mut Env) {
    let Some(action) = env.traps.take_exit_action() else {
        return;
    };
    let saved_status = env.exit_status;
    env.running_trap = true;
    match crate::runner::eval_string(env, action.as_bytes()) {
        Err(Divert::Exit) => {}
        _ => env.exit_status = saved_status,
    }
    env.running_trap = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rash_env::semantics::ExitStatus;
    use rash_env::trap::{Action, Condition};

    #[test]
    fn exit_trap_preserves_exit_status() {
        let mut env = Env::new();
        env.traps.set_action(
            Condition::Exit,
            Action::Command("x=ran".into()),
            false,
            false,
        );
        env.exit_status = ExitStatus(3);
        run_exit_trap(&mut env);
        assert_eq!(env.variables.get("x"), Some(&b"ran"[..]));
        assert_eq!(env.exit_status, ExitStatus(3));
        // Second run is a no-op.
        let _ = env.variables.unset("x");
        run_exit_trap(&mut env);
        assert_eq!(env.variables.get("x"), None);
    }

    #[test]
    fn pending_trap_runs_and_preserves_status() {
        let mut env = Env::new();
        rash_env::trap::clear_all_signals();
        env.traps.set_action(
            Condition::Signal(libc::SIGUSR1),
            Action::Command("seen=yes".into()),
            false,
            false,
        );
        env.exit_status = ExitStatus(5);
        rash_env::trap::note_signal(libc::SIGUSR1);
        run_pending_traps(&mut env).unwrap();
        assert_eq!(env.variables.get("seen"), Some(&b"yes"[..]));
        assert_eq!(env.exit_status, ExitStatus(5));
    }

    #[test]
    fn traps_do_not_recurse() {
        let mut env = Env::new();
        env.running_trap = true;
        rash_env::trap::note_signal(libc::SIGUSR2);
        // Nothing runs while a trap is already running.
        run_pending_traps(&mut env).unwrap();
        env.running_trap = false;
        rash_env::trap::clear_all_signals();
    }
}
