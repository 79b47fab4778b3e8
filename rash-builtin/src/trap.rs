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

//! The `trap` built-in

use crate::builtin_error;
use rash_env::builtin::Result;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::trap::{Action, Condition};
use rash_env::Env;
use rash_quote::Quoted;

fn print_traps(env: &mut Env) {
    let entries: Vec<(Condition, Action)> = env
        .traps
        .iter()
        .map(|(cond, action)| (cond, action.clone()))
        .collect();
    for (cond, action) in entries {
        let line = match action {
            Action::Command(cmd) => {
                format!("trap -- {} {}\n", Quoted(&cmd), cond.name())
            }
            Action::Ignore => format!("trap -- '' {}\n", cond.name()),
            Action::Default => continue,
        };
        env.out1.push_str(&line);
    }
}

pub fn trap(env: &mut Env, args: Vec<Field>) -> Result {
    if args.len() == 1 {
        print_traps(env);
        return Ok(ExitStatus::SUCCESS);
    }

    let first = &args[1];
    // `trap N...` with a numeric first operand resets the named
    // conditions, a historical form.
    let all_conditions_form = first
        .to_str()
        .is_some_and(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));

    let (action, conditions) = if all_conditions_form {
        (Action::Default, &args[1..])
    } else {
        let action = match first.to_str() {
            Some("-") => Action::Default,
            Some("") => Action::Ignore,
            Some(command) => Action::Command(command.into()),
            None => builtin_error!(env, "trap: invalid action"),
        };
        (action, &args[2..])
    };

    if conditions.is_empty() {
        builtin_error!(env, "trap: condition expected");
    }

    let interactive = env.interactive();
    let job_control = env.job_control();
    for operand in conditions {
        let Some(cond) = operand.to_str().and_then(Condition::parse) else {
            builtin_error!(env, "trap: {operand}: bad trap");
        };
        env.traps
            .set_action(cond, action.clone(), interactive, job_control);
    }
    Ok(ExitStatus::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{fields, Capture};
    use rash_env::semantics::Divert;

    #[test]
    fn installs_and_lists_traps() {
        let mut capture = Capture::new();
        trap(
            &mut capture.env,
            fields(&["trap", "echo bye", "EXIT", "USR1"]),
        )
        .unwrap();
        assert_eq!(
            capture.env.traps.action(Condition::Exit),
            Action::Command("echo bye".into())
        );
        trap(&mut capture.env, fields(&["trap"])).unwrap();
        let out = capture.stdout();
        assert!(out.contains("trap -- 'echo bye' EXIT\n"));
        assert!(out.contains("trap -- 'echo bye' USR1\n"));
    }

    #[test]
    fn resets_with_dash_and_numeric_form() {
        let mut env = Env::new();
        trap(&mut env, fields(&["trap", "x", "USR1", "USR2"])).unwrap();
        assert_eq!(env.traps.count(), 2);
        trap(&mut env, fields(&["trap", "-", "USR1"])).unwrap();
        assert_eq!(env.traps.count(), 1);
        // `trap 12` resets signal 12 (USR2 on Linux).
        trap(&mut env, fields(&["trap", &libc::SIGUSR2.to_string()])).unwrap();
        assert_eq!(env.traps.count(), 0);
    }

    #[test]
    fn empty_action_ignores() {
        let mut env = Env::new();
        trap(&mut env, fields(&["trap", "", "USR1"])).unwrap();
        assert_eq!(
            env.traps.action(Condition::Signal(libc::SIGUSR1)),
            Action::Ignore
        );
    }

    #[test]
    fn bad_condition_is_an_error() {
        let mut env = Env::new();
        assert_eq!(
            trap(&mut env, fields(&["trap", "x", "NOSUCHSIG"])),
            Err(Divert::Error)
        );
    }
}
