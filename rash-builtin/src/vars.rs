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

//! Variable and option built-ins: `export`, `readonly`, `unset`, `set`,
//! `shift`, and `local`

use crate::{builtin_error, Options};
use rash_env::builtin::Result;
use rash_env::option::ShellOption;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::variable::{is_name, VarFlags};
use rash_env::Env;
use rash_quote::Quoted;
use rash_syntax::syntax::assignment_prefix;
use strum::IntoEnumIterator;

/// Common body of `export` and `readonly`.
fn flag_assign(env: &mut Env, args: Vec<Field>, flag: VarFlags, what: &str) -> Result {
    let mut print = false;
    let mut options = Options::new(&args);
    loop {
        match options.next("p") {
            Ok(Some('p')) => print = true,
            Ok(Some(_)) => unreachable!("only p is accepted"),
            Ok(None) => break,
            Err(c) => builtin_error!(env, "{what}: -{c}: unknown option"),
        }
    }

    let operands = options.operands().to_vec();
    if print || operands.is_empty() {
        let keyword = what;
        let lines: Vec<String> = env
            .variables
            .iter_sorted()
            .filter(|(_, var)| var.flags.contains(flag))
            .map(|(name, var)| match &var.value {
                Some(value) => format!(
                    "{keyword} {name}={}\n",
                    Quoted(&String::from_utf8_lossy(value))
                ),
                None => format!("{keyword} {name}\n"),
            })
            .collect();
        for line in lines {
            env.out1.push_str(&line);
        }
        return Ok(ExitStatus::SUCCESS);
    }

    for operand in operands {
        match assignment_prefix(&operand.value) {
            Some((name, value_start)) => {
                let name = name.to_owned();
                let value = operand.value[value_start..].to_vec();
                if let Err(e) = env.set_var(&name, value, flag) {
                    builtin_error!(env, "{what}: {e}");
                }
            }
            None => {
                let Some(name) = operand.to_str().filter(|n| is_name(n)) else {
                    builtin_error!(env, "{what}: {operand}: bad variable name");
                };
                env.variables.set_flags(name, flag);
            }
        }
    }
    Ok(ExitStatus::SUCCESS)
}

pub fn export(env: &mut Env, args: Vec<Field>) -> Result {
    flag_assign(env, args, VarFlags::EXPORTED, "export")
}

pub fn readonly(env: &mut Env, args: Vec<Field>) -> Result {
    flag_assign(env, args, VarFlags::READONLY, "readonly")
}

pub fn unset(env: &mut Env, args: Vec<Field>) -> Result {
    let mut functions = false;
    let mut variables = false;
    let mut options = Options::new(&args);
    loop {
        match options.next("fv") {
            Ok(Some('f')) => functions = true,
            Ok(Some('v')) => variables = true,
            Ok(Some(_)) => unreachable!("only f and v are accepted"),
            Ok(None) => break,
            Err(c) => builtin_error!(env, "unset: -{c}: unknown option"),
        }
    }
    if !functions {
        variables = true;
    }

    for operand in options.operands().to_vec() {
        let Some(name) = operand.to_str().map(str::to_owned) else {
            continue;
        };
        if variables {
            if let Err(e) = env.unset_var(&name) {
                builtin_error!(env, "unset: {e}");
            }
        }
        if functions {
            env.functions.unset(&name);
        }
    }
    Ok(ExitStatus::SUCCESS)
}

/// Prints every variable as re-input-able assignments.
fn print_variables(env: &mut Env) {
    let lines: Vec<String> = env
        .variables
        .iter_sorted()
        .filter_map(|(name, var)| {
            let value = var.value.as_ref()?;
            Some(format!(
                "{name}={}\n",
                Quoted(&String::from_utf8_lossy(value))
            ))
        })
        .collect();
    for line in lines {
        env.out1.push_str(&line);
    }
}

fn print_option_settings(env: &mut Env, as_commands: bool) {
    let lines: Vec<String> = ShellOption::iter()
        .map(|option| {
            let on = env.options.contains(option);
            if as_commands {
                format!("set {}o {option}\n", if on { '-' } else { '+' })
            } else {
                format!("{option:<16}{}\n", if on { "on" } else { "off" })
            }
        })
        .collect();
    for line in lines {
        env.out1.push_str(&line);
    }
}

/// The `set` built-in: options, long options, and positional
/// parameters.
pub fn set(env: &mut Env, args: Vec<Field>) -> Result {
    if args.len() == 1 {
        print_variables(env);
        return Ok(ExitStatus::SUCCESS);
    }

    let mut index = 1;
    let mut saw_params = false;
    while index < args.len() {
        let arg = &args[index];
        let bytes = arg.value.clone();
        index += 1;

        let (enable, rest): (bool, &[u8]) = match bytes.split_first() {
            Some((b'-', rest)) => (true, rest),
            Some((b'+', rest)) => (false, rest),
            _ => {
                index -= 1;
                saw_params = true;
                break;
            }
        };
        if rest == b"-" && enable {
            // `set --`: everything that follows is positional.
            saw_params = true;
            break;
        }
        if rest == b"o" {
            // Long-name form; the name is the next argument.
            match args.get(index) {
                None => {
                    print_option_settings(env, !enable);
                    return Ok(ExitStatus::SUCCESS);
                }
                Some(name_field) => {
                    index += 1;
                    let Some(option) = name_field
                        .to_str()
                        .and_then(|n| n.parse::<ShellOption>().ok())
                    else {
                        builtin_error!(env, "set: {name_field}: bad option name");
                    };
                    if enable {
                        env.options |= option;
                    } else {
                        env.options -= option;
                    }
                }
            }
            continue;
        }
        for &letter in rest {
            let Some(option) = ShellOption::from_letter(letter as char) else {
                builtin_error!(env, "set: -{}: unknown option", letter as char);
            };
            if enable {
                env.options |= option;
            } else {
                env.options -= option;
            }
        }
    }

    if saw_params {
        env.positional = args[index..].iter().map(|f| f.value.clone()).collect();
    }
    Ok(ExitStatus::SUCCESS)
}

pub fn shift(env: &mut Env, args: Vec<Field>) -> Result {
    let count = match args.get(1) {
        None => 1,
        Some(field) => match field.to_str().and_then(|s| s.parse::<usize>().ok()) {
            Some(n) => n,
            None => builtin_error!(env, "shift: {field}: bad number"),
        },
    };
    if count > env.positional.len() {
        builtin_error!(env, "shift: can't shift that many");
    }
    env.positional.drain(..count);
    Ok(ExitStatus::SUCCESS)
}

/// The `local` built-in (Almquist extension).
///
/// `local -` snapshots the option vector; it is restored when the
/// function returns.
pub fn local(env: &mut Env, args: Vec<Field>) -> Result {
    if env.fn_depth == 0 || !env.variables.in_function() {
        builtin_error!(env, "local: not in a function");
    }
    for operand in args.iter().skip(1) {
        if operand.value == b"-" {
            let options = env.options;
            env.variables.snapshot_options(options);
            continue;
        }
        match assignment_prefix(&operand.value) {
            Some((name, value_start)) => {
                let name = name.to_owned();
                let value = operand.value[value_start..].to_vec();
                env.variables.make_local(&name);
                if let Err(e) = env.set_var(&name, value, VarFlags::empty()) {
                    builtin_error!(env, "local: {e}");
                }
            }
            None => {
                let Some(name) = operand.to_str().filter(|n| is_name(n)) else {
                    builtin_error!(env, "local: {operand}: bad variable name");
                };
                env.variables.make_local(name);
            }
        }
    }
    Ok(ExitStatus::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{fields, Capture};
    use rash_env::semantics::Divert;

    #[test]
    fn export_marks_and_assigns() {
        let mut env = Env::new();
        export(&mut env, fields(&["export", "a=1", "b"])).unwrap();
        assert!(env.variables.get_variable("a").unwrap().is_exported());
        assert_eq!(env.variables.get("a"), Some(&b"1"[..]));
        assert!(env.variables.get_variable("b").unwrap().is_exported());
        assert_eq!(env.variables.get("b"), None);
    }

    #[test]
    fn readonly_prevents_assignment() {
        let mut env = Env::new();
        readonly(&mut env, fields(&["readonly", "r=fixed"])).unwrap();
        assert_eq!(
            env.set_var("r", b"other".to_vec(), VarFlags::empty())
                .unwrap_err()
                .name,
            "r"
        );
    }

    #[test]
    fn export_listing() {
        let mut capture = Capture::new();
        export(&mut capture.env, fields(&["export", "x=a b"])).unwrap();
        export(&mut capture.env, fields(&["export", "-p"])).unwrap();
        assert!(capture.stdout().contains("export x='a b'\n"));
    }

    #[test]
    fn unset_variables_and_functions() {
        let mut env = Env::new();
        env.set_var("v", b"1".to_vec(), VarFlags::empty()).unwrap();
        unset(&mut env, fields(&["unset", "v"])).unwrap();
        assert_eq!(env.variables.get("v"), None);

        env.set_var("w", b"1".to_vec(), VarFlags::READONLY).unwrap();
        assert_eq!(
            unset(&mut env, fields(&["unset", "w"])),
            Err(Divert::Error)
        );
    }

    #[test]
    fn set_positional_parameters() {
        let mut env = Env::new();
        set(&mut env, fields(&["set", "--", "a", "b", "c"])).unwrap();
        assert_eq!(env.positional.len(), 3);
        set(&mut env, fields(&["set", "x", "y"])).unwrap();
        assert_eq!(env.positional, vec![b"x".to_vec(), b"y".to_vec()]);
    }

    #[test]
    fn set_option_letters() {
        let mut env = Env::new();
        set(&mut env, fields(&["set", "-ef"])).unwrap();
        assert!(env.options.contains(ShellOption::Errexit));
        assert!(env.options.contains(ShellOption::Noglob));
        set(&mut env, fields(&["set", "+e"])).unwrap();
        assert!(!env.options.contains(ShellOption::Errexit));
        assert!(env.options.contains(ShellOption::Noglob));
    }

    #[test]
    fn set_long_options() {
        let mut env = Env::new();
        set(&mut env, fields(&["set", "-o", "errexit"])).unwrap();
        assert!(env.options.contains(ShellOption::Errexit));
        set(&mut env, fields(&["set", "+o", "errexit"])).unwrap();
        assert!(!env.options.contains(ShellOption::Errexit));
        assert_eq!(
            set(&mut env, fields(&["set", "-o", "bogus"])),
            Err(Divert::Error)
        );
    }

    #[test]
    fn set_rejects_unknown_letter() {
        let mut env = Env::new();
        assert_eq!(set(&mut env, fields(&["set", "-Q"])), Err(Divert::Error));
    }

    #[test]
    fn shift_moves_positionals() {
        let mut env = Env::new();
        env.positional = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        shift(&mut env, fields(&["shift"])).unwrap();
        assert_eq!(env.positional.len(), 2);
        shift(&mut env, fields(&["shift", "2"])).unwrap();
        assert!(env.positional.is_empty());
        assert_eq!(
            shift(&mut env, fields(&["shift"])),
            Err(Divert::Error)
        );
    }

    #[test]
    fn local_outside_function_is_an_error() {
        let mut env = Env::new();
        assert_eq!(
            local(&mut env, fields(&["local", "x"])),
            Err(Divert::Error)
        );
    }

    #[test]
    fn local_saves_and_restores() {
        let mut env = Env::new();
        env.set_var("x", b"outer".to_vec(), VarFlags::empty()).unwrap();
        env.variables.push_frame();
        env.fn_depth = 1;
        local(&mut env, fields(&["local", "x=inner"])).unwrap();
        assert_eq!(env.variables.get("x"), Some(&b"inner"[..]));
        env.fn_depth = 0;
        env.variables.pop_frame(false);
        assert_eq!(env.variables.get("x"), Some(&b"outer"[..]));
    }

    #[test]
    fn local_hyphen_snapshots_options() {
        let mut env = Env::new();
        env.variables.push_frame();
        env.fn_depth = 1;
        local(&mut env, fields(&["local", "-"])).unwrap();
        env.options |= ShellOption::Errexit;
        let snapshot = env.variables.pop_frame(false);
        assert_eq!(snapshot, Some(rash_env::option::OptionSet::empty()));
    }
}
