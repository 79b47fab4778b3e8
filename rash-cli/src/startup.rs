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

//! Startup: command-line parsing and environment initialization

use rash_env::option::{OptionSet, ShellOption};
use rash_env::variable::VarFlags;
use rash_env::Env;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::MetadataExt;

/// What the shell reads commands from
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandSource {
    /// `-c command_string`
    Text(Vec<u8>),
    /// Script file operand
    File(Vec<u8>),
    /// Standard input (`-s` or no operands)
    Stdin,
}

/// Result of parsing the command line
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    pub options: OptionSet,
    pub source: CommandSource,
    /// `$0`
    pub arg0: String,
    pub positional: Vec<Vec<u8>>,
    /// `argv[0]` started with `-`: source the login profiles
    pub login: bool,
}

/// Error in the command line; the shell prints usage and exits with 2.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct UsageError {
    pub message: String,
}

fn usage_error<T>(message: impl Into<String>) -> Result<T, UsageError> {
    Err(UsageError {
        message: message.into(),
    })
}

/// Parses `sh [-abCEefIimnuVvx] [-o option]... [+o option]...
/// [-c cmd_string] [arg...]`.
pub fn parse_arguments(argv: Vec<Vec<u8>>) -> Result<Invocation, UsageError> {
    let mut iter = argv.into_iter();
    let program = iter.next().unwrap_or_else(|| b"rash".to_vec());
    let login = program.first() == Some(&b'-');
    let mut arg0 = String::from_utf8_lossy(&program).into_owned();

    let mut options = OptionSet::empty();
    let mut command_string = false;
    let mut read_stdin = false;
    let mut operands: Vec<Vec<u8>> = Vec::new();

    while let Some(arg) = iter.next() {
        let (enable, rest): (bool, &[u8]) = match arg.split_first() {
            Some((b'-', rest)) if !rest.is_empty() => (true, rest),
            Some((b'+', rest)) if !rest.is_empty() => (false, rest),
            _ => {
                operands.push(arg);
                break;
            }
        };
        if rest == b"-" && enable {
            break;
        }
        if rest == b"o" {
            let Some(name) = iter.next() else {
                return usage_error("-o: option name expected");
            };
            let Ok(option) = String::from_utf8_lossy(&name).parse::<ShellOption>() else {
                return usage_error(format!(
                    "{}: unknown option name",
                    String::from_utf8_lossy(&name)
                ));
            };
            if enable {
                options |= option;
            } else {
                options -= option;
            }
            continue;
        }
        for &letter in rest {
            match letter {
                b'c' if enable => command_string = true,
                b's' => {
                    read_stdin = enable;
                    if enable {
                        options |= ShellOption::Stdin;
                    }
                }
                _ => match ShellOption::from_letter(letter as char) {
                    Some(option) => {
                        if enable {
                            options |= option;
                        } else {
                            options -= option;
                        }
                    }
                    None => {
                        return usage_error(format!("-{}: unknown option", letter as char))
                    }
                },
            }
        }
    }
    operands.extend(iter);

    let source;
    let positional;
    if command_string {
        let mut operands = operands.into_iter();
        let Some(text) = operands.next() else {
            return usage_error("-c: command string expected");
        };
        if let Some(zero) = operands.next() {
            arg0 = String::from_utf8_lossy(&zero).into_owned();
        }
        positional = operands.collect();
        source = CommandSource::Text(text);
    } else if read_stdin || operands.is_empty() {
        positional = operands;
        source = CommandSource::Stdin;
    } else {
        let mut operands = operands.into_iter();
        let script = operands.next().expect("checked non-empty");
        arg0 = String::from_utf8_lossy(&script).into_owned();
        positional = operands.collect();
        source = CommandSource::File(script);
    }

    Ok(Invocation {
        options,
        source,
        arg0,
        positional,
        login,
    })
}

/// Imports the environment, validates `$PWD`, and seeds the startup
/// variables.
pub fn initialize_variables(env: &mut Env) {
    for (name, value) in std::env::vars_os() {
        let Ok(name) = name.into_string() else {
            continue;
        };
        if !rash_env::variable::is_name(&name) {
            continue;
        }
        let _ = env.set_var(&name, value.into_vec(), VarFlags::EXPORTED);
    }

    // An inherited PWD that does not name the current directory is
    // stale and dropped.
    let actual = nix::unistd::getcwd()
        .map(|p| p.as_os_str().as_bytes().to_vec())
        .unwrap_or_default();
    let inherited_ok = env.variables.get("PWD").is_some_and(|pwd| {
        let inherited = std::path::Path::new(std::ffi::OsStr::from_bytes(pwd));
        let actual = std::path::Path::new(std::ffi::OsStr::from_bytes(&actual));
        match (inherited.metadata(), actual.metadata()) {
            (Ok(a), Ok(b)) => a.ino() == b.ino() && a.dev() == b.dev(),
            _ => false,
        }
    });
    if !inherited_ok {
        let _ = env.set_var("PWD", actual, VarFlags::EXPORTED);
    }

    let _ = env.set_var(
        "PPID",
        env.ppid.to_string().into_bytes(),
        VarFlags::empty(),
    );
    let _ = env.set_var("OPTIND", b"1".to_vec(), VarFlags::empty());
    for (name, default) in [("PS1", "$ "), ("PS2", "> "), ("PS4", "+ ")] {
        if env.variables.get(name).is_none() {
            let _ = env.set_var(name, default.as_bytes().to_vec(), VarFlags::empty());
        }
    }
}
