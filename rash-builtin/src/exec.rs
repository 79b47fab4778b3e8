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

//! Command-resolution built-ins: `exec`, `command`, `type`, and `hash`

use crate::{builtin_error, Options};
use itertools::Itertools;
use rash_env::builtin::Result;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::Env;
use rash_semantics::command::{exec_program, run_command_fields};
use rash_semantics::search::{find_command, find_external, CommandLocation};
use rash_syntax::parser::lex::Keyword;

/// Default utility search path for `command -p`.
const STANDARD_PATH: &[u8] = b"/usr/sbin:/usr/bin:/sbin:/bin";

pub fn exec(env: &mut Env, args: Vec<Field>) -> Result {
    if args.len() == 1 {
        // Redirections were applied permanently by the evaluator.
        return Ok(ExitStatus::SUCCESS);
    }
    exec_program(env, args.into_iter().skip(1).collect())
}

/// Describes how a name would resolve, for `type` and `command -v/-V`.
fn describe(env: &mut Env, name: &str, verbose: bool) -> Option<String> {
    if env.aliases.get(name).is_some() {
        let replacement = env.aliases.get(name).unwrap().0.replacement.clone();
        return Some(if verbose {
            format!("{name} is an alias for {replacement}")
        } else {
            format!("alias {name}={}", rash_quote::Quoted(&replacement))
        });
    }
    if Keyword::from_text(name.as_bytes()).is_some() {
        return Some(if verbose {
            format!("{name} is a shell keyword")
        } else {
            name.to_owned()
        });
    }
    match find_command(env, name, None, false) {
        CommandLocation::Function(_) => Some(if verbose {
            format!("{name} is a shell function")
        } else {
            name.to_owned()
        }),
        CommandLocation::Builtin(_) => Some(if verbose {
            format!("{name} is a shell builtin")
        } else {
            name.to_owned()
        }),
        CommandLocation::External { path } => {
            let path = String::from_utf8_lossy(&path).into_owned();
            Some(if verbose {
                format!("{name} is {path}")
            } else {
                path
            })
        }
        CommandLocation::NotFound => None,
    }
}

pub fn type_(env: &mut Env, args: Vec<Field>) -> Result {
    let mut status = ExitStatus::SUCCESS;
    for operand in args.iter().skip(1) {
        let Some(name) = operand.to_str() else {
            status = ExitStatus::NOT_FOUND;
            continue;
        };
        match describe(env, name, true) {
            Some(line) => {
                env.out1.push_str(&line);
                env.out1.push_byte(b'\n');
            }
            None => {
                env.out2
                    .push_str(&format!("{}: {name}: not found\n", env.arg0));
                env.out2.flush();
                status = ExitStatus::NOT_FOUND;
            }
        }
    }
    Ok(status)
}

pub fn command(env: &mut Env, args: Vec<Field>) -> Result {
    let mut describe_short = false;
    let mut describe_long = false;
    let mut default_path = false;
    let mut options = Options::new(&args);
    loop {
        match options.next("pvV") {
            Ok(Some('p')) => default_path = true,
            Ok(Some('v')) => describe_short = true,
            Ok(Some('V')) => describe_long = true,
            Ok(Some(_)) => unreachable!("only p, v, V are accepted"),
            Ok(None) => break,
            Err(c) => builtin_error!(env, "command: -{c}: unknown option"),
        }
    }
    let operands = options.operands().to_vec();

    if describe_short || describe_long {
        let mut status = ExitStatus::SUCCESS;
        for operand in &operands {
            let Some(name) = operand.to_str() else {
                status = ExitStatus::NOT_FOUND;
                continue;
            };
            match describe(env, name, describe_long) {
                Some(line) => {
                    env.out1.push_str(&line);
                    env.out1.push_byte(b'\n');
                }
                None => status = ExitStatus::NOT_FOUND,
            }
        }
        return Ok(status);
    }

    if operands.is_empty() {
        return Ok(ExitStatus::SUCCESS);
    }
    let path_override = default_path.then_some(STANDARD_PATH);
    run_command_fields(env, operands, path_override, true)
}

pub fn hash(env: &mut Env, args: Vec<Field>) -> Result {
    if args.get(1).is_some_and(|f| f.value == b"-r") {
        env.cmd_cache.clear();
        return Ok(ExitStatus::SUCCESS);
    }

    if args.len() == 1 {
        let lines: Vec<String> = env
            .cmd_cache
            .iter()
            .map(|(name, cached)| {
                format!("{}\t{name}\n", String::from_utf8_lossy(&cached.path))
            })
            .sorted()
            .collect();
        for line in lines {
            env.out1.push_str(&line);
        }
        return Ok(ExitStatus::SUCCESS);
    }

    let mut status = ExitStatus::SUCCESS;
    for operand in args.iter().skip(1) {
        let Some(name) = operand.to_str().map(str::to_owned) else {
            status = ExitStatus::FAILURE;
            continue;
        };
        env.cmd_cache.remove(&name);
        if find_external(env, &name, None).is_none() {
            env.out2
                .push_str(&format!("{}: hash: {name}: not found\n", env.arg0));
            env.out2.flush();
            status = ExitStatus::FAILURE;
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{fields, Capture};
    use rash_env::variable::VarFlags;
    use std::os::unix::fs::PermissionsExt;

    fn add_tool(env: &mut Env) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        let mut permissions = std::fs::metadata(&tool).unwrap().permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(&tool, permissions).unwrap();
        env.set_var(
            "PATH",
            dir.path().to_str().unwrap().into(),
            VarFlags::empty(),
        )
        .unwrap();
        dir
    }

    #[test]
    fn type_describes_builtins_keywords_and_files() {
        let mut capture = Capture::new();
        let dir = add_tool(&mut capture.env);
        capture.env.builtins.extend(crate::BUILTINS.iter().cloned());

        type_(
            &mut capture.env,
            fields(&["type", "echo", "if", "tool"]),
        )
        .unwrap();
        let out = capture.stdout();
        assert!(out.contains("echo is a shell builtin"));
        assert!(out.contains("if is a shell keyword"));
        assert!(out.contains(&format!("tool is {}/tool", dir.path().display())));
    }

    #[test]
    fn type_reports_missing_commands() {
        let mut env = Env::new();
        assert_eq!(
            type_(&mut env, fields(&["type", "missing-xyz"])),
            Ok(ExitStatus::NOT_FOUND)
        );
    }

    #[test]
    fn command_v_prints_path() {
        let mut capture = Capture::new();
        let dir = add_tool(&mut capture.env);
        command(&mut capture.env, fields(&["command", "-v", "tool"])).unwrap();
        assert_eq!(
            capture.stdout(),
            format!("{}/tool\n", dir.path().display())
        );
    }

    #[test]
    fn hash_caches_and_clears() {
        let mut env = Env::new();
        let _dir = add_tool(&mut env);
        hash(&mut env, fields(&["hash", "tool"])).unwrap();
        assert!(env.cmd_cache.contains_key("tool"));
        hash(&mut env, fields(&["hash", "-r"])).unwrap();
        assert!(env.cmd_cache.is_empty());
    }

    #[test]
    fn hash_reports_missing() {
        let mut env = Env::new();
        assert_eq!(
            hash(&mut env, fields(&["hash", "missing-tool-zz"])),
            Ok(ExitStatus::FAILURE)
        );
    }
}
