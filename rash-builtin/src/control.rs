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

//! Control-flow built-ins: `:`, `true`, `false`, `break`, `continue`,
//! `return`, `exit`, `eval`, and `.`

use crate::builtin_error;
use rash_env::builtin::Result;
use rash_env::semantics::{Divert, ExitStatus, Field};
use rash_env::Env;
use std::os::unix::ffi::OsStrExt;

pub fn colon(_env: &mut Env, _args: Vec<Field>) -> Result {
    Ok(ExitStatus::SUCCESS)
}

pub fn true_(_env: &mut Env, _args: Vec<Field>) -> Result {
    Ok(ExitStatus::SUCCESS)
}

pub fn false_(_env: &mut Env, _args: Vec<Field>) -> Result {
    Ok(ExitStatus::FAILURE)
}

/// Parses the numeric operand of `break`, `continue`, `return`, `exit`.
fn numeric_operand(env: &mut Env, args: &[Field], what: &str) -> rash_env::semantics::Result<Option<i64>> {
    match args.get(1) {
        None => Ok(None),
        Some(field) => match field.to_str().and_then(|s| s.parse::<i64>().ok()) {
            Some(n) => Ok(Some(n)),
            None => env.sh_error(format_args!("{what}: {field}: bad number")),
        },
    }
}

pub fn break_(env: &mut Env, args: Vec<Field>) -> Result {
    let count = match numeric_operand(env, &args, "break")? {
        Some(n) if n >= 1 => n as usize,
        Some(_) => builtin_error!(env, "break: bad loop count"),
        None => 1,
    };
    Err(Divert::Break { count })
}

pub fn continue_(env: &mut Env, args: Vec<Field>) -> Result {
    let count = match numeric_operand(env, &args, "continue")? {
        Some(n) if n >= 1 => n as usize,
        Some(_) => builtin_error!(env, "continue: bad loop count"),
        None => 1,
    };
    Err(Divert::Continue { count })
}

pub fn return_(env: &mut Env, args: Vec<Field>) -> Result {
    if let Some(n) = numeric_operand(env, &args, "return")? {
        env.exit_status = ExitStatus::from(n as i32);
    }
    Err(Divert::Return)
}

pub fn exit(env: &mut Env, args: Vec<Field>) -> Result {
    if let Some(n) = numeric_operand(env, &args, "exit")? {
        env.exit_status = ExitStatus::from(n as i32);
    }
    Err(Divert::Exit)
}

/// Concatenates the operands and runs them as shell input.
pub fn eval(env: &mut Env, args: Vec<Field>) -> Result {
    let mut source: Vec<u8> = Vec::new();
    for (i, field) in args.iter().skip(1).enumerate() {
        if i > 0 {
            source.push(b' ');
        }
        source.extend_from_slice(&field.value);
    }
    if source.is_empty() {
        return Ok(ExitStatus::SUCCESS);
    }
    rash_semantics::eval_string(env, &source)?;
    Ok(env.exit_status)
}

/// Finds a dot script: a name with a slash is used as is, anything else
/// is searched for on `$PATH` (readable, not necessarily executable).
fn find_dot_script(env: &Env, name: &[u8]) -> Option<Vec<u8>> {
    if name.contains(&b'/') {
        return Some(name.to_vec());
    }
    let path = env.variables.get("PATH")?.to_vec();
    for dir in path.split(|&b| b == b':') {
        let mut full = dir.to_vec();
        if full.is_empty() {
            full.push(b'.');
        }
        full.push(b'/');
        full.extend_from_slice(name);
        if std::path::Path::new(std::ffi::OsStr::from_bytes(&full)).is_file() {
            return Some(full);
        }
    }
    None
}

/// The `.` built-in: read and execute commands from a file in the
/// current environment.
pub fn dot(env: &mut Env, args: Vec<Field>) -> Result {
    let Some(operand) = args.get(1) else {
        builtin_error!(env, ".: filename argument required");
    };
    let Some(path) = find_dot_script(env, &operand.value) else {
        builtin_error!(env, ".: {operand}: not found");
    };
    let file = match std::fs::File::open(std::ffi::OsStr::from_bytes(&path)) {
        Ok(file) => file,
        Err(e) => builtin_error!(env, ".: {operand}: {e}"),
    };

    let input = rash_syntax::input::InputStack::from_reader(file);
    let mut lexer = rash_syntax::parser::lex::Lexer::new(input);
    match rash_semantics::read_eval_loop(env, &mut lexer, false) {
        Ok(()) | Err(Divert::Return) => Ok(env.exit_status),
        Err(divert) => Err(divert),
    }
}
