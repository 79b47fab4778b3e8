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

//! The `echo` built-in
//!
//! Historical Almquist behavior: `-n` suppresses the newline, and
//! backslash escapes are always interpreted (no `-e` needed). `\c`
//! stops all output.

use rash_env::builtin::Result;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::Env;

pub fn echo(env: &mut Env, args: Vec<Field>) -> Result {
    let mut operands = &args[1..];
    let mut newline = true;
    if operands.first().is_some_and(|f| f.value == b"-n") {
        newline = false;
        operands = &operands[1..];
    }

    let mut out = Vec::new();
    'all: for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        let mut iter = operand.value.iter().copied();
        while let Some(byte) = iter.next() {
            if byte != b'\\' {
                out.push(byte);
                continue;
            }
            match iter.next() {
                None => out.push(b'\\'),
                Some(b'a') => out.push(0x07),
                Some(b'b') => out.push(0x08),
                Some(b'c') => {
                    newline = false;
                    break 'all;
                }
                Some(b'e') => out.push(0x1B),
                Some(b'f') => out.push(0x0C),
                Some(b'n') => out.push(b'\n'),
                Some(b'r') => out.push(b'\r'),
                Some(b't') => out.push(b'\t'),
                Some(b'v') => out.push(0x0B),
                Some(b'\\') => out.push(b'\\'),
                Some(b'0') => {
                    // Up to three octal digits.
                    let mut value: u32 = 0;
                    let mut taken = 0;
                    let mut rest = iter.clone();
                    while taken < 3 {
                        match rest.clone().next() {
                            Some(d @ b'0'..=b'7') => {
                                value = value * 8 + u32::from(d - b'0');
                                rest.next();
                                taken += 1;
                            }
                            _ => break,
                        }
                    }
                    iter = rest;
                    out.push(value as u8);
                }
                Some(other) => {
                    out.push(b'\\');
                    out.push(other);
                }
            }
        }
    }
    if newline {
        out.push(b'\n');
    }
    env.out1.push_bytes(&out);
    Ok(ExitStatus::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{fields, Capture};

    fn run(args: &[&str]) -> String {
        let mut capture = Capture::new();
        echo(&mut capture.env, fields(args)).unwrap();
        capture.stdout()
    }

    #[test]
    fn joins_arguments_with_spaces() {
        assert_eq!(run(&["echo", "hello", "world"]), "hello world\n");
        assert_eq!(run(&["echo"]), "\n");
    }

    #[test]
    fn minus_n_suppresses_newline() {
        assert_eq!(run(&["echo", "-n", "x"]), "x");
    }

    #[test]
    fn escapes_are_interpreted() {
        assert_eq!(run(&["echo", r"a\tb"]), "a\tb\n");
        assert_eq!(run(&["echo", r"line\nbreak"]), "line\nbreak\n");
        assert_eq!(run(&["echo", r"\0101"]), "A\n");
        assert_eq!(run(&["echo", r"back\\slash"]), "back\\slash\n");
        assert_eq!(run(&["echo", r"unknown\q"]), "unknown\\q\n");
    }

    #[test]
    fn slash_c_stops_output() {
        assert_eq!(run(&["echo", r"one\ctwo", "three"]), "one");
    }
}
