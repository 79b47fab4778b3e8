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

//! The `alias` and `unalias` built-ins

use itertools::Itertools;
use rash_env::builtin::Result;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::Env;
use rash_quote::Quoted;
use rash_syntax::alias::HashEntry;

fn print_alias(env: &mut Env, name: &str, replacement: &str) {
    let line = format!("{name}={}\n", Quoted(replacement));
    env.out1.push_str(&line);
}

pub fn alias(env: &mut Env, args: Vec<Field>) -> Result {
    if args.len() == 1 {
        let all: Vec<(String, String)> = env
            .aliases
            .iter()
            .map(|entry| (entry.0.name.clone(), entry.0.replacement.clone()))
            .sorted()
            .collect();
        for (name, replacement) in all {
            print_alias(env, &name, &replacement);
        }
        return Ok(ExitStatus::SUCCESS);
    }

    let mut status = ExitStatus::SUCCESS;
    for operand in args.into_iter().skip(1) {
        let Some(text) = operand.to_str() else {
            status = ExitStatus::FAILURE;
            continue;
        };
        match text.split_once('=') {
            Some((name, replacement)) => {
                env.aliases
                    .replace(HashEntry::new(name, replacement));
            }
            None => match env.aliases.get(text) {
                Some(entry) => {
                    let name = entry.0.name.clone();
                    let replacement = entry.0.replacement.clone();
                    print_alias(env, &name, &replacement);
                }
                None => {
                    env.out2
                        .push_str(&format!("{}: alias: {text}: not found\n", env.arg0));
                    env.out2.flush();
                    status = ExitStatus::FAILURE;
                }
            },
        }
    }
    Ok(status)
}

pub fn unalias(env: &mut Env, args: Vec<Field>) -> Result {
    if args.get(1).is_some_and(|f| f.value == b"-a") {
        env.aliases.clear();
        return Ok(ExitStatus::SUCCESS);
    }

    let mut status = ExitStatus::SUCCESS;
    for operand in args.into_iter().skip(1) {
        match operand.to_str() {
            Some(name) if env.aliases.remove(name) => {}
            _ => {
                env.out2.push_str(&format!(
                    "{}: unalias: {operand}: not found\n",
                    env.arg0
                ));
                env.out2.flush();
                status = ExitStatus::FAILURE;
            }
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{fields, Capture};

    #[test]
    fn define_list_and_remove() {
        let mut capture = Capture::new();
        alias(&mut capture.env, fields(&["alias", "ll=ls -l"])).unwrap();
        assert_eq!(
            capture.env.aliases.get("ll").unwrap().0.replacement,
            "ls -l"
        );

        alias(&mut capture.env, fields(&["alias", "ll"])).unwrap();
        assert_eq!(capture.stdout(), "ll='ls -l'\n");

        unalias(&mut capture.env, fields(&["unalias", "ll"])).unwrap();
        assert!(capture.env.aliases.get("ll").is_none());
    }

    #[test]
    fn listing_is_sorted() {
        let mut capture = Capture::new();
        alias(&mut capture.env, fields(&["alias", "zz=2", "aa=1"])).unwrap();
        alias(&mut capture.env, fields(&["alias"])).unwrap();
        assert_eq!(capture.stdout(), "aa=1\nzz=2\n");
    }

    #[test]
    fn missing_alias_fails() {
        let mut env = Env::new();
        assert_eq!(
            alias(&mut env, fields(&["alias", "nosuch"])),
            Ok(ExitStatus::FAILURE)
        );
        assert_eq!(
            unalias(&mut env, fields(&["unalias", "nosuch"])),
            Ok(ExitStatus::FAILURE)
        );
    }

    #[test]
    fn unalias_a_clears_everything() {
        let mut env = Env::new();
        alias(&mut env, fields(&["alias", "a=1", "b=2"])).unwrap();
        unalias(&mut env, fields(&["unalias", "-a"])).unwrap();
        assert!(env.aliases.is_empty());
    }
}
