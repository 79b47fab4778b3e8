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

//! The `cd` and `pwd` built-ins
//!
//! `cd` maintains `$PWD` and `$OLDPWD`, searches `$CDPATH` for relative
//! operands, and supports `cd -`. Directory names printed after a
//! `$CDPATH` hit or `cd -` go to standard output, as POSIX specifies.

use crate::builtin_error;
use rash_env::builtin::Result;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::variable::VarFlags;
use rash_env::Env;
use std::os::unix::ffi::OsStrExt;

fn current_dir_bytes() -> Option<Vec<u8>> {
    nix::unistd::getcwd()
        .ok()
        .map(|p| p.as_os_str().as_bytes().to_vec())
}

fn chdir_bytes(dir: &[u8]) -> nix::Result<()> {
    nix::unistd::chdir(std::ffi::OsStr::from_bytes(dir))
}

/// Records the directory change in `$PWD`/`$OLDPWD`.
fn commit_move(env: &mut Env) {
    let old = env.variables.get("PWD").map(<[u8]>::to_vec);
    if let Some(old) = old {
        let _ = env.set_var("OLDPWD", old, VarFlags::empty());
    }
    if let Some(now) = current_dir_bytes() {
        let _ = env.set_var("PWD", now, VarFlags::empty());
    }
}

pub fn cd(env: &mut Env, args: Vec<Field>) -> Result {
    // -L and -P are accepted; the recorded path is always the physical
    // one.
    let operands: Vec<&Field> = args
        .iter()
        .skip(1)
        .filter(|f| f.value != b"-L" && f.value != b"-P" && f.value != b"--")
        .collect();

    let mut print_destination = false;
    let target: Vec<u8> = match operands.first() {
        None => match env.variables.get("HOME") {
            Some(home) if !home.is_empty() => home.to_vec(),
            _ => builtin_error!(env, "cd: HOME not set"),
        },
        Some(field) if field.value == b"-" => {
            print_destination = true;
            match env.variables.get("OLDPWD") {
                Some(old) => old.to_vec(),
                None => builtin_error!(env, "cd: OLDPWD not set"),
            }
        }
        Some(field) => field.value.clone(),
    };

    // CDPATH applies to relative operands that do not start with a dot
    // component.
    let mut candidates: Vec<(Vec<u8>, bool)> = Vec::new();
    let relative = !target.starts_with(b"/");
    let dotted = target.starts_with(b"./") || target.starts_with(b"../")
        || target == b"."
        || target == b"..";
    if relative && !dotted && !print_destination {
        if let Some(cdpath) = env.variables.get("CDPATH").map(<[u8]>::to_vec) {
            for prefix in cdpath.split(|&b| b == b':') {
                let mut joined = prefix.to_vec();
                if joined.is_empty() {
                    candidates.push((target.clone(), false));
                    continue;
                }
                if joined.last() != Some(&b'/') {
                    joined.push(b'/');
                }
                joined.extend_from_slice(&target);
                candidates.push((joined, true));
            }
        }
    }
    candidates.push((target.clone(), print_destination));

    for (dir, announce) in candidates {
        if chdir_bytes(&dir).is_ok() {
            commit_move(env);
            if announce {
                if let Some(now) = current_dir_bytes() {
                    env.out1.push_bytes(&now);
                    env.out1.push_byte(b'\n');
                }
            }
            return Ok(ExitStatus::SUCCESS);
        }
    }
    builtin_error!(
        env,
        "cd: can't cd to {}",
        String::from_utf8_lossy(&target)
    );
}

pub fn pwd(env: &mut Env, _args: Vec<Field>) -> Result {
    match current_dir_bytes() {
        Some(dir) => {
            env.out1.push_bytes(&dir);
            env.out1.push_byte(b'\n');
            Ok(ExitStatus::SUCCESS)
        }
        None => builtin_error!(env, "pwd: cannot determine current directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{fields, Capture};
    use rash_env::semantics::Divert;

    // These tests change the process working directory, so they share a
    // lock.
    static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn cd_to_operand_updates_pwd_and_oldpwd() {
        let _guard = CWD_LOCK.lock().unwrap();
        let mut env = Env::new();
        let before = current_dir_bytes().unwrap();
        env.set_var("PWD", before.clone(), VarFlags::empty()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        cd(&mut env, fields(&["cd", dir.path().to_str().unwrap()])).unwrap();
        assert_eq!(
            env.variables.get("OLDPWD"),
            Some(&before[..])
        );
        let pwd_now = env.variables.get("PWD").unwrap().to_vec();
        assert!(pwd_now.ends_with(
            dir.path().file_name().unwrap().as_bytes()
        ));

        chdir_bytes(&before).unwrap();
    }

    #[test]
    fn cd_without_home_is_an_error() {
        let _guard = CWD_LOCK.lock().unwrap();
        let mut env = Env::new();
        assert_eq!(cd(&mut env, fields(&["cd"])), Err(Divert::Error));
    }

    #[test]
    fn cd_to_missing_directory_fails() {
        let _guard = CWD_LOCK.lock().unwrap();
        let mut env = Env::new();
        assert_eq!(
            cd(&mut env, fields(&["cd", "/no/such/dir/anywhere"])),
            Err(Divert::Error)
        );
    }

    #[test]
    fn pwd_prints_current_directory() {
        let _guard = CWD_LOCK.lock().unwrap();
        let mut capture = Capture::new();
        pwd(&mut capture.env, fields(&["pwd"])).unwrap();
        let printed = capture.stdout();
        let expected = String::from_utf8(current_dir_bytes().unwrap()).unwrap();
        assert_eq!(printed.trim_end(), expected);
    }
}
