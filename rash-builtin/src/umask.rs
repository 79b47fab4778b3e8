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

//! The `umask` built-in (octal form)

use crate::builtin_error;
use nix::sys::stat::{self, Mode};
use rash_env::builtin::Result;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::Env;

pub fn umask(env: &mut Env, args: Vec<Field>) -> Result {
    match args.get(1) {
        None => {
            // Read the current mask without changing it.
            let current = stat::umask(Mode::empty());
            stat::umask(current);
            env.out1
                .push_str(&format!("{:04o}\n", current.bits()));
            Ok(ExitStatus::SUCCESS)
        }
        Some(operand) => {
            let parsed = operand
                .to_str()
                .and_then(|s| u32::from_str_radix(s, 8).ok())
                .and_then(|bits| Mode::from_bits(bits & 0o777));
            match parsed {
                Some(mode) => {
                    stat::umask(mode);
                    Ok(ExitStatus::SUCCESS)
                }
                None => builtin_error!(env, "umask: {operand}: bad mask"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{fields, Capture};

    // The mask is process-global; one test exercises the whole cycle.
    #[test]
    fn set_and_report_round_trip() {
        let mut capture = Capture::new();
        let original = nix::sys::stat::umask(Mode::empty());

        umask(&mut capture.env, fields(&["umask", "027"])).unwrap();
        umask(&mut capture.env, fields(&["umask"])).unwrap();
        assert_eq!(capture.stdout(), "0027\n");

        assert_eq!(
            umask(&mut capture.env, fields(&["umask", "badmask"])),
            Err(rash_env::semantics::Divert::Error)
        );

        nix::sys::stat::umask(original);
    }
}
