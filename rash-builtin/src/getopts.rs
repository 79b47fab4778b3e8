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

//! The `getopts` built-in
//!
//! Parsing state (the argument index and the position inside a grouped
//! option) lives in the environment and is reset whenever the script
//! assigns `OPTIND`.

use crate::builtin_error;
use rash_env::builtin::Result;
use rash_env::semantics::{ExitStatus, Field};
use rash_env::variable::{is_name, VarFlags};
use rash_env::Env;

fn assign(env: &mut Env, name: &str, value: &[u8]) -> rash_env::semantics::Result<()> {
    if let Err(e) = env.set_var(name, value.to_vec(), VarFlags::empty()) {
        return env.sh_error(format_args!("getopts: {e}"));
    }
    Ok(())
}

fn sync_optind(env: &mut Env) -> rash_env::semantics::Result<()> {
    let next = env.getopts_next;
    let offset = env.getopts_offset;
    let value = next.to_string().into_bytes();
    if let Err(e) = env.set_var("OPTIND", value, VarFlags::empty()) {
        return env.sh_error(format_args!("getopts: {e}"));
    }
    // Assigning OPTIND resets the cursor; put our state back.
    env.getopts_next = next;
    env.getopts_offset = offset;
    Ok(())
}

pub fn getopts(env: &mut Env, args: Vec<Field>) -> Result {
    let (Some(optstring), Some(var)) = (args.get(1), args.get(2)) else {
        builtin_error!(env, "getopts: usage: getopts optstring name [arg...]");
    };
    let optstring = optstring.value.clone();
    let Some(var) = var.to_str().filter(|n| is_name(n)).map(str::to_owned) else {
        builtin_error!(env, "getopts: bad variable name");
    };
    let silent = optstring.first() == Some(&b':');
    let optstring = if silent {
        &optstring[1..]
    } else {
        &optstring[..]
    };

    // Parse either the given operands or the positional parameters.
    let operands: Vec<Vec<u8>> = if args.len() > 3 {
        args[3..].iter().map(|f| f.value.clone()).collect()
    } else {
        env.positional.clone()
    };

    let done = |env: &mut Env, var: &str| -> Result {
        assign(env, var, b"?")?;
        let _ = env.unset_var("OPTARG");
        sync_optind(env)?;
        Ok(ExitStatus::FAILURE)
    };

    // The index is one-based over the operand list.
    loop {
        let index = env.getopts_next;
        let Some(arg) = index.checked_sub(1).and_then(|i| operands.get(i)) else {
            return done(env, &var);
        };
        if env.getopts_offset == 0 {
            if arg == b"--" {
                env.getopts_next += 1;
                return done(env, &var);
            }
            if arg.len() < 2 || arg[0] != b'-' {
                return done(env, &var);
            }
            env.getopts_offset = 1;
        }

        let Some(&letter) = arg.get(env.getopts_offset) else {
            env.getopts_next += 1;
            env.getopts_offset = 0;
            continue;
        };
        env.getopts_offset += 1;
        if env.getopts_offset >= arg.len() {
            env.getopts_next += 1;
            env.getopts_offset = 0;
        }

        let spec = optstring.iter().position(|&b| b == letter);
        let Some(spec) = spec else {
            // Unknown option.
            if silent {
                assign(env, "OPTARG", &[letter])?;
            } else {
                let _ = env.unset_var("OPTARG");
                env.out2.push_str(&format!(
                    "{}: getopts: illegal option -- {}\n",
                    env.arg0, letter as char
                ));
                env.out2.flush();
            }
            assign(env, &var, b"?")?;
            sync_optind(env)?;
            return Ok(ExitStatus::SUCCESS);
        };

        let wants_argument = optstring.get(spec + 1) == Some(&b':');
        if wants_argument {
            let value: Vec<u8> = if env.getopts_offset > 0 {
                // Rest of this argument.
                let rest = arg[env.getopts_offset..].to_vec();
                env.getopts_next += 1;
                env.getopts_offset = 0;
                rest
            } else {
                match operands.get(env.getopts_next - 1) {
                    Some(next) => {
                        env.getopts_next += 1;
                        next.clone()
                    }
                    None => {
                        // Missing option argument.
                        if silent {
                            assign(env, "OPTARG", &[letter])?;
                            assign(env, &var, b":")?;
                        } else {
                            let _ = env.unset_var("OPTARG");
                            env.out2.push_str(&format!(
                                "{}: getopts: option requires an argument -- {}\n",
                                env.arg0, letter as char
                            ));
                            env.out2.flush();
                            assign(env, &var, b"?")?;
                        }
                        sync_optind(env)?;
                        return Ok(ExitStatus::SUCCESS);
                    }
                }
            };
            assign(env, "OPTARG", &value)?;
        } else {
            let _ = env.unset_var("OPTARG");
        }
        assign(env, &var, &[letter])?;
        sync_optind(env)?;
        return Ok(ExitStatus::SUCCESS);
    }
}
