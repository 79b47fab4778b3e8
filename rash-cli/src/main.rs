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

//! The `rash` command

mod startup;

use rash_env::option::ShellOption;
use rash_env::semantics::{Divert, ExitStatus};
use rash_env::Env;
use rash_semantics::trap_run::run_exit_trap;
use rash_syntax::input::InputStack;
use rash_syntax::parser::lex::Lexer;
use startup::{CommandSource, Invocation};
use std::os::fd::IntoRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::ffi::OsStringExt;

fn main() {
    let argv: Vec<Vec<u8>> = std::env::args_os()
        .map(std::ffi::OsString::into_vec)
        .collect();
    let invocation = match startup::parse_arguments(argv) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("rash: {e}");
            eprintln!("usage: rash [-abCEefIimnuVvx] [-o option] [-c command | file] [arg...]");
            std::process::exit(2);
        }
    };
    let status = run(invocation);
    std::process::exit(status.0);
}

fn run(invocation: Invocation) -> ExitStatus {
    let mut env = Env::new();
    env.arg0 = invocation.arg0;
    env.options = invocation.options;
    env.positional = invocation.positional;
    env.builtins.extend(rash_builtin::BUILTINS.iter().cloned());
    startup::initialize_variables(&mut env);

    // An option-less shell on a terminal is interactive.
    if invocation.source == CommandSource::Stdin {
        env.options |= ShellOption::Stdin;
        let on_tty = nix::unistd::isatty(std::io::stdin()).unwrap_or(false)
            && nix::unistd::isatty(std::io::stderr()).unwrap_or(false);
        if on_tty && !env.options.contains(ShellOption::Interactive) {
            env.options |= ShellOption::Interactive;
        }
    }
    if env.interactive() && !env.options.contains(ShellOption::Monitor) {
        env.options |= ShellOption::Monitor;
    }

    let interactive = env.interactive();
    let job_control = env.job_control() && interactive;
    env.traps
        .initialize_dispositions(interactive, job_control);
    if job_control {
        // The shell runs in its own process group and owns the
        // terminal.
        let pid = nix::unistd::getpid();
        let _ = nix::unistd::setpgid(pid, pid);
        // SAFETY: plain tcsetpgrp on the controlling terminal.
        unsafe { libc::tcsetpgrp(2, pid.as_raw()) };
    }

    if invocation.login {
        source_if_readable(&mut env, b"/etc/profile");
        if let Some(home) = env.variables.get("HOME").map(<[u8]>::to_vec) {
            let mut profile = home;
            profile.extend_from_slice(b"/.profile");
            source_if_readable(&mut env, &profile);
        }
    }
    if interactive {
        if let Some(env_file) = env.variables.get("ENV").map(<[u8]>::to_vec) {
            source_if_readable(&mut env, &env_file);
        }
    }

    let mut input = match invocation.source {
        CommandSource::Text(text) => InputStack::from_text(text),
        CommandSource::Stdin => {
            InputStack::from_reader(rash_env::input::FdReader::new(0))
        }
        CommandSource::File(path) => {
            let file = match std::fs::File::open(std::ffi::OsStr::from_bytes(&path)) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!(
                        "{}: cannot open {}: {e}",
                        env.arg0,
                        String::from_utf8_lossy(&path)
                    );
                    return ExitStatus::ERROR;
                }
            };
            // Keep the script away from the user-visible descriptors.
            let fd = file.into_raw_fd();
            let moved = nix::fcntl::fcntl(
                // SAFETY: we just received this descriptor from open.
                unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) },
                nix::fcntl::FcntlArg::F_DUPFD_CLOEXEC(10),
            )
            .unwrap_or(fd);
            if moved != fd {
                // SAFETY: closing the original after duplication.
                unsafe { libc::close(fd) };
            }
            InputStack::from_reader(rash_env::input::FdReader::new(moved))
        }
    };
    input.interactive = interactive;
    let mut lexer = Lexer::new(input);

    let result = rash_semantics::read_eval_loop(&mut env, &mut lexer, true);
    match result {
        Ok(()) | Err(Divert::Exit) => {}
        Err(Divert::Interrupt) => {
            env.exit_status = ExitStatus::from_signal(libc::SIGINT);
        }
        Err(Divert::Error) => {}
        Err(Divert::Break { .. } | Divert::Continue { .. } | Divert::Return) => {}
    }
    run_exit_trap(&mut env);
    env.flush_outputs();
    env.exit_status
}

/// Sources a startup file if it exists, tolerating every failure.
fn source_if_readable(env: &mut Env, path: &[u8]) {
    let Ok(file) = std::fs::File::open(std::ffi::OsStr::from_bytes(path)) else {
        return;
    };
    let input = InputStack::from_reader(file);
    let mut lexer = Lexer::new(input);
    let _ = rash_semantics::read_eval_loop(env, &mut lexer, false);
}
