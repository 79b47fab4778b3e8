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

//! The read-eval loop
//!
//! One command at a time: parse a complete command from the lexer,
//! evaluate it, reclaim the per-command arena allocations, repeat. The
//! top-level loop is also where unwinds land: an interactive shell
//! resets its transient state (redirections, local frames, pending
//! input) and shows a new prompt; a non-interactive shell terminates.

use crate::command::{eval_tree, reap_background, EvalFlags};
use rash_env::job::JobSet;
use rash_env::option::ShellOption;
use rash_env::semantics::{Divert, ExitStatus, Result};
use rash_env::Env;
use rash_syntax::input::InputStack;
use rash_syntax::parser::lex::Lexer;
use rash_syntax::parser::{ParsedLine, Parser};

/// Runs commands from the lexer until end of input.
///
/// This is the shell's main loop when `top` is set: interactive
/// recovery applies, prompts are issued, and background jobs are
/// reported between commands. Nested invocations (dot scripts) run with
/// `top` unset so unwinds reach the enclosing loop.
pub fn read_eval_loop(env: &mut Env, lexer: &mut Lexer, top: bool) -> Result<()> {
    loop {
        reap_background(env);
        let interactive = env.interactive();
        if interactive {
            notify_changed_jobs(env);
            let ps1 = env
                .lookup_var("PS1")
                .unwrap_or_else(|| b"$ ".to_vec());
            lexer.input.set_prompt(ps1);
            lexer.ps2 = env.lookup_var("PS2").unwrap_or_else(|| b"> ".to_vec());
        }
        lexer.input.echo = env.options.contains(ShellOption::Verbose);

        let mark = env.arena.mark();
        let parsed = {
            let mut parser = Parser::new(lexer, &env.aliases);
            parser.parse_line()
        };

        let outcome = match parsed {
            Err(error) => {
                let lineno = error.lineno;
                env.lineno = lineno;
                let result: Result<()> = env.sh_error(format_args!("{error}"));
                lexer.input.flush_buffered();
                result
            }
            Ok(ParsedLine::Eof) => {
                env.arena.release(mark);
                if interactive && env.options.contains(ShellOption::Ignoreeof) {
                    env.out2.push_str("\nUse \"exit\" to leave shell.\n");
                    env.out2.flush();
                    continue;
                }
                return Ok(());
            }
            Ok(ParsedLine::Blank) => {
                env.arena.release(mark);
                continue;
            }
            Ok(ParsedLine::Command(node)) => {
                if env.options.contains(ShellOption::Noexec) {
                    Ok(())
                } else {
                    eval_tree(env, &node, EvalFlags::empty())
                }
            }
        };
        env.arena.release(mark);

        match outcome {
            Ok(()) => {}
            Err(Divert::Interrupt) if top && interactive => recover(env),
            Err(Divert::Error) if top && interactive => recover(env),
            // A stray break/continue/return outside its construct is
            // tolerated at the top level.
            Err(Divert::Break { .. } | Divert::Continue { .. } | Divert::Return) if top => {}
            Err(divert) => return Err(divert),
        }
    }
}

/// Puts the interpreter back into a consistent state after an unwind
/// reached the interactive top level.
fn recover(env: &mut Env) {
    env.redir_stack.unwind_all();
    while env.variables.in_function() {
        env.variables.pop_frame(false);
    }
    env.fn_depth = 0;
    env.running_trap = false;
    env.flush_outputs();
}

/// Reports background jobs whose state changed, and forgets the
/// finished ones.
fn notify_changed_jobs(env: &mut Env) {
    let mut lines = Vec::new();
    for (slot, job) in env.jobs.iter() {
        if job.changed && job.job_control {
            lines.push(format!(
                "[{}] {}  {}\n",
                JobSet::number(slot),
                job.state(),
                job.command()
            ));
        }
    }
    if !lines.is_empty() {
        for line in &lines {
            env.out2.push_str(line);
        }
        env.out2.flush();
    }
    // Mark everything reported and drop finished jobs.
    let slots: Vec<usize> = env.jobs.iter().map(|(s, _)| s).collect();
    for slot in slots {
        if let Some(job) = env.jobs.get_mut(slot) {
            if job.job_control {
                job.changed = false;
            }
        }
    }
    env.jobs.reap_reported();
}

/// Evaluates commands from a byte string (trap actions, `eval`).
///
/// Syntax errors raise the error unwind; other diverts propagate to the
/// caller.
pub fn eval_string(env: &mut Env, text: &[u8]) -> Result<()> {
    let saved_lineno = env.lineno;
    let mut lexer = Lexer::new(InputStack::from_text(text.to_vec()));
    let result = read_eval_loop(env, &mut lexer, false);
    env.lineno = saved_lineno;
    result
}

/// Runs a command-substitution source in a forked child and reports the
/// status to exit with. Never unwinds.
pub fn run_subshell_source(env: &mut Env, source: &[u8]) -> ExitStatus {
    match eval_string(env, source) {
        Ok(())
        | Err(Divert::Exit)
        | Err(Divert::Error)
        | Err(Divert::Break { .. })
        | Err(Divert::Continue { .. })
        | Err(Divert::Return) => env.exit_status,
        Err(Divert::Interrupt) => ExitStatus::from_signal(libc::SIGINT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rash_env::variable::VarFlags;

    fn run(env: &mut Env, script: &str) -> Result<()> {
        eval_string(env, script.as_bytes())
    }

    #[test]
    fn runs_multiple_lines() {
        let mut env = Env::new();
        run(&mut env, "x=1\ny=2\nz=$x$y\n").unwrap();
        assert_eq!(env.variables.get("z"), Some(&b"12"[..]));
    }

    #[test]
    fn multi_line_constructs() {
        let mut env = Env::new();
        run(&mut env, "if x=1\nthen\n  r=then\nfi\n").unwrap();
        assert_eq!(env.variables.get("r"), Some(&b"then"[..]));
    }

    #[test]
    fn syntax_error_unwinds_with_status_2() {
        let mut env = Env::new();
        assert_eq!(run(&mut env, "fi\n"), Err(Divert::Error));
        assert_eq!(env.exit_status, ExitStatus::ERROR);
    }

    #[test]
    fn noexec_skips_execution() {
        let mut env = Env::new();
        env.options |= ShellOption::Noexec;
        run(&mut env, "x=set\n").unwrap();
        assert_eq!(env.variables.get("x"), None);
    }

    #[test]
    fn exit_status_flows_between_commands() {
        let mut env = Env::new();
        env.builtins.insert(
            "fail",
            rash_env::builtin::Builtin {
                kind: rash_env::builtin::BuiltinKind::Regular,
                execute: |_env, _args| Ok(ExitStatus::FAILURE),
            },
        );
        run(&mut env, "fail\ns=$?\n").unwrap();
        assert_eq!(env.variables.get("s"), Some(&b"1"[..]));
    }

    #[test]
    fn command_substitution_captures_output() {
        let mut env = Env::new();
        // Use the real /bin/echo through a controlled PATH.
        env.set_var("PATH", b"/bin:/usr/bin".to_vec(), VarFlags::empty())
            .unwrap();
        run(&mut env, "out=$(echo captured)\n").unwrap();
        assert_eq!(env.variables.get("out"), Some(&b"captured"[..]));
    }

    #[test]
    fn backquote_substitution() {
        let mut env = Env::new();
        env.set_var("PATH", b"/bin:/usr/bin".to_vec(), VarFlags::empty())
            .unwrap();
        run(&mut env, "out=`echo old style`\n").unwrap();
        assert_eq!(env.variables.get("out"), Some(&b"old style"[..]));
    }

    #[test]
    fn substitution_exit_status_for_assignment_only_command() {
        let mut env = Env::new();
        env.set_var("PATH", b"/bin:/usr/bin".to_vec(), VarFlags::empty())
            .unwrap();
        run(&mut env, "x=$(sh -c 'exit 4')\n").unwrap();
        assert_eq!(env.exit_status, ExitStatus(4));
    }
}
