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

//! The evaluator
//!
//! [`eval_tree`] walks an abstract syntax tree, expanding words as it
//! goes and updating `$?` after every command. Non-local control
//! (`break`, `return`, errors, interrupts, `exit`) travels as
//! [`Divert`] values; loops and function calls absorb the diverts
//! addressed to them and pass the rest up.

use crate::expand::{expand_assignments, expand_pattern, expand_word, expand_words};
use crate::redir::apply_redirs;
use crate::search::{find_command, CommandLocation};
use bitflags::bitflags;
use rash_env::builtin::Builtin;
use rash_env::function::Function;
use rash_env::job::{Job, JobState, Pid, Process};
use rash_env::semantics::{Divert, ExitStatus, Field, Result};
use rash_env::variable::VarFlags;
use rash_env::{interrupt, option::ShellOption, trap, Env};
use rash_fnmatch::Pattern;
use rash_syntax::syntax::{self, CaseClause, Node, Redir, Word};
use std::ffi::CString;
use std::os::fd::AsRawFd;
use std::rc::Rc;

bitflags! {
    /// Hints threaded through the tree walk
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct EvalFlags: u8 {
        /// This is the last command on the execution path; a fork may be
        /// skipped.
        const EXIT = 1 << 0;
        /// The exit status is about to be examined; `errexit` must not
        /// trigger.
        const TESTED = 1 << 1;
    }
}

/// Evaluates one node of the tree.
pub fn eval_tree(env: &mut Env, node: &Node, flags: EvalFlags) -> Result<()> {
    crate::trap_run::run_pending_traps(env)?;
    env.poll_interrupt()?;

    if let Some(linno) = node.linno() {
        env.lineno = linno;
    }

    match node {
        Node::Cmd { .. } => eval_command(env, node, flags)?,
        Node::Pipe {
            background,
            commands,
        } => eval_pipeline(env, commands, *background)?,
        Node::Redirected { body, redirs, .. } => {
            eval_redirected(env, body, redirs, flags)?;
        }
        Node::Subshell { body, redirs, .. } => eval_subshell(env, body, redirs)?,
        Node::Background { body } => eval_background(env, body)?,
        Node::And { left, right } => {
            eval_tree(env, left, flags | EvalFlags::TESTED)?;
            if env.exit_status.is_success() {
                eval_tree(env, right, flags)?;
            }
        }
        Node::Or { left, right } => {
            eval_tree(env, left, flags | EvalFlags::TESTED)?;
            if !env.exit_status.is_success() {
                eval_tree(env, right, flags)?;
            }
        }
        Node::Semi { left, right } => {
            eval_tree(env, left, flags & EvalFlags::TESTED)?;
            eval_tree(env, right, flags)?;
        }
        Node::Not { body } => {
            eval_tree(env, body, flags | EvalFlags::TESTED)?;
            env.exit_status = if env.exit_status.is_success() {
                ExitStatus::FAILURE
            } else {
                ExitStatus::SUCCESS
            };
        }
        Node::If {
            condition,
            then_body,
            else_body,
        } => {
            eval_tree(env, condition, flags | EvalFlags::TESTED)?;
            if env.exit_status.is_success() {
                eval_tree(env, then_body, flags)?;
            } else if let Some(else_body) = else_body {
                eval_tree(env, else_body, flags)?;
            } else {
                env.exit_status = ExitStatus::SUCCESS;
            }
        }
        Node::While { condition, body } => eval_loop(env, condition, body, flags, false)?,
        Node::Until { condition, body } => eval_loop(env, condition, body, flags, true)?,
        Node::For {
            var, words, body, ..
        } => eval_for(env, var, words.as_deref(), body, flags)?,
        Node::Case {
            subject, clauses, ..
        } => eval_case(env, subject, clauses, flags)?,
        Node::FunctionDef { name, body, .. } => {
            env.functions.define(name.clone(), Rc::clone(body));
            env.exit_status = ExitStatus::SUCCESS;
        }
    }

    // set -e: a failing untested command ends the shell.
    if env.options.contains(ShellOption::Errexit)
        && !flags.contains(EvalFlags::TESTED)
        && !env.exit_status.is_success()
        && matches!(
            node,
            Node::Cmd { .. } | Node::Pipe { .. } | Node::Subshell { .. } | Node::Redirected { .. }
        )
    {
        return Err(Divert::Exit);
    }
    Ok(())
}

/// Runs the body of a loop, absorbing the diverts addressed to this
/// loop level.
enum LoopStep {
    Normal,
    BreakLoop,
    ContinueLoop,
}

fn loop_step(env: &mut Env, node: &Node, flags: EvalFlags) -> Result<LoopStep> {
    match eval_tree(env, node, flags & EvalFlags::TESTED) {
        Ok(()) => Ok(LoopStep::Normal),
        Err(Divert::Break { count }) => {
            if count > 1 {
                Err(Divert::Break { count: count - 1 })
            } else {
                Ok(LoopStep::BreakLoop)
            }
        }
        Err(Divert::Continue { count }) => {
            if count > 1 {
                Err(Divert::Continue { count: count - 1 })
            } else {
                Ok(LoopStep::ContinueLoop)
            }
        }
        Err(other) => Err(other),
    }
}

fn eval_loop(
    env: &mut Env,
    condition: &Node,
    body: &Node,
    flags: EvalFlags,
    until: bool,
) -> Result<()> {
    let mut status = ExitStatus::SUCCESS;
    loop {
        match loop_step(env, condition, flags | EvalFlags::TESTED)? {
            LoopStep::BreakLoop => break,
            LoopStep::ContinueLoop => continue,
            LoopStep::Normal => {}
        }
        if env.exit_status.is_success() == until {
            break;
        }
        match loop_step(env, body, flags)? {
            LoopStep::BreakLoop => {
                status = env.exit_status;
                break;
            }
            LoopStep::ContinueLoop | LoopStep::Normal => status = env.exit_status,
        }
    }
    env.exit_status = status;
    Ok(())
}

fn eval_for(
    env: &mut Env,
    var: &str,
    words: Option<&[Word]>,
    body: &Node,
    flags: EvalFlags,
) -> Result<()> {
    let values: Vec<Field> = match words {
        Some(words) => expand_words(env, words)?,
        None => env.positional.iter().cloned().map(Field::new).collect(),
    };
    let mut status = ExitStatus::SUCCESS;
    for value in values {
        if let Err(e) = env.set_var(var, value.value, VarFlags::empty()) {
            return env.sh_error(format_args!("{e}"));
        }
        match loop_step(env, body, flags)? {
            LoopStep::BreakLoop => {
                status = env.exit_status;
                break;
            }
            LoopStep::ContinueLoop | LoopStep::Normal => status = env.exit_status,
        }
    }
    env.exit_status = status;
    Ok(())
}

fn eval_case(
    env: &mut Env,
    subject: &Word,
    clauses: &[CaseClause],
    flags: EvalFlags,
) -> Result<()> {
    let subject = expand_word(env, subject)?;
    for clause in clauses {
        for pattern_word in &clause.patterns {
            let units = expand_pattern(env, pattern_word)?;
            let pattern = match Pattern::parse(units) {
                Ok(pattern) => pattern,
                Err(e) => return env.sh_error(format_args!("bad pattern: {e}")),
            };
            if pattern.is_match(&subject.value) {
                env.exit_status = ExitStatus::SUCCESS;
                if let Some(body) = &clause.body {
                    eval_tree(env, body, flags)?;
                }
                return Ok(());
            }
        }
    }
    env.exit_status = ExitStatus::SUCCESS;
    Ok(())
}

fn eval_redirected(env: &mut Env, body: &Node, redirs: &[Redir], flags: EvalFlags) -> Result<()> {
    env.redir_stack.push_frame();
    if let Err(divert) = apply_redirs(env, redirs, true) {
        env.redir_stack.pop_frame_restore();
        return Err(divert);
    }
    let result = eval_tree(env, body, flags & EvalFlags::TESTED);
    env.redir_stack.pop_frame_restore();
    result
}

fn eval_subshell(env: &mut Env, body: &Node, redirs: &[Redir]) -> Result<()> {
    use nix::unistd::ForkResult;
    env.flush_outputs();
    // SAFETY: the child runs the interpreter and exits.
    match unsafe { nix::unistd::fork() } {
        Err(e) => env.sh_error(format_args!("cannot fork: {e}")),
        Ok(ForkResult::Child) => {
            env.enter_subshell();
            let result = apply_redirs(env, redirs, false)
                .and_then(|()| eval_tree(env, body, EvalFlags::EXIT));
            child_exit(env, result)
        }
        Ok(ForkResult::Parent { child }) => {
            let slot = start_foreground_job(env, child, command_text(body));
            env.exit_status = wait_for_job(env, slot);
            Ok(())
        }
    }
}

fn eval_background(env: &mut Env, body: &Node) -> Result<()> {
    use nix::unistd::ForkResult;
    env.flush_outputs();
    let job_control = env.job_control() && !env.in_subshell;
    // SAFETY: the child runs the interpreter and exits.
    match unsafe { nix::unistd::fork() } {
        Err(e) => env.sh_error(format_args!("cannot fork: {e}")),
        Ok(ForkResult::Child) => {
            env.enter_subshell();
            if job_control {
                let _ = nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
            } else {
                // A background child without job control must not be
                // killed by keyboard signals, and reads from /dev/null.
                trap::ignore_signal(libc::SIGINT);
                trap::ignore_signal(libc::SIGQUIT);
                if let Ok(null) = std::fs::File::open("/dev/null") {
                    let _ = rash_env::redir::dup2_raw(null.as_raw_fd(), 0);
                }
            }
            let result = eval_tree(env, body, EvalFlags::EXIT);
            child_exit(env, result)
        }
        Ok(ForkResult::Parent { child }) => {
            if job_control {
                let _ = nix::unistd::setpgid(child, child);
            }
            let mut job = Job::new();
            job.procs.push(Process::new(child, command_text(body)));
            job.pgid = job_control.then_some(child);
            job.job_control = job_control;
            env.jobs.add(job);
            env.jobs.set_last_async_pid(child);
            env.exit_status = ExitStatus::SUCCESS;
            Ok(())
        }
    }
}

fn eval_pipeline(env: &mut Env, commands: &[Node], background: bool) -> Result<()> {
    use nix::unistd::ForkResult;

    let count = commands.len();
    let mut pipes = Vec::with_capacity(count - 1);
    for _ in 1..count {
        match nix::unistd::pipe() {
            Ok(ends) => pipes.push(ends),
            Err(e) => return env.sh_error(format_args!("cannot create pipe: {e}")),
        }
    }

    env.flush_outputs();
    let job_control = env.job_control() && !env.in_subshell;
    let mut procs: Vec<Process> = Vec::with_capacity(count);
    let mut pgid: Option<Pid> = None;

    for (i, command) in commands.iter().enumerate() {
        // SAFETY: each child runs the interpreter and exits.
        match unsafe { nix::unistd::fork() } {
            Err(e) => {
                // Children already started keep running; give up on the
                // rest of the pipeline.
                drop(pipes);
                return env.sh_error(format_args!("cannot fork: {e}"));
            }
            Ok(ForkResult::Child) => {
                env.enter_subshell();
                if job_control {
                    let group = pgid.unwrap_or(Pid::from_raw(0));
                    let _ = nix::unistd::setpgid(Pid::from_raw(0), group);
                }
                if i > 0 {
                    let _ = rash_env::redir::dup2_raw(pipes[i - 1].0.as_raw_fd(), 0);
                }
                if i < count - 1 {
                    let _ = rash_env::redir::dup2_raw(pipes[i].1.as_raw_fd(), 1);
                }
                drop(pipes);
                let result = eval_tree(env, command, EvalFlags::EXIT);
                child_exit(env, result)
            }
            Ok(ForkResult::Parent { child }) => {
                if job_control {
                    let group = pgid.unwrap_or(child);
                    let _ = nix::unistd::setpgid(child, group);
                }
                pgid.get_or_insert(child);
                procs.push(Process::new(child, command_text(command)));
            }
        }
    }
    drop(pipes);

    let mut job = Job::new();
    job.procs = procs;
    job.pgid = job_control.then_some(pgid.expect("pipeline has processes"));
    job.job_control = job_control;
    let slot = env.jobs.add(job);

    if background {
        if let Some(last) = env.jobs.get(slot).and_then(|j| j.procs.last()) {
            let pid = last.pid;
            env.jobs.set_last_async_pid(pid);
        }
        env.exit_status = ExitStatus::SUCCESS;
    } else {
        if job_control {
            // SAFETY: plain tcsetpgrp on the controlling terminal.
            unsafe { libc::tcsetpgrp(2, pgid.expect("pipeline has processes").as_raw()) };
        }
        env.exit_status = wait_for_job(env, slot);
    }
    Ok(())
}

/// Terminates a forked child, translating any unwind into an exit code.
pub(crate) fn child_exit(env: &mut Env, result: Result<()>) -> ! {
    if let Err(Divert::Interrupt) = result {
        env.exit_status = ExitStatus::from_signal(libc::SIGINT);
    }
    env.flush_outputs();
    // SAFETY: terminating a forked child without unwinding the parent's
    // state.
    unsafe { libc::_exit(env.exit_status.0) }
}

fn start_foreground_job(env: &mut Env, pid: Pid, text: String) -> usize {
    let mut job = Job::new();
    job.procs.push(Process::new(pid, text));
    env.jobs.add(job)
}

/// Blocks until the job is done (or stopped, under job control) and
/// returns its exit status. Finished jobs are removed from the table.
pub fn wait_for_job(env: &mut Env, slot: usize) -> ExitStatus {
    use nix::sys::wait::{waitpid, WaitPidFlag};

    loop {
        match env.jobs.get(slot).map(Job::state) {
            None => return ExitStatus::SUCCESS,
            Some(JobState::Done) => break,
            Some(JobState::Stopped) if env.job_control() => break,
            _ => {}
        }
        let flags = env
            .job_control()
            .then_some(WaitPidFlag::WUNTRACED);
        match waitpid(Pid::from_raw(-1), flags) {
            Ok(status) => {
                if let Some(pid) = status.pid() {
                    let _critical = interrupt::CriticalSection::enter();
                    env.jobs.record_status(pid, status);
                }
            }
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => break,
        }
    }

    let status = env
        .jobs
        .get(slot)
        .map_or(ExitStatus::SUCCESS, Job::exit_status);
    if env.jobs.get(slot).is_some_and(|j| j.state() == JobState::Done) {
        let _critical = interrupt::CriticalSection::enter();
        env.jobs.remove(slot);
    }
    if env.job_control() && !env.in_subshell {
        // Take the terminal back from the finished foreground job.
        // SAFETY: plain tcsetpgrp on the controlling terminal.
        unsafe { libc::tcsetpgrp(2, libc::getpgrp()) };
    }
    status
}

/// Collects finished background children without blocking.
pub fn reap_background(env: &mut Env) {
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    loop {
        let mut flags = WaitPidFlag::WNOHANG;
        if env.job_control() {
            flags |= WaitPidFlag::WUNTRACED;
        }
        match waitpid(Pid::from_raw(-1), Some(flags)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => match status.pid() {
                Some(pid) => {
                    let _critical = interrupt::CriticalSection::enter();
                    env.jobs.record_status(pid, status);
                }
                None => break,
            },
            Err(_) => break,
        }
    }
}

/// Evaluates a simple command.
fn eval_command(env: &mut Env, node: &Node, flags: EvalFlags) -> Result<()> {
    let Node::Cmd {
        assigns,
        args,
        redirs,
        ..
    } = node
    else {
        unreachable!("eval_command is only called on Cmd nodes");
    };

    env.back_exit_status = ExitStatus::SUCCESS;
    let fields = expand_words(env, args)?;
    let assignments = expand_assignments(env, assigns)?;

    if env.options.contains(ShellOption::Xtrace) {
        print_xtrace(env, &assignments, &fields);
    }

    if fields.is_empty() {
        // Assignment-only command; redirections are performed and
        // undone. An open failure fails the command without aborting
        // the script.
        if !redirs.is_empty() {
            env.redir_stack.push_frame();
            let result = apply_redirs(env, redirs, true);
            env.redir_stack.pop_frame_restore();
            if let Err(divert) = result {
                return absorb_redir_error(divert);
            }
        }
        apply_assignments(env, assignments, VarFlags::empty())?;
        env.exit_status = env.back_exit_status;
        return Ok(());
    }

    let name = match fields[0].to_str() {
        Some(name) => name.to_owned(),
        None => {
            return env.sh_error(format_args!("{}: not found", fields[0]));
        }
    };

    // `exec` applies its redirections permanently.
    let permanent_redirs = name == "exec";

    match find_command(env, &name, None, false) {
        CommandLocation::Function(function) => {
            env.redir_stack.push_frame();
            if let Err(divert) = apply_redirs(env, redirs, true) {
                env.redir_stack.pop_frame_restore();
                return absorb_redir_error(divert);
            }
            apply_assignments(env, assignments, VarFlags::empty())?;
            let result = call_function(env, &function, fields);
            env.redir_stack.pop_frame_restore();
            result
        }
        CommandLocation::Builtin(builtin) => {
            if !permanent_redirs {
                env.redir_stack.push_frame();
            }
            if let Err(divert) = apply_redirs(env, redirs, !permanent_redirs) {
                if !permanent_redirs {
                    env.redir_stack.pop_frame_restore();
                }
                // Only a special built-in's redirection failure aborts
                // the script.
                if builtin.is_special() {
                    return Err(divert);
                }
                return absorb_redir_error(divert);
            }
            let assignment_result = apply_assignments(env, assignments, VarFlags::empty());
            let result = match assignment_result {
                Ok(()) => run_builtin(env, builtin, fields),
                Err(divert) => Err(divert),
            };
            if !permanent_redirs {
                env.redir_stack.pop_frame_restore();
            }
            env.exit_status = result?;
            Ok(())
        }
        location @ (CommandLocation::External { .. } | CommandLocation::NotFound) => {
            let path = match location {
                CommandLocation::External { path } => path,
                _ => {
                    env.out2
                        .push_str(&format!("{}: {name}: not found\n", env.arg0));
                    env.out2.flush();
                    env.exit_status = ExitStatus::NOT_FOUND;
                    return Ok(());
                }
            };
            run_external(env, &path, fields, assignments, redirs, flags)
        }
    }
}

/// Converts a redirection failure on an ordinary command into a plain
/// non-zero exit status: the command does not run, the script goes on.
fn absorb_redir_error(divert: Divert) -> Result<()> {
    match divert {
        Divert::Error => Ok(()),
        other => Err(other),
    }
}

/// Applies expanded assignments to the current scope.
fn apply_assignments(
    env: &mut Env,
    assignments: Vec<(String, Vec<u8>)>,
    extra_flags: VarFlags,
) -> Result<()> {
    for (name, value) in assignments {
        if let Err(e) = env.set_var(&name, value, extra_flags) {
            return env.sh_error(format_args!("{e}"));
        }
    }
    Ok(())
}

/// Calls a shell function with its own positional parameters and local
/// variable frame.
fn call_function(env: &mut Env, function: &Function, fields: Vec<Field>) -> Result<()> {
    let new_positional: Vec<Vec<u8>> =
        fields.into_iter().skip(1).map(|f| f.value).collect();
    let saved_positional = std::mem::replace(&mut env.positional, new_positional);
    let saved_lineno = env.lineno;
    env.variables.push_frame();
    env.fn_depth += 1;

    let result = match eval_tree(env, &function.body, EvalFlags::empty()) {
        Ok(()) | Err(Divert::Return) => Ok(()),
        Err(other) => Err(other),
    };

    env.fn_depth -= 1;
    if let Some(options) = env.variables.pop_frame(false) {
        // `local -` was used: the whole option vector comes back.
        env.options = options;
    }
    env.positional = saved_positional;
    env.lineno = saved_lineno;
    result
}

/// Runs a built-in with the wrapper contract: standard output is
/// flushed afterwards, and an error unwind is absorbed unless the
/// built-in is special.
fn run_builtin(env: &mut Env, builtin: Builtin, fields: Vec<Field>) -> Result<ExitStatus> {
    let result = (builtin.execute)(env, fields);
    env.out1.flush();
    match result {
        Ok(status) => Ok(status),
        Err(Divert::Error) if !builtin.is_special() => Ok(env.exit_status),
        Err(divert) => Err(divert),
    }
}

/// Runs an external command, by forking or, on the exit path, in place.
fn run_external(
    env: &mut Env,
    path: &[u8],
    fields: Vec<Field>,
    assignments: Vec<(String, Vec<u8>)>,
    redirs: &[Redir],
    flags: EvalFlags,
) -> Result<()> {
    use nix::unistd::ForkResult;

    if flags.contains(EvalFlags::EXIT) && env.traps.count() == 0 {
        // Tail position: no fork needed, this process becomes the
        // command.
        apply_redirs(env, redirs, false)?;
        apply_assignments(env, assignments, VarFlags::EXPORTED)?;
        exec_child(env, path, &fields)
    }

    env.flush_outputs();
    let job_control = env.job_control() && !env.in_subshell;
    // SAFETY: the child execs or exits.
    match unsafe { nix::unistd::fork() } {
        Err(e) => env.sh_error(format_args!("cannot fork: {e}")),
        Ok(ForkResult::Child) => {
            env.enter_subshell();
            if job_control {
                let _ = nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0));
                // SAFETY: plain tcsetpgrp on the controlling terminal.
                unsafe { libc::tcsetpgrp(2, nix::unistd::getpid().as_raw()) };
            }
            let result = apply_redirs(env, redirs, false)
                .and_then(|()| apply_assignments(env, assignments, VarFlags::EXPORTED));
            if result.is_err() {
                child_exit(env, result);
            }
            exec_child(env, path, &fields)
        }
        Ok(ForkResult::Parent { child }) => {
            if job_control {
                let _ = nix::unistd::setpgid(child, child);
                // SAFETY: plain tcsetpgrp on the controlling terminal.
                unsafe { libc::tcsetpgrp(2, child.as_raw()) };
            }
            let text = fields_text(&fields);
            let slot = start_foreground_job(env, child, text);
            if job_control {
                if let Some(job) = env.jobs.get_mut(slot) {
                    job.pgid = Some(child);
                    job.job_control = true;
                }
            }
            env.exit_status = wait_for_job(env, slot);
            Ok(())
        }
    }
}

/// Replaces the current process with the command. Never returns.
pub(crate) fn exec_child(env: &mut Env, path: &[u8], fields: &[Field]) -> ! {
    let argv: Vec<CString> = fields
        .iter()
        .filter_map(|f| f.to_c_string().ok())
        .collect();
    let envp = env.variables.environ();
    let path_c = CString::new(path.to_vec()).unwrap_or_default();

    env.flush_outputs();
    let result = nix::unistd::execve(&path_c, &argv, &envp);
    let errno = result.expect_err("execve only returns on failure");

    if errno == nix::errno::Errno::ENOEXEC {
        // A script without a #! line runs under the default
        // interpreter.
        let mut script_argv = Vec::with_capacity(argv.len() + 1);
        script_argv.push(CString::new("/bin/sh").expect("static string"));
        script_argv.push(path_c.clone());
        script_argv.extend(argv.iter().skip(1).cloned());
        let sh = CString::new("/bin/sh").expect("static string");
        let _ = nix::unistd::execve(&sh, &script_argv, &envp);
    }

    let status = match errno {
        nix::errno::Errno::ENOENT | nix::errno::Errno::ENOTDIR => ExitStatus::NOT_FOUND,
        _ => ExitStatus::NOT_EXECUTABLE,
    };
    env.out2.push_str(&format!(
        "{}: {}: {}\n",
        env.arg0,
        String::from_utf8_lossy(path),
        errno.desc()
    ));
    env.out2.flush();
    // SAFETY: terminating a process whose exec failed.
    unsafe { libc::_exit(status.0) }
}

/// Replaces the shell with an external program (the `exec` built-in
/// with operands). Returns only on search failure; a non-interactive
/// shell then terminates.
pub fn exec_program(env: &mut Env, fields: Vec<Field>) -> Result<ExitStatus> {
    let Some(name) = fields.first().and_then(Field::to_str).map(str::to_owned) else {
        return Ok(ExitStatus::SUCCESS);
    };
    match crate::search::find_external(env, &name, None) {
        Some(path) => exec_child(env, &path, &fields),
        None => {
            env.out2
                .push_str(&format!("{}: exec: {name}: not found\n", env.arg0));
            env.out2.flush();
            env.exit_status = ExitStatus::NOT_FOUND;
            if env.interactive() {
                Err(Divert::Error)
            } else {
                Err(Divert::Exit)
            }
        }
    }
}

/// Resolves and runs an already-expanded command line (the `command`
/// built-in and `eval`-style callers).
pub fn run_command_fields(
    env: &mut Env,
    fields: Vec<Field>,
    path_override: Option<&[u8]>,
    skip_functions: bool,
) -> Result<ExitStatus> {
    let Some(name) = fields.first().and_then(Field::to_str).map(str::to_owned) else {
        return Ok(ExitStatus::SUCCESS);
    };
    match find_command(env, &name, path_override, skip_functions) {
        CommandLocation::Function(function) => {
            call_function(env, &function, fields)?;
            Ok(env.exit_status)
        }
        CommandLocation::Builtin(builtin) => run_builtin(env, builtin, fields),
        CommandLocation::External { path } => {
            run_external(env, &path, fields, Vec::new(), &[], EvalFlags::empty())?;
            Ok(env.exit_status)
        }
        CommandLocation::NotFound => {
            env.out2
                .push_str(&format!("{}: {name}: not found\n", env.arg0));
            env.out2.flush();
            Ok(ExitStatus::NOT_FOUND)
        }
    }
}

fn fields_text(fields: &[Field]) -> String {
    use itertools::Itertools;
    fields.iter().map(Field::to_string).join(" ")
}

/// Approximate source text of a node, for the jobs listing.
pub fn command_text(node: &Node) -> String {
    fn word_text(word: &Word) -> String {
        let mut out = String::new();
        let mut iter = word.text.iter().copied();
        while let Some(byte) = iter.next() {
            match byte {
                syntax::CTL_ESC => {
                    if let Some(b) = iter.next() {
                        out.push(b as char);
                    }
                }
                syntax::CTL_QUOTEMARK => {}
                syntax::CTL_BACKQ => out.push_str("$(...)"),
                b if syntax::is_ctl(b) => {}
                b => out.push(b as char),
            }
        }
        out
    }

    match node {
        Node::Cmd { assigns, args, .. } => {
            let mut parts: Vec<String> = assigns.iter().map(word_text).collect();
            parts.extend(args.iter().map(word_text));
            parts.join(" ")
        }
        Node::Pipe { commands, .. } => commands
            .iter()
            .map(command_text)
            .collect::<Vec<_>>()
            .join(" | "),
        Node::Background { body } => format!("{} &", command_text(body)),
        Node::Subshell { body, .. } => format!("({})", command_text(body)),
        Node::Not { body } => format!("! {}", command_text(body)),
        Node::And { left, right } => {
            format!("{} && {}", command_text(left), command_text(right))
        }
        Node::Or { left, right } => {
            format!("{} || {}", command_text(left), command_text(right))
        }
        Node::Semi { left, right } => {
            format!("{}; {}", command_text(left), command_text(right))
        }
        Node::Redirected { body, .. } => command_text(body),
        Node::If { .. } => "if ...".to_owned(),
        Node::While { .. } => "while ...".to_owned(),
        Node::Until { .. } => "until ...".to_owned(),
        Node::For { var, .. } => format!("for {var} ..."),
        Node::Case { .. } => "case ...".to_owned(),
        Node::FunctionDef { name, .. } => format!("{name}()"),
    }
}

fn print_xtrace(env: &mut Env, assignments: &[(String, Vec<u8>)], fields: &[Field]) {
    let ps4 = env
        .lookup_var("PS4")
        .map_or_else(|| "+ ".to_owned(), |v| String::from_utf8_lossy(&v).into_owned());
    let mut line = ps4;
    for (name, value) in assignments {
        line.push_str(name);
        line.push('=');
        line.push_str(&rash_quote::quote(&String::from_utf8_lossy(value)));
        line.push(' ');
    }
    let mut first = true;
    for field in fields {
        if !first {
            line.push(' ');
        }
        first = false;
        line.push_str(&rash_quote::quote(&field.to_string()));
    }
    line.push('\n');
    env.out2.push_str(&line);
    env.out2.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rash_syntax::input::InputStack;
    use rash_syntax::parser::lex::Lexer;
    use rash_syntax::parser::{ParsedLine, Parser};

    fn parse(source: &str) -> Node {
        let mut lexer = Lexer::new(InputStack::from_text(format!("{source}\n")));
        let aliases = rash_syntax::alias::AliasSet::new();
        let mut parser = Parser::new(&mut lexer, &aliases);
        match parser.parse_line().expect("parse error") {
            ParsedLine::Command(node) => node,
            other => panic!("no command: {other:?}"),
        }
    }

    fn eval(env: &mut Env, source: &str) -> Result<()> {
        let node = parse(source);
        eval_tree(env, &node, EvalFlags::empty())
    }

    #[test]
    fn assignment_only_command() {
        let mut env = Env::new();
        eval(&mut env, "x=hello").unwrap();
        assert_eq!(env.variables.get("x"), Some(&b"hello"[..]));
        assert_eq!(env.exit_status, ExitStatus::SUCCESS);
    }

    #[test]
    fn assignment_expands_value() {
        let mut env = Env::new();
        eval(&mut env, "x=1").unwrap();
        eval(&mut env, "y=$x$x").unwrap();
        assert_eq!(env.variables.get("y"), Some(&b"11"[..]));
    }

    #[test]
    fn readonly_assignment_raises() {
        let mut env = Env::new();
        env.variables
            .set("r", b"v".to_vec(), VarFlags::READONLY)
            .unwrap();
        assert_eq!(eval(&mut env, "r=other"), Err(Divert::Error));
        assert_eq!(env.variables.get("r"), Some(&b"v"[..]));
    }

    #[test]
    fn function_definition_and_lookup() {
        let mut env = Env::new();
        eval(&mut env, "f() { x=1; }").unwrap();
        assert!(env.functions.get("f").is_some());
        assert_eq!(env.exit_status, ExitStatus::SUCCESS);
    }

    #[test]
    fn function_call_sets_positional_parameters() {
        let mut env = Env::new();
        eval(&mut env, "f() { v=$1; }").unwrap();
        eval(&mut env, "f argone").unwrap();
        assert_eq!(env.variables.get("v"), Some(&b"argone"[..]));
        // Positional parameters restored afterwards.
        assert!(env.positional.is_empty());
    }

    #[test]
    fn function_local_variables() {
        let mut env = Env::new();
        eval(&mut env, "x=1").unwrap();
        // `local` is provided by the builtin crate; simulate its core
        // effect directly through a function body using assignments.
        eval(&mut env, "f() { x=2; }").unwrap();
        eval(&mut env, "f").unwrap();
        // Without `local`, assignment escapes the function.
        assert_eq!(env.variables.get("x"), Some(&b"2"[..]));
    }

    #[test]
    fn not_negates_status() {
        let mut env = Env::new();
        // An assignment-only command succeeds; `!` flips it.
        eval(&mut env, "! x=1").unwrap();
        assert_eq!(env.exit_status, ExitStatus::FAILURE);
    }

    #[test]
    fn if_statement_chooses_branch() {
        let mut env = Env::new();
        eval(&mut env, "if x=1; then t=yes; else t=no; fi").unwrap();
        assert_eq!(env.variables.get("t"), Some(&b"yes"[..]));
        eval(&mut env, "if ! y=1; then u=yes; else u=no; fi").unwrap();
        assert_eq!(env.variables.get("u"), Some(&b"no"[..]));
    }

    #[test]
    fn for_loop_iterates() {
        let mut env = Env::new();
        eval(&mut env, "for i in a b c; do last=$i; done").unwrap();
        assert_eq!(env.variables.get("last"), Some(&b"c"[..]));
        assert_eq!(env.variables.get("i"), Some(&b"c"[..]));
    }

    #[test]
    fn for_loop_over_positional() {
        let mut env = Env::new();
        env.positional = vec![b"p".to_vec(), b"q".to_vec()];
        eval(&mut env, "for i do got=$got$i; done").unwrap();
        assert_eq!(env.variables.get("got"), Some(&b"pq"[..]));
    }

    #[test]
    fn case_matches_patterns() {
        let mut env = Env::new();
        eval(&mut env, "x=abc").unwrap();
        eval(&mut env, "case $x in a*) m=A;; *) m=B;; esac").unwrap();
        assert_eq!(env.variables.get("m"), Some(&b"A"[..]));
        eval(&mut env, "case zzz in a*) n=A;; *) n=B;; esac").unwrap();
        assert_eq!(env.variables.get("n"), Some(&b"B"[..]));
        assert_eq!(env.exit_status, ExitStatus::SUCCESS);
    }

    #[test]
    fn case_subject_matches_itself_literally() {
        for subject in ["plain", "with space", "a.b-c"] {
            let mut env = Env::new();
            env.set_var("x", subject.as_bytes().to_vec(), VarFlags::empty())
                .unwrap();
            eval(&mut env, "case $x in $x) r=same;; *) r=diff;; esac").unwrap();
            assert_eq!(
                env.variables.get("r"),
                Some(&b"same"[..]),
                "subject {subject}"
            );
        }
    }

    #[test]
    fn while_loop_runs_until_condition_fails() {
        let mut env = Env::new();
        // The condition fails once the subject reaches three x's (the
        // command in the first clause is unknown, so it exits 127).
        eval(
            &mut env,
            "n=; while case $n in xxx) no-such-cmd-zz;; *) n=x$n; esac; do b=$n; done",
        )
        .unwrap();
        assert_eq!(env.variables.get("n"), Some(&b"xxx"[..]));
        assert_eq!(env.variables.get("b"), Some(&b"xxx"[..]));
    }

    #[test]
    fn break_and_continue() {
        let mut env = Env::new();
        env.builtins.insert(
            "break",
            Builtin {
                kind: rash_env::builtin::BuiltinKind::Special,
                execute: |_env, _args| Err(Divert::Break { count: 1 }),
            },
        );
        eval(&mut env, "for i in a b c; do break; after=$i; done").unwrap();
        assert_eq!(env.variables.get("after"), None);
        assert_eq!(env.variables.get("i"), Some(&b"a"[..]));
    }

    #[test]
    fn nested_break_counts() {
        let mut env = Env::new();
        env.builtins.insert(
            "break2",
            Builtin {
                kind: rash_env::builtin::BuiltinKind::Special,
                execute: |_env, _args| Err(Divert::Break { count: 2 }),
            },
        );
        eval(
            &mut env,
            "for i in 1 2; do for j in x y; do break2; done; inner=$i; done",
        )
        .unwrap();
        assert_eq!(env.variables.get("inner"), None);
    }

    #[test]
    fn errexit_exits_on_failure() {
        let mut env = Env::new();
        env.options |= ShellOption::Errexit;
        env.builtins.insert(
            "false",
            Builtin {
                kind: rash_env::builtin::BuiltinKind::Regular,
                execute: |_env, _args| Ok(ExitStatus::FAILURE),
            },
        );
        assert_eq!(eval(&mut env, "false"), Err(Divert::Exit));
        // Tested contexts do not trigger it.
        assert_eq!(eval(&mut env, "if false; then :; fi"), Ok(()));
    }

    #[test]
    fn builtin_dispatch_and_exit_status() {
        let mut env = Env::new();
        env.builtins.insert(
            "setstatus",
            Builtin {
                kind: rash_env::builtin::BuiltinKind::Regular,
                execute: |_env, args| {
                    let code = args
                        .get(1)
                        .and_then(Field::to_str)
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    Ok(ExitStatus(code))
                },
            },
        );
        eval(&mut env, "setstatus 7").unwrap();
        assert_eq!(env.exit_status, ExitStatus(7));
        // A non-zero middle status falls through to the `||` side.
        eval(&mut env, "setstatus 0 && setstatus 5 || setstatus 9").unwrap();
        assert_eq!(env.exit_status, ExitStatus(9));
        eval(&mut env, "setstatus 0 && setstatus 0 || setstatus 9").unwrap();
        assert_eq!(env.exit_status, ExitStatus(0));
        eval(&mut env, "setstatus 1 && setstatus 5 || setstatus 9").unwrap();
        assert_eq!(env.exit_status, ExitStatus(9));
    }

    #[test]
    fn command_not_found_sets_127() {
        let mut env = Env::new();
        let empty = tempfile::tempdir().unwrap();
        env.set_var(
            "PATH",
            empty.path().as_os_str().to_str().unwrap().into(),
            VarFlags::empty(),
        )
        .unwrap();
        eval(&mut env, "definitely-no-such-command").unwrap();
        assert_eq!(env.exit_status, ExitStatus::NOT_FOUND);
    }

    #[test]
    fn command_text_is_presentable() {
        let node = parse("echo hello | grep h");
        assert_eq!(command_text(&node), "echo hello | grep h");
    }
}
