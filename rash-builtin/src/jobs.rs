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

//! Job-control built-ins: `jobs`, `wait`, `fg`, and `bg`

use crate::builtin_error;
use rash_env::builtin::Result;
use rash_env::job::{JobSet, JobState};
use rash_env::semantics::{ExitStatus, Field};
use rash_env::Env;
use rash_semantics::command::{reap_background, wait_for_job};

/// Resolves a job designator: `%%`/`%+`, `%-`, `%n`, or a process ID.
fn find_job(env: &Env, text: &str) -> Option<usize> {
    if let Some(rest) = text.strip_prefix('%') {
        return match rest {
            "%" | "+" | "" => env.jobs.current(),
            "-" => env.jobs.previous(),
            _ => rest
                .parse::<usize>()
                .ok()
                .and_then(|n| env.jobs.slot_of_number(n)),
        };
    }
    let pid: i32 = text.parse().ok()?;
    env.jobs.find_by_pid(nix::unistd::Pid::from_raw(pid))
}

pub fn jobs(env: &mut Env, _args: Vec<Field>) -> Result {
    reap_background(env);
    let current = env.jobs.current();
    let previous = env.jobs.previous();
    let lines: Vec<String> = env
        .jobs
        .iter()
        .map(|(slot, job)| {
            let marker = if Some(slot) == current {
                '+'
            } else if Some(slot) == previous {
                '-'
            } else {
                ' '
            };
            format!(
                "[{}] {} {}  {}\n",
                JobSet::number(slot),
                marker,
                job.state(),
                job.command()
            )
        })
        .collect();
    for line in lines {
        env.out1.push_str(&line);
    }
    // Everything listed counts as reported.
    let slots: Vec<usize> = env.jobs.iter().map(|(s, _)| s).collect();
    for slot in slots {
        if let Some(job) = env.jobs.get_mut(slot) {
            job.changed = false;
        }
    }
    env.jobs.reap_reported();
    Ok(ExitStatus::SUCCESS)
}

pub fn wait(env: &mut Env, args: Vec<Field>) -> Result {
    env.flush_outputs();
    if args.len() == 1 {
        // Wait for every job.
        loop {
            let Some(slot) = env
                .jobs
                .iter()
                .find(|(_, job)| job.state() == JobState::Running)
                .map(|(slot, _)| slot)
            else {
                break;
            };
            if let Some(job) = env.jobs.get_mut(slot) {
                job.waited = true;
            }
            wait_for_job(env, slot);
            env.poll_interrupt()?;
        }
        env.jobs.reap_reported();
        return Ok(ExitStatus::SUCCESS);
    }

    let mut status = ExitStatus::SUCCESS;
    for operand in args.iter().skip(1) {
        let Some(slot) = operand.to_str().and_then(|t| find_job(env, t)) else {
            status = ExitStatus::NOT_FOUND;
            continue;
        };
        if let Some(job) = env.jobs.get_mut(slot) {
            job.waited = true;
        }
        status = wait_for_job(env, slot);
        env.poll_interrupt()?;
    }
    Ok(status)
}

pub fn fg(env: &mut Env, args: Vec<Field>) -> Result {
    if !env.job_control() {
        builtin_error!(env, "fg: job control not enabled");
    }
    let slot = match args.get(1) {
        None => env.jobs.current(),
        Some(operand) => operand.to_str().and_then(|t| find_job(env, t)),
    };
    let Some(slot) = slot else {
        builtin_error!(env, "fg: no such job");
    };

    let pgid = env.jobs.get(slot).and_then(|j| j.pgid);
    if let Some(pgid) = pgid {
        // SAFETY: handing the terminal to the job and waking it.
        unsafe { libc::tcsetpgrp(2, pgid.as_raw()) };
        let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGCONT);
    }
    let line = env
        .jobs
        .get(slot)
        .map(|j| format!("{}\n", j.command()))
        .unwrap_or_default();
    env.out1.push_str(&line);
    env.out1.flush();
    Ok(wait_for_job(env, slot))
}

pub fn bg(env: &mut Env, args: Vec<Field>) -> Result {
    if !env.job_control() {
        builtin_error!(env, "bg: job control not enabled");
    }
    let slot = match args.get(1) {
        None => env.jobs.current(),
        Some(operand) => operand.to_str().and_then(|t| find_job(env, t)),
    };
    let Some(slot) = slot else {
        builtin_error!(env, "bg: no such job");
    };

    let pgid = env.jobs.get(slot).and_then(|j| j.pgid);
    if let Some(pgid) = pgid {
        let _ = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGCONT);
    }
    // Stopped processes are running again; forget their stop status.
    if let Some(job) = env.jobs.get_mut(slot) {
        for proc in &mut job.procs {
            if matches!(proc.status, Some(nix::sys::wait::WaitStatus::Stopped(..))) {
                proc.status = None;
            }
        }
        let line = format!("[{}] {}\n", JobSet::number(slot), job.command());
        env.out1.push_str(&line);
    }
    Ok(ExitStatus::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{fields, Capture};
    use rash_env::job::{Job, Process};
    use nix::unistd::Pid;

    fn fake_job(env: &mut Env, pid: i32, command: &str) -> usize {
        let mut job = Job::new();
        job.procs.push(Process::new(Pid::from_raw(pid), command.into()));
        env.jobs.add(job)
    }

    #[test]
    fn designators_resolve() {
        let mut env = Env::new();
        let a = fake_job(&mut env, 101, "first");
        let b = fake_job(&mut env, 102, "second");
        assert_eq!(find_job(&env, "%%"), Some(b));
        assert_eq!(find_job(&env, "%+"), Some(b));
        assert_eq!(find_job(&env, "%-"), Some(a));
        assert_eq!(find_job(&env, "%1"), Some(a));
        assert_eq!(find_job(&env, "102"), Some(b));
        assert_eq!(find_job(&env, "%9"), None);
    }

    #[test]
    fn jobs_listing_shows_numbers_and_markers() {
        let mut capture = Capture::new();
        fake_job(&mut capture.env, 201, "sleep 5");
        fake_job(&mut capture.env, 202, "sleep 7");
        jobs(&mut capture.env, fields(&["jobs"])).unwrap();
        let out = capture.stdout();
        assert!(out.contains("[1]"), "{out}");
        assert!(out.contains("[2] + Running  sleep 7"), "{out}");
        assert!(out.contains("[1] - Running  sleep 5"), "{out}");
    }

    #[test]
    fn fg_and_bg_require_job_control() {
        let mut env = Env::new();
        assert_eq!(
            fg(&mut env, fields(&["fg"])),
            Err(rash_env::semantics::Divert::Error)
        );
        assert_eq!(
            bg(&mut env, fields(&["bg"])),
            Err(rash_env::semantics::Divert::Error)
        );
    }

    #[test]
    fn wait_with_unknown_job_reports_127() {
        let mut env = Env::new();
        assert_eq!(
            wait(&mut env, fields(&["wait", "%7"])),
            Ok(ExitStatus::NOT_FOUND)
        );
    }
}
