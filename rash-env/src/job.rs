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

//! Job management
//!
//! Every child the shell forks belongs to a [`Job`], typically one job
//! per pipeline. Jobs live in a [`JobSet`] keyed by small slot numbers;
//! job numbers shown to the user are the slot plus one, and freed slots
//! are reused, which keeps the numbering stable and small the way the
//! historical shells do.
//!
//! The "current job" (`%%`) and "previous job" (`%-`) designations
//! follow the stopped-then-most-recent policy: stopping a job makes it
//! current, the old current becomes previous.

#[doc(no_inline)]
pub use nix::sys::wait::WaitStatus;
#[doc(no_inline)]
pub use nix::unistd::Pid;

use crate::semantics::ExitStatus;
use slab::Slab;

/// One process of a job
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Process {
    /// Process ID
    pub pid: Pid,
    /// Last observed status, or `None` while running
    pub status: Option<WaitStatus>,
    /// Command text for the `jobs` listing
    pub command: String,
}

impl Process {
    pub fn new(pid: Pid, command: String) -> Self {
        Process {
            pid,
            status: None,
            command,
        }
    }

    fn is_stopped(&self) -> bool {
        matches!(self.status, Some(WaitStatus::Stopped(..)))
    }

    fn is_done(&self) -> bool {
        matches!(
            self.status,
            Some(WaitStatus::Exited(..) | WaitStatus::Signaled(..))
        )
    }
}

/// Aggregate state of a job
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
            JobState::Done => "Done",
        };
        f.write_str(s)
    }
}

/// Set of processes created together and tracked as a unit
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Job {
    /// Processes of the job, in pipeline order
    pub procs: Vec<Process>,
    /// Process group, if the job was started under job control
    pub pgid: Option<Pid>,
    /// Whether the job was started under job control
    pub job_control: bool,
    /// State has changed since the last report
    pub changed: bool,
    /// The user has waited for this job
    pub waited: bool,
}

impl Job {
    pub fn new() -> Self {
        Job {
            procs: Vec::new(),
            pgid: None,
            job_control: false,
            changed: false,
            waited: false,
        }
    }

    /// Aggregate state over all processes.
    #[must_use]
    pub fn state(&self) -> JobState {
        if self.procs.iter().all(Process::is_done) {
            JobState::Done
        } else if self.procs.iter().any(Process::is_stopped)
            && !self.procs.iter().any(|p| p.status.is_none())
        {
            JobState::Stopped
        } else {
            JobState::Running
        }
    }

    /// Exit status of the job: that of its last process.
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        self.procs
            .last()
            .and_then(|p| p.status)
            .map_or(ExitStatus::SUCCESS, ExitStatus::from)
    }

    /// Command text of the whole job for listings.
    #[must_use]
    pub fn command(&self) -> String {
        let parts: Vec<&str> = self.procs.iter().map(|p| p.command.as_str()).collect();
        parts.join(" | ")
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

/// Collection of jobs
#[derive(Clone, Debug, Default)]
pub struct JobSet {
    jobs: Slab<Job>,
    /// Slot of the current job (`%%`)
    current: Option<usize>,
    /// Slot of the previous job (`%-`)
    previous: Option<usize>,
    /// Process ID of the most recent background command (`$!`)
    last_async_pid: Option<Pid>,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job, returning its slot.
    ///
    /// The new job becomes the current job.
    pub fn add(&mut self, job: Job) -> usize {
        let slot = self.jobs.insert(job);
        self.set_current(slot);
        slot
    }

    /// Removes a job.
    pub fn remove(&mut self, slot: usize) -> Option<Job> {
        let job = self.jobs.try_remove(slot);
        if job.is_some() {
            if self.current == Some(slot) {
                self.current = self.previous.take();
            } else if self.previous == Some(slot) {
                self.previous = None;
            }
            if self.previous.is_none() {
                self.previous = self
                    .jobs
                    .iter()
                    .map(|(i, _)| i)
                    .find(|&i| Some(i) != self.current);
            }
        }
        job
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&Job> {
        self.jobs.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Job> {
        self.jobs.get_mut(slot)
    }

    /// Job number (1-based) of a slot.
    #[must_use]
    pub fn number(slot: usize) -> usize {
        slot + 1
    }

    /// Slot of a 1-based job number.
    #[must_use]
    pub fn slot_of_number(&self, number: usize) -> Option<usize> {
        let slot = number.checked_sub(1)?;
        self.jobs.contains(slot).then_some(slot)
    }

    /// Slot of the current job.
    #[must_use]
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Slot of the previous job.
    #[must_use]
    pub fn previous(&self) -> Option<usize> {
        self.previous
    }

    /// Makes a job current, demoting the old current to previous.
    pub fn set_current(&mut self, slot: usize) {
        if self.current != Some(slot) {
            self.previous = self.current;
            self.current = Some(slot);
        }
    }

    /// Finds the job containing a process.
    #[must_use]
    pub fn find_by_pid(&self, pid: Pid) -> Option<usize> {
        self.jobs
            .iter()
            .find(|(_, job)| job.procs.iter().any(|p| p.pid == pid))
            .map(|(slot, _)| slot)
    }

    /// Records a wait status, updating the owning job.
    ///
    /// Returns the slot of the job the process belongs to. A stopped job
    /// becomes the current job.
    pub fn record_status(&mut self, pid: Pid, status: WaitStatus) -> Option<usize> {
        let slot = self.find_by_pid(pid)?;
        let job = &mut self.jobs[slot];
        for proc in &mut job.procs {
            if proc.pid == pid {
                proc.status = Some(status);
            }
        }
        job.changed = true;
        if job.state() == JobState::Stopped {
            self.set_current(slot);
        }
        Some(slot)
    }

    /// Iterates over all jobs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Job)> {
        self.jobs.iter()
    }

    /// Whether any job is still running.
    #[must_use]
    pub fn any_running(&self) -> bool {
        self.jobs
            .iter()
            .any(|(_, job)| job.state() == JobState::Running)
    }

    /// Drops jobs that are done and already reported or waited for.
    pub fn reap_reported(&mut self) {
        let slots: Vec<usize> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.state() == JobState::Done && (job.waited || !job.changed))
            .map(|(slot, _)| slot)
            .collect();
        for slot in slots {
            self.remove(slot);
        }
    }

    /// `$!`, the process ID of the most recent background command.
    #[must_use]
    pub fn last_async_pid(&self) -> Option<Pid> {
        self.last_async_pid
    }

    pub fn set_last_async_pid(&mut self, pid: Pid) {
        self.last_async_pid = Some(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    fn job_with_pids(pids: &[i32]) -> Job {
        let mut job = Job::new();
        for &pid in pids {
            job.procs
                .push(Process::new(Pid::from_raw(pid), format!("cmd{pid}")));
        }
        job
    }

    #[test]
    fn numbering_is_one_based_and_reuses_slots() {
        let mut jobs = JobSet::new();
        let a = jobs.add(job_with_pids(&[10]));
        let b = jobs.add(job_with_pids(&[20]));
        assert_eq!(JobSet::number(a), 1);
        assert_eq!(JobSet::number(b), 2);
        jobs.remove(a);
        let c = jobs.add(job_with_pids(&[30]));
        assert_eq!(JobSet::number(c), 1);
        assert_eq!(jobs.slot_of_number(2), Some(b));
        assert_eq!(jobs.slot_of_number(3), None);
    }

    #[test]
    fn state_aggregation() {
        let mut job = job_with_pids(&[1, 2]);
        assert_eq!(job.state(), JobState::Running);
        job.procs[0].status = Some(WaitStatus::Exited(Pid::from_raw(1), 0));
        assert_eq!(job.state(), JobState::Running);
        job.procs[1].status = Some(WaitStatus::Stopped(Pid::from_raw(2), Signal::SIGTSTP));
        assert_eq!(job.state(), JobState::Stopped);
        job.procs[1].status = Some(WaitStatus::Exited(Pid::from_raw(2), 3));
        assert_eq!(job.state(), JobState::Done);
        assert_eq!(job.exit_status(), ExitStatus(3));
    }

    #[test]
    fn record_status_updates_job() {
        let mut jobs = JobSet::new();
        let slot = jobs.add(job_with_pids(&[42]));
        let other = jobs.record_status(Pid::from_raw(99), WaitStatus::Exited(Pid::from_raw(99), 0));
        assert_eq!(other, None);
        let hit = jobs.record_status(Pid::from_raw(42), WaitStatus::Exited(Pid::from_raw(42), 7));
        assert_eq!(hit, Some(slot));
        assert_eq!(jobs.get(slot).unwrap().state(), JobState::Done);
        assert!(jobs.get(slot).unwrap().changed);
    }

    #[test]
    fn stopped_job_becomes_current() {
        let mut jobs = JobSet::new();
        let a = jobs.add(job_with_pids(&[1]));
        let b = jobs.add(job_with_pids(&[2]));
        assert_eq!(jobs.current(), Some(b));
        assert_eq!(jobs.previous(), Some(a));
        jobs.record_status(Pid::from_raw(1), WaitStatus::Stopped(Pid::from_raw(1), Signal::SIGTSTP));
        assert_eq!(jobs.current(), Some(a));
        assert_eq!(jobs.previous(), Some(b));
    }

    #[test]
    fn removing_current_promotes_previous() {
        let mut jobs = JobSet::new();
        let a = jobs.add(job_with_pids(&[1]));
        let b = jobs.add(job_with_pids(&[2]));
        jobs.remove(b);
        assert_eq!(jobs.current(), Some(a));
    }

    #[test]
    fn last_async_pid() {
        let mut jobs = JobSet::new();
        assert_eq!(jobs.last_async_pid(), None);
        jobs.set_last_async_pid(Pid::from_raw(77));
        assert_eq!(jobs.last_async_pid(), Some(Pid::from_raw(77)));
    }

    #[test]
    fn reap_reported_drops_finished_unreported_jobs() {
        let mut jobs = JobSet::new();
        let slot = jobs.add(job_with_pids(&[5]));
        jobs.record_status(Pid::from_raw(5), WaitStatus::Exited(Pid::from_raw(5), 0));
        // Changed but not yet reported: stays.
        jobs.reap_reported();
        assert!(jobs.get(slot).is_some());
        jobs.get_mut(slot).unwrap().changed = false;
        jobs.reap_reported();
        assert!(jobs.get(slot).is_none());
    }
}
