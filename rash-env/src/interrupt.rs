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

//! Deferred interrupt delivery
//!
//! A keyboard SIGINT must never tear a data structure mid-update. The
//! signal handler only records the interrupt in [`set_pending`]; delivery
//! happens synchronously, at the explicit poll sites the evaluator, the
//! input layer, and long-running built-ins place between operations.
//!
//! A [`CriticalSection`] guard marks a region in which delivery is
//! deferred even at poll sites. Every mutation of the variable store, the
//! job table, and the redirection stack runs under such a guard. The
//! guard nests; the interrupt is observed by the first poll after the
//! outermost guard is dropped.
//!
//! The state lives in process-global atomics because a signal handler can
//! only touch those. Forked children reset the state with [`reset`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

static SUPPRESS: AtomicU32 = AtomicU32::new(0);
static PENDING: AtomicBool = AtomicBool::new(false);

/// Records a SIGINT. Called from the signal handler; async-signal-safe.
pub fn set_pending() {
    PENDING.store(true, Ordering::Relaxed);
}

/// Whether an interrupt is pending and deliverable right now.
#[must_use]
pub fn deliverable() -> bool {
    PENDING.load(Ordering::Relaxed) && SUPPRESS.load(Ordering::Relaxed) == 0
}

/// Consumes a deliverable interrupt.
///
/// Returns `true` at most once per pending interrupt, and never while a
/// [`CriticalSection`] is alive.
#[must_use]
pub fn take() -> bool {
    if SUPPRESS.load(Ordering::Relaxed) != 0 {
        return false;
    }
    PENDING.swap(false, Ordering::Relaxed)
}

/// Discards any pending interrupt and open critical sections.
///
/// For use right after `fork` in the child, which starts with a clean
/// interrupt state regardless of what the parent was doing.
pub fn reset() {
    SUPPRESS.store(0, Ordering::Relaxed);
    PENDING.store(false, Ordering::Relaxed);
}

/// Clears a pending interrupt without delivering it.
pub fn clear_pending() {
    PENDING.store(false, Ordering::Relaxed);
}

/// Region with deferred interrupt delivery
///
/// While any such guard is alive, [`take`] and [`deliverable`] report no
/// interrupt. The pending flag itself is preserved, so the interrupt is
/// seen by the first poll site after the region ends.
#[derive(Debug)]
pub struct CriticalSection(());

impl CriticalSection {
    pub fn enter() -> Self {
        SUPPRESS.fetch_add(1, Ordering::Relaxed);
        CriticalSection(())
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        let previous = SUPPRESS.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "unbalanced critical section");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The statics are process-global, so these tests must not run
    // concurrently with each other.
    static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn delivery_outside_critical_section() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset();
        assert!(!take());
        set_pending();
        assert!(deliverable());
        assert!(take());
        assert!(!take());
    }

    #[test]
    fn delivery_deferred_inside_critical_section() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset();
        let outer = CriticalSection::enter();
        set_pending();
        assert!(!deliverable());
        assert!(!take());
        {
            let _inner = CriticalSection::enter();
            assert!(!take());
        }
        // Still suppressed: the outer guard is alive.
        assert!(!take());
        drop(outer);
        assert!(take());
    }

    #[test]
    fn reset_discards_pending_state() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset();
        set_pending();
        reset();
        assert!(!take());
    }
}
