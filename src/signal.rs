// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Blocking state cell.
//!
//! A [`Signal`] holds one small state value. Threads can block until it reaches
//! a given value, publish a new value, or atomically move it from one value to
//! another once the first value holds.
//!
//! Every store is paired with a broadcast wake-up and every waiter re-checks
//! the value under the same lock before sleeping, so no change is lost between
//! a waiter's check and its sleep.
//!
//! # Example
//!
//! ```
//! use region_ledger::Signal;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let ready = Arc::new(Signal::new(false));
//! let worker = {
//!     let ready = Arc::clone(&ready);
//!     thread::spawn(move || ready.set_immediate(true))
//! };
//! ready.wait_for(true);
//! worker.join().unwrap();
//! ```

use parking_lot::{Condvar, Mutex};

/// Process-local synchronization cell with wait/set/switch operations.
#[derive(Debug, Default)]
pub struct Signal<S> {
    state: Mutex<S>,
    changed: Condvar,
}

impl<S: Copy + Eq> Signal<S> {
    pub fn new(initial: S) -> Self {
        Self {
            state: Mutex::new(initial),
            changed: Condvar::new(),
        }
    }

    /// Current value. May be stale as soon as it is returned.
    pub fn get(&self) -> S {
        *self.state.lock()
    }

    /// Blocks until the value equals `state`. Returns at once if it already does.
    pub fn wait_for(&self, state: S) {
        let mut current = self.state.lock();
        while *current != state {
            self.changed.wait(&mut current);
        }
    }

    /// Stores `state` and wakes every waiter.
    ///
    /// Waiters may be blocked on different target values, so this always
    /// broadcasts.
    pub fn set_immediate(&self, state: S) {
        let mut current = self.state.lock();
        *current = state;
        self.changed.notify_all();
    }

    /// Waits until the value is `from`, then moves it to `to` and wakes every
    /// waiter. The check and the store happen under one lock acquisition.
    pub fn switch(&self, from: S, to: S) {
        let mut current = self.state.lock();
        while *current != from {
            self.changed.wait(&mut current);
        }
        *current = to;
        self.changed.notify_all();
    }

    /// Non-blocking [`switch`](Self::switch). Returns `false` if the value was
    /// not `from`.
    pub fn try_switch(&self, from: S, to: S) -> bool {
        let mut current = self.state.lock();
        if *current != from {
            return false;
        }
        *current = to;
        self.changed.notify_all();
        true
    }
}
