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

//! Unbounded multi-producer/single-consumer FIFO queue.
//!
//! Items live in a [`VecDeque`] behind a mutex. A [`Signal`] mirrors whether the
//! queue holds anything so the consumer can block without spinning.

use crate::signal::Signal;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Whether a [`Channel`] currently holds items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Empty,
    NonEmpty,
}

/// A blocking FIFO queue.
///
/// Any number of threads may [`push`](Channel::push); one thread is expected
/// to [`pop`](Channel::pop). Items come out in the order their insertion
/// finished under the queue lock.
///
/// # Invariants
///
/// - The signal reads [`QueueState::NonEmpty`] iff the queue holds an item.
/// - The signal only changes while the queue lock is held.
#[derive(Debug)]
pub struct Channel<T> {
    items: Mutex<VecDeque<T>>,
    state: Signal<QueueState>,
}

impl<T> Channel<T> {
    /// Creates a new empty channel.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            state: Signal::new(QueueState::Empty),
        }
    }

    /// Appends an item at the tail.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        let was_empty = items.is_empty();
        items.push_back(item);
        if was_empty {
            self.state.set_immediate(QueueState::NonEmpty);
        }
    }

    /// Appends every item under a single lock acquisition, so the batch stays
    /// contiguous relative to other producers. Returns the number pushed.
    pub fn push_batch<I>(&self, batch: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut items = self.items.lock();
        let was_empty = items.is_empty();
        let before = items.len();
        items.extend(batch);
        let pushed = items.len() - before;
        if was_empty && pushed > 0 {
            self.state.set_immediate(QueueState::NonEmpty);
        }
        pushed
    }

    /// Removes the head item, blocking while the queue is empty.
    pub fn pop(&self) -> T {
        loop {
            self.state.wait_for(QueueState::NonEmpty);

            let mut items = self.items.lock();
            if let Some(item) = items.pop_front() {
                if items.is_empty() {
                    self.state.set_immediate(QueueState::Empty);
                }
                return item;
            }
            // Another consumer drained it between the wake-up and the lock.
        }
    }

    /// Removes the head item if there is one.
    pub fn try_pop(&self) -> Option<T> {
        let mut items = self.items.lock();
        let item = items.pop_front()?;
        if items.is_empty() {
            self.state.set_immediate(QueueState::Empty);
        }
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Current value of the non-empty signal.
    pub fn state(&self) -> QueueState {
        self.state.get()
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pops_in_push_order() {
        let channel = Channel::new();
        for i in 0..10 {
            channel.push(i);
        }
        let popped: Vec<_> = (0..10).map(|_| channel.pop()).collect();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn signal_tracks_emptiness() {
        let channel = Channel::new();
        assert_eq!(channel.state(), QueueState::Empty);

        channel.push("a");
        channel.push("b");
        assert_eq!(channel.state(), QueueState::NonEmpty);
        assert_eq!(channel.len(), 2);

        assert_eq!(channel.pop(), "a");
        assert_eq!(channel.state(), QueueState::NonEmpty);
        assert_eq!(channel.pop(), "b");
        assert_eq!(channel.state(), QueueState::Empty);
        assert!(channel.is_empty());
    }

    #[test]
    fn try_pop_on_empty_returns_none() {
        let channel: Channel<u8> = Channel::new();
        assert_eq!(channel.try_pop(), None);
        channel.push(7);
        assert_eq!(channel.try_pop(), Some(7));
        assert_eq!(channel.state(), QueueState::Empty);
    }

    #[test]
    fn pop_blocks_until_push() {
        let channel = Arc::new(Channel::new());
        let consumer = {
            let channel = Arc::clone(&channel);
            thread::spawn(move || channel.pop())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!consumer.is_finished());
        channel.push(42u32);
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn batch_is_contiguous() {
        let channel = Channel::new();
        channel.push(0);
        assert_eq!(channel.push_batch(1..4), 3);
        assert_eq!(channel.push_batch(std::iter::empty()), 0);
        channel.push(4);

        let popped: Vec<_> = std::iter::from_fn(|| channel.try_pop()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_batch_leaves_signal_low() {
        let channel: Channel<u8> = Channel::new();
        channel.push_batch(Vec::new());
        assert_eq!(channel.state(), QueueState::Empty);
    }

    #[test]
    fn drop_releases_queued_items() {
        let marker = Arc::new(());
        let channel = Channel::new();
        for _ in 0..5 {
            channel.push(Arc::clone(&marker));
        }
        assert_eq!(Arc::strong_count(&marker), 6);
        drop(channel);
        assert_eq!(Arc::strong_count(&marker), 1);
    }
}
