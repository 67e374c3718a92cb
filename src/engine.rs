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

//! Single-writer ledger engine.
//!
//! The [`Ledger`] is the handle clients use. Orders are pushed into a
//! [`Channel`] and a dedicated worker thread applies them one at a time:
//!
//! 1. Check the sender balance. Orders that fail are dropped silently.
//! 2. Append the order to the transaction log.
//! 3. Under the book lock, record the order, move the funds and rewrite the
//!    balance snapshot.
//!
//! Log and snapshot write failures are logged and the order still applies in
//! memory.
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──► Running ──(Shutdown message)──► Draining ──► Stopped
//! ```
//!
//! `Starting` runs on the thread calling [`Ledger::open`]: files are opened and
//! state is recovered (see [`recovery`](crate::recovery)). Any failure there is
//! returned and no worker is spawned. Shutdown travels through the same
//! channel as orders, so every order submitted before it is handled first.
//!
//! # Thread Safety
//!
//! Producers only contend on the channel lock. Balances and history sit behind
//! a second lock, so readers never wait on channel traffic. The two files are
//! only touched by the worker.

use crate::base::{Amount, RegionId};
use crate::book::{BalanceTable, Book};
use crate::channel::Channel;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, TransferError};
use crate::order::{Message, Order};
use crate::recovery;
use crate::signal::Signal;
use crate::storage::{SnapshotFile, TransactionLog};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Lifecycle of a ledger worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Outcome counters of the orders the worker has handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerStats {
    pub applied: u64,
    pub rejected: u64,
}

/// State shared between the handle, submitters and the worker.
#[derive(Debug)]
struct Shared {
    channel: Channel<Message>,
    /// `false` once shutdown was requested. Held for reading while pushing so
    /// nothing can be queued behind the shutdown message.
    accepting: RwLock<bool>,
    book: Mutex<Book>,
    state: Signal<EngineState>,
    applied: AtomicU64,
    rejected: AtomicU64,
    regions: usize,
}

impl Shared {
    fn new(book: Book) -> Self {
        let regions = book.balances().regions();
        Self {
            channel: Channel::new(),
            accepting: RwLock::new(true),
            book: Mutex::new(book),
            state: Signal::new(EngineState::Starting),
            applied: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            regions,
        }
    }

    fn submit(&self, orders: Vec<Order>) -> Result<usize, LedgerError> {
        let accepting = self.accepting.read();
        if !*accepting {
            return Err(LedgerError::Closed);
        }

        let regions = self.regions;
        let messages = orders
            .into_iter()
            .filter(|order| {
                let known = order.within(regions);
                if !known {
                    warn!(%order, regions, "dropping order for unknown region");
                }
                known
            })
            .map(Message::Order);
        Ok(self.channel.push_batch(messages))
    }

    fn sync(&self) -> Result<(), LedgerError> {
        let reached = Arc::new(Signal::new(false));
        {
            let accepting = self.accepting.read();
            if !*accepting {
                return Err(LedgerError::Closed);
            }
            self.channel.push(Message::Barrier(Arc::clone(&reached)));
        }
        reached.wait_for(true);
        Ok(())
    }

    fn stats(&self) -> LedgerStats {
        LedgerStats {
            applied: self.applied.load(Ordering::Acquire),
            rejected: self.rejected.load(Ordering::Acquire),
        }
    }
}

/// The background task: sole owner of both files and sole writer of the book.
struct Worker {
    shared: Arc<Shared>,
    log: TransactionLog,
    snapshot: SnapshotFile,
}

impl Worker {
    fn run(mut self) {
        self.shared
            .state
            .switch(EngineState::Starting, EngineState::Running);
        info!(regions = self.shared.regions, "ledger worker running");

        loop {
            match self.shared.channel.pop() {
                Message::Order(order) => self.handle(order),
                Message::Barrier(reached) => reached.set_immediate(true),
                Message::Shutdown => break,
            }
        }

        self.shared
            .state
            .switch(EngineState::Running, EngineState::Draining);
        let Worker {
            shared,
            log,
            snapshot,
        } = self;
        drop(log);
        drop(snapshot);

        let stats = shared.stats();
        info!(
            applied = stats.applied,
            rejected = stats.rejected,
            "ledger worker stopped"
        );
        shared
            .state
            .switch(EngineState::Draining, EngineState::Stopped);
    }

    fn handle(&mut self, order: Order) {
        match self.apply(order) {
            Ok(()) => {
                self.shared.applied.fetch_add(1, Ordering::AcqRel);
            }
            Err(reason) => {
                self.shared.rejected.fetch_add(1, Ordering::AcqRel);
                debug!(%order, %reason, "order rejected");
            }
        }
    }

    /// Validates, logs and applies one order.
    fn apply(&mut self, order: Order) -> Result<(), TransferError> {
        // Only this thread mutates the book, so the check stays valid after
        // the lock is released.
        self.shared.book.lock().balances().check(&order)?;

        if let Err(error) = self.log.append(&order) {
            warn!(%error, %order, "transaction log append failed");
        }

        let mut book = self.shared.book.lock();
        book.apply(order)?;
        if let Err(error) = self.snapshot.rewrite(book.balances()) {
            warn!(%error, "balance snapshot rewrite failed");
        }
        Ok(())
    }
}

/// Handle on a running ledger.
///
/// Dropping the handle shuts the worker down the same way
/// [`shutdown`](Ledger::shutdown) does, ignoring errors.
///
/// # Example
///
/// ```
/// use region_ledger::{Ledger, LedgerConfig, Order, RegionId};
///
/// let dir = tempfile::TempDir::new().unwrap();
/// let config = LedgerConfig::in_dir(dir.path(), 2).with_initial_balances(vec![100, 0]);
/// let ledger = Ledger::open(config).unwrap();
///
/// ledger.submit(vec![Order::new(RegionId(0), RegionId(1), 40)]).unwrap();
/// ledger.sync().unwrap();
/// assert_eq!(ledger.get_balance(RegionId(1)), Some(40));
///
/// ledger.shutdown().unwrap();
/// ```
#[derive(Debug)]
pub struct Ledger {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Ledger {
    /// Opens the ledger files, recovers state and starts the worker.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidConfig`], [`LedgerError::TooManyRegions`] - The
    ///   configuration is unusable.
    /// - [`LedgerError::GenesisMismatch`] - The initial balances differ from
    ///   the recorded allocation.
    /// - [`LedgerError::MissingGenesis`] - The log holds orders but neither a
    ///   recorded nor a configured allocation exists.
    /// - [`LedgerError::Io`] - A file cannot be opened, read or written.
    /// - [`LedgerError::BadHeader`], [`LedgerError::MalformedRow`],
    ///   [`LedgerError::RegionOutOfRange`], [`LedgerError::DuplicateRegion`],
    ///   [`LedgerError::MissingRegions`] - A persisted file is corrupt.
    /// - [`LedgerError::ReplayFailed`] - The log does not replay from the
    ///   genesis allocation.
    /// - [`LedgerError::Spawn`] - The worker thread could not start.
    pub fn open(config: LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;

        recovery::repair_log_tail(&config.log_path)?;
        let (log, log_created) = TransactionLog::open(&config.log_path, config.sync_writes)?;
        let book = recovery::recover(&config)?;
        let (mut snapshot, snapshot_created) =
            SnapshotFile::open(&config.snapshot_path, config.sync_writes)?;
        snapshot.rewrite(book.balances())?;

        info!(
            log = %log.path().display(),
            snapshot = %snapshot.path().display(),
            log_created,
            snapshot_created,
            regions = config.regions,
            "ledger files ready"
        );

        let shared = Arc::new(Shared::new(book));
        let worker = Worker {
            shared: Arc::clone(&shared),
            log,
            snapshot,
        };
        let handle = thread::Builder::new()
            .name("ledger-worker".into())
            .spawn(move || worker.run())
            .map_err(LedgerError::Spawn)?;
        shared.state.wait_for(EngineState::Running);

        Ok(Self {
            shared,
            worker: Some(handle),
        })
    }

    /// Queues orders for the worker, one message per order, as one contiguous
    /// batch.
    ///
    /// Orders naming an unknown region are dropped here and not counted. The
    /// return value only says how many orders were queued; whether each one
    /// passes the balance check is never reported back.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Closed`] once shutdown was requested.
    pub fn submit(&self, orders: Vec<Order>) -> Result<usize, LedgerError> {
        self.shared.submit(orders)
    }

    /// A cloneable producer handle for other threads.
    pub fn submitter(&self) -> Submitter {
        Submitter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Blocks until every order queued before this call was applied or
    /// rejected.
    pub fn sync(&self) -> Result<(), LedgerError> {
        self.shared.sync()
    }

    pub fn get_balance(&self, region: RegionId) -> Option<Amount> {
        self.shared.book.lock().balances().get(region)
    }

    /// Copy of the whole balance table.
    pub fn balances(&self) -> BalanceTable {
        self.shared.book.lock().balances().clone()
    }

    /// Sum of all balances.
    pub fn total(&self) -> u128 {
        self.shared.book.lock().balances().total()
    }

    pub fn history_len(&self) -> usize {
        self.shared.book.lock().history().len()
    }

    pub fn history_at(&self, index: usize) -> Option<Order> {
        self.shared.book.lock().history().get(index)
    }

    /// Copy of every applied order, in application order.
    pub fn history(&self) -> Vec<Order> {
        self.shared.book.lock().history().as_slice().to_vec()
    }

    pub fn state(&self) -> EngineState {
        self.shared.state.get()
    }

    pub fn stats(&self) -> LedgerStats {
        self.shared.stats()
    }

    pub fn regions(&self) -> usize {
        self.shared.regions
    }

    /// Messages waiting for the worker.
    pub fn pending(&self) -> usize {
        self.shared.channel.len()
    }

    /// Requests shutdown, waits for the worker to finish every message queued
    /// before it and returns the final counters.
    ///
    /// # Errors
    ///
    /// [`LedgerError::WorkerPanicked`] if the worker thread panicked.
    pub fn shutdown(mut self) -> Result<LedgerStats, LedgerError> {
        self.stop()?;
        Ok(self.shared.stats())
    }

    fn stop(&mut self) -> Result<(), LedgerError> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        {
            let mut accepting = self.shared.accepting.write();
            *accepting = false;
            self.shared.channel.push(Message::Shutdown);
        }
        handle.join().map_err(|_| LedgerError::WorkerPanicked)
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Producer handle that can be cloned into other threads.
///
/// Stops accepting orders once the owning [`Ledger`] shuts down.
#[derive(Debug, Clone)]
pub struct Submitter {
    shared: Arc<Shared>,
}

impl Submitter {
    /// See [`Ledger::submit`].
    pub fn submit(&self, orders: Vec<Order>) -> Result<usize, LedgerError> {
        self.shared.submit(orders)
    }

    /// See [`Ledger::sync`].
    pub fn sync(&self) -> Result<(), LedgerError> {
        self.shared.sync()
    }
}
