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

//! # Region Ledger
//!
//! A single-writer transactional ledger. Any number of threads submit
//! money-transfer orders between regions; one background worker serializes
//! them, checks balances, appends them to a durable CSV log and keeps a CSV
//! balance snapshot current.
//!
//! ## Core Components
//!
//! - [`Signal`]: Blocking state cell with wait, set and switch operations
//! - [`Channel`]: Unbounded multi-producer/single-consumer FIFO built on a [`Signal`]
//! - [`Ledger`]: Handle on the worker, the balance table and the order history
//! - [`recovery`]: Startup reconstruction from the log and the snapshot
//! - [`LedgerError`] / [`TransferError`]: Startup failures and rejection reasons
//!
//! ## Example
//!
//! ```
//! use region_ledger::{Ledger, LedgerConfig, Order, RegionId};
//!
//! let dir = tempfile::TempDir::new().unwrap();
//! let config = LedgerConfig::in_dir(dir.path(), 2).with_initial_balances(vec![100, 0]);
//! let ledger = Ledger::open(config).unwrap();
//!
//! // Transfer 40 from region 0 to region 1
//! ledger.submit(vec![Order::new(RegionId(0), RegionId(1), 40)]).unwrap();
//!
//! // Insufficient funds: dropped without notice
//! ledger.submit(vec![Order::new(RegionId(0), RegionId(1), 1000)]).unwrap();
//!
//! ledger.sync().unwrap();
//! assert_eq!(ledger.balances().as_slice(), &[60, 40]);
//! assert_eq!(ledger.history_len(), 1);
//!
//! ledger.shutdown().unwrap();
//! ```
//!
//! ## Recovery
//!
//! By default balances are rebuilt by replaying the transaction log on top of
//! the genesis allocation, and the snapshot file is treated as an output
//! cache. The genesis allocation is the initial balances of the first start,
//! recorded in a file next to the log; later starts may omit the initial
//! balances but cannot change them. [`RecoveryMode::Snapshot`] restores the older behaviour of
//! trusting the snapshot for balances and the log for history, which can
//! disagree after a crash between the log append and the snapshot rewrite.

mod base;
pub mod book;
pub mod channel;
pub mod config;
mod engine;
pub mod error;
mod order;
pub mod recovery;
mod region;
pub mod signal;
pub mod storage;

pub use base::{Amount, MAX_REGIONS, RegionId};
pub use book::{BalanceTable, Book, OrderHistory};
pub use channel::{Channel, QueueState};
pub use config::{LedgerConfig, RecoveryMode};
pub use engine::{EngineState, Ledger, LedgerStats, Submitter};
pub use error::{LedgerError, TransferError};
pub use order::{Message, Order};
pub use region::RegionDirectory;
pub use signal::Signal;
