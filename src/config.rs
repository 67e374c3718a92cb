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

//! Ledger configuration.

use crate::base::{Amount, MAX_REGIONS};
use crate::book::{BalanceTable, OrderHistory};
use crate::error::LedgerError;
use std::path::{Path, PathBuf};

/// Where startup balances come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Balances are the recorded starting allocation plus a replay of the
    /// transaction log. The snapshot file is only an output cache.
    #[default]
    Replay,
    /// Balances are read from the snapshot file and history from the log,
    /// without reconciling the two. A disagreement is only logged.
    Snapshot,
}

/// Settings for [`Ledger::open`](crate::Ledger::open).
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub log_path: PathBuf,
    pub snapshot_path: PathBuf,
    /// Records the allocation the log starts from. Written once, together
    /// with the first log header.
    pub genesis_path: PathBuf,
    pub regions: usize,
    /// Starting allocation of a new ledger. Empty means all zero for a new
    /// ledger and the recorded allocation for an existing one. Otherwise it
    /// must equal what was recorded.
    pub initial_balances: Vec<Amount>,
    pub history_block: usize,
    pub recovery: RecoveryMode,
    /// `fsync` the log after each append and the snapshot after each rewrite.
    pub sync_writes: bool,
}

impl LedgerConfig {
    /// The genesis file sits next to the log: `transactions.csv` gets
    /// `transactions.genesis.csv`.
    pub fn new(log_path: impl Into<PathBuf>, snapshot_path: impl Into<PathBuf>, regions: usize) -> Self {
        let log_path = log_path.into();
        Self {
            genesis_path: log_path.with_extension("genesis.csv"),
            log_path,
            snapshot_path: snapshot_path.into(),
            regions,
            initial_balances: Vec::new(),
            history_block: OrderHistory::DEFAULT_BLOCK,
            recovery: RecoveryMode::default(),
            sync_writes: false,
        }
    }

    /// All files inside `dir`: `transactions.csv`, `transactions.genesis.csv`
    /// and `balances.csv`.
    pub fn in_dir(dir: impl AsRef<Path>, regions: usize) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join("transactions.csv"), dir.join("balances.csv"), regions)
    }

    pub fn with_initial_balances(mut self, balances: Vec<Amount>) -> Self {
        self.initial_balances = balances;
        self
    }

    pub fn with_genesis_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.genesis_path = path.into();
        self
    }

    pub fn with_history_block(mut self, block: usize) -> Self {
        self.history_block = block;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryMode) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Checks the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.regions == 0 {
            return Err(LedgerError::InvalidConfig("at least one region is required".into()));
        }
        if self.regions > MAX_REGIONS {
            return Err(LedgerError::TooManyRegions {
                regions: self.regions,
            });
        }
        if !self.initial_balances.is_empty() && self.initial_balances.len() != self.regions {
            return Err(LedgerError::InvalidConfig(format!(
                "{} initial balances given for {} regions",
                self.initial_balances.len(),
                self.regions
            )));
        }
        if self.history_block == 0 {
            return Err(LedgerError::InvalidConfig("history block must be positive".into()));
        }
        if self.log_path == self.snapshot_path
            || self.log_path == self.genesis_path
            || self.snapshot_path == self.genesis_path
        {
            return Err(LedgerError::InvalidConfig(
                "transaction log, genesis and snapshot must be different files".into(),
            ));
        }
        Ok(())
    }

    /// The balance table a new ledger starts from.
    pub fn initial_table(&self) -> Result<BalanceTable, LedgerError> {
        if self.initial_balances.is_empty() {
            BalanceTable::zeroed(self.regions)
        } else {
            BalanceTable::from_balances(self.initial_balances.clone())
        }
    }
}
