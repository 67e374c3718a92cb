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

//! Error types for the ledger.
//!
//! [`TransferError`] is the business-rule outcome of applying one order.
//! [`LedgerError`] covers startup, storage and lifecycle failures.

use crate::base::{Amount, MAX_REGIONS, RegionId};
use std::path::PathBuf;
use thiserror::Error;

/// Reasons an order is rejected by the balance table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Sender balance is lower than the amount
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Sender or recipient is not a known region
    #[error("unknown region {0}")]
    UnknownRegion(RegionId),

    /// Crediting the recipient would overflow its balance
    #[error("balance overflow")]
    BalanceOverflow,
}

/// Ledger startup, storage and lifecycle errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("bad header in '{}': expected '{expected}', found '{found}'", path.display())]
    BadHeader {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("malformed row in '{}' at line {line}: {reason}", path.display())]
    MalformedRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("region {region} out of range (0..{regions}) in '{}' at line {line}", path.display())]
    RegionOutOfRange {
        path: PathBuf,
        line: u64,
        region: RegionId,
        regions: usize,
    },

    #[error("region {region} listed twice in '{}'", path.display())]
    DuplicateRegion { path: PathBuf, region: RegionId },

    #[error("'{}' lists {found} of {expected} regions", path.display())]
    MissingRegions {
        path: PathBuf,
        found: usize,
        expected: usize,
    },

    #[error("{regions} regions exceed the addressable {}", MAX_REGIONS)]
    TooManyRegions { regions: usize },

    /// The recorded starting allocation and the configured one differ.
    #[error(
        "initial balances {configured:?} differ from the allocation {recorded:?} recorded in '{}'",
        path.display()
    )]
    GenesisMismatch {
        path: PathBuf,
        recorded: Vec<Amount>,
        configured: Vec<Amount>,
    },

    /// The log holds orders but nothing says which allocation they start from.
    #[error(
        "transaction log holds {orders} orders but '{}' is missing; initial balances are required",
        path.display()
    )]
    MissingGenesis { path: PathBuf, orders: usize },

    /// A logged order could not be re-applied during balance replay.
    #[error("log replay failed at order {index}: {source}")]
    ReplayFailed {
        index: usize,
        #[source]
        source: TransferError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shutdown was already requested.
    #[error("ledger is closed")]
    Closed,

    #[error("failed to spawn ledger worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ledger worker panicked")]
    WorkerPanicked,
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        LedgerError::Csv {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_error_display_messages() {
        assert_eq!(TransferError::InsufficientFunds.to_string(), "insufficient funds");
        assert_eq!(
            TransferError::UnknownRegion(RegionId(9)).to_string(),
            "unknown region 9"
        );
        assert_eq!(TransferError::BalanceOverflow.to_string(), "balance overflow");
    }

    #[test]
    fn ledger_error_mentions_path() {
        let error = LedgerError::BadHeader {
            path: PathBuf::from("balances.csv"),
            expected: "region,balance".into(),
            found: "foo,bar".into(),
        };
        assert_eq!(
            error.to_string(),
            "bad header in 'balances.csv': expected 'region,balance', found 'foo,bar'"
        );
    }

    #[test]
    fn replay_failure_keeps_source() {
        use std::error::Error;

        let error = LedgerError::ReplayFailed {
            index: 3,
            source: TransferError::InsufficientFunds,
        };
        assert_eq!(
            error.source().map(|s| s.to_string()),
            Some("insufficient funds".to_string())
        );
    }

    #[test]
    fn genesis_errors_name_the_file() {
        let error = LedgerError::GenesisMismatch {
            path: PathBuf::from("transactions.genesis.csv"),
            recorded: vec![100, 0],
            configured: vec![1000, 0],
        };
        assert_eq!(
            error.to_string(),
            "initial balances [1000, 0] differ from the allocation [100, 0] recorded in \
             'transactions.genesis.csv'"
        );
        assert_eq!(
            LedgerError::TooManyRegions { regions: 70_000 }.to_string(),
            "70000 regions exceed the addressable 65536"
        );
    }
}
