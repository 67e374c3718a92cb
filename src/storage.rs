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

//! The persisted files.
//!
//! # Transaction log
//!
//! Append-only CSV, one row per committed order, never rewritten:
//!
//! ```csv
//! sender,recipient,money
//! 0,1,40
//! ```
//!
//! # Balance snapshot
//!
//! CSV with one row per region, truncated and rewritten after every applied
//! order:
//!
//! ```csv
//! region,balance
//! 0,60
//! 1,40
//! ```
//!
//! # Genesis
//!
//! The allocation the log starts from, in snapshot format. Written once when
//! the ledger is created and never changed.

use crate::base::{Amount, RegionId};
use crate::book::BalanceTable;
use crate::error::LedgerError;
use crate::order::Order;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const LOG_HEADER: [&str; 3] = ["sender", "recipient", "money"];
pub const SNAPSHOT_HEADER: [&str; 2] = ["region", "balance"];

/// One snapshot row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BalanceRow {
    pub region: RegionId,
    pub balance: Amount,
}

/// Encodes `header` and `rows` as CSV in memory, so each file write is a
/// single `write_all`.
fn encode<S: Serialize>(
    path: &Path,
    header: Option<&[&str]>,
    rows: impl IntoIterator<Item = S>,
) -> Result<Vec<u8>, LedgerError> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    if let Some(header) = header {
        wtr.write_record(header)
            .map_err(|e| LedgerError::csv(path, e))?;
    }
    for row in rows {
        wtr.serialize(row).map_err(|e| LedgerError::csv(path, e))?;
    }
    wtr.into_inner()
        .map_err(|e| LedgerError::io(path, e.into_error()))
}

fn balance_rows(balances: &BalanceTable) -> impl Iterator<Item = BalanceRow> + '_ {
    balances
        .iter()
        .map(|(region, balance)| BalanceRow { region, balance })
}

/// `path` with `suffix` appended to its file name.
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Records the starting allocation of a ledger, in snapshot format.
///
/// The rows are written to `<path>.tmp` and renamed over `path`, so a crash
/// leaves either no genesis file or a complete one.
pub fn write_genesis(path: &Path, balances: &BalanceTable, sync: bool) -> Result<(), LedgerError> {
    let content = encode(path, Some(&SNAPSHOT_HEADER[..]), balance_rows(balances))?;
    let staging = sibling(path, ".tmp");

    let mut file = File::create(&staging).map_err(|e| LedgerError::io(&staging, e))?;
    file.write_all(&content)
        .map_err(|e| LedgerError::io(&staging, e))?;
    if sync {
        file.sync_data().map_err(|e| LedgerError::io(&staging, e))?;
    }
    fs::rename(&staging, path).map_err(|e| LedgerError::io(path, e))
}

/// Append-mode handle on the transaction log.
#[derive(Debug)]
pub struct TransactionLog {
    file: File,
    path: PathBuf,
    sync: bool,
}

impl TransactionLog {
    /// Opens the log for appending, creating it if missing.
    ///
    /// A new or zero-length log gets its header row. Returns the log and
    /// whether the header was written.
    pub fn open(path: &Path, sync: bool) -> Result<(Self, bool), LedgerError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| LedgerError::io(path, e))?;
        let created = file.metadata().map_err(|e| LedgerError::io(path, e))?.len() == 0;

        if created {
            let header = encode::<Order>(path, Some(&LOG_HEADER[..]), [])?;
            file.write_all(&header)
                .map_err(|e| LedgerError::io(path, e))?;
            if sync {
                file.sync_data().map_err(|e| LedgerError::io(path, e))?;
            }
        }

        let log = Self {
            file,
            path: path.to_path_buf(),
            sync,
        };
        Ok((log, created))
    }

    /// Appends one order row.
    pub fn append(&mut self, order: &Order) -> Result<(), LedgerError> {
        let row = encode(&self.path, None, [order])?;
        self.file
            .write_all(&row)
            .map_err(|e| LedgerError::io(&self.path, e))?;
        if self.sync {
            self.file
                .sync_data()
                .map_err(|e| LedgerError::io(&self.path, e))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read-write handle on the balance snapshot.
#[derive(Debug)]
pub struct SnapshotFile {
    file: File,
    path: PathBuf,
    sync: bool,
}

impl SnapshotFile {
    /// Opens the snapshot, creating it if missing. Existing content is kept
    /// until the first [`rewrite`](Self::rewrite).
    ///
    /// Returns the handle and whether the file was new or empty.
    pub fn open(path: &Path, sync: bool) -> Result<(Self, bool), LedgerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| LedgerError::io(path, e))?;
        let created = file.metadata().map_err(|e| LedgerError::io(path, e))?.len() == 0;

        let snapshot = Self {
            file,
            path: path.to_path_buf(),
            sync,
        };
        Ok((snapshot, created))
    }

    /// Truncates the file and writes the header plus one row per region, in
    /// region order.
    pub fn rewrite(&mut self, balances: &BalanceTable) -> Result<(), LedgerError> {
        let content = encode(&self.path, Some(&SNAPSHOT_HEADER[..]), balance_rows(balances))?;

        let io = |e: std::io::Error| LedgerError::io(&self.path, e);
        self.file.set_len(0).map_err(io)?;
        self.file.seek(SeekFrom::Start(0)).map_err(io)?;
        self.file.write_all(&content).map_err(io)?;
        if self.sync {
            self.file.sync_data().map_err(io)?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
