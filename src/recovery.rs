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

//! Startup reconstruction of ledger state from the persisted files.
//!
//! History always comes from the transaction log. Balances depend on
//! [`RecoveryMode`]:
//!
//! - [`RecoveryMode::Replay`]: the genesis allocation plus every logged
//!   order. The snapshot is only compared against the result.
//! - [`RecoveryMode::Snapshot`]: the snapshot rows as written. If replaying the
//!   log gives different balances a warning is logged and the snapshot wins.
//!
//! The genesis allocation is recorded next to the log the first time a
//! ledger starts, so later starts replay from the same base whatever the
//! caller configures. A configured allocation that differs from the recorded
//! one is refused.
//!
//! Any malformed row, wrong header or out-of-range region is fatal.

use crate::base::RegionId;
use crate::book::{BalanceTable, Book, OrderHistory};
use crate::config::{LedgerConfig, RecoveryMode};
use crate::error::LedgerError;
use crate::order::Order;
use crate::storage::{BalanceRow, LOG_HEADER, SNAPSHOT_HEADER, sibling, write_genesis};
use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{info, warn};

/// Drops a trailing partial row left by an interrupted append.
///
/// Every row the ledger writes ends in a newline, so bytes after the last
/// newline never finished writing, even when they parse: a torn `0,1,40` can
/// read as `0,1,4`. The dropped bytes are appended to `<log>.torn` before the
/// log is truncated. Returns the number of bytes removed.
pub fn repair_log_tail(path: &Path) -> Result<u64, LedgerError> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(LedgerError::io(path, e)),
    };
    if content.is_empty() || content.ends_with(b"\n") {
        return Ok(0);
    }

    let keep = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    let tail = &content[keep..];
    let dropped = tail.len() as u64;

    let torn = sibling(path, ".torn");
    let mut saved = tail.to_vec();
    saved.push(b'\n');
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&torn)
        .and_then(|mut file| file.write_all(&saved))
        .map_err(|e| LedgerError::io(&torn, e))?;

    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_len(keep as u64))
        .map_err(|e| LedgerError::io(path, e))?;

    let text = String::from_utf8_lossy(tail);
    match parse_unterminated(tail) {
        Some(order) => warn!(
            path = %path.display(),
            %order,
            saved = %torn.display(),
            "dropped unterminated order row, possibly cut short"
        ),
        None => warn!(
            path = %path.display(),
            dropped,
            tail = %text,
            saved = %torn.display(),
            "truncated torn transaction log tail"
        ),
    }
    Ok(dropped)
}

fn parse_unterminated(tail: &[u8]) -> Option<Order> {
    ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_reader(tail)
        .deserialize::<Order>()
        .next()?
        .ok()
}

/// Opens a CSV reader, or `None` if the file is missing or empty.
fn open_reader(path: &Path) -> Result<Option<Reader<File>>, LedgerError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LedgerError::io(path, e)),
    };
    if file.metadata().map_err(|e| LedgerError::io(path, e))?.len() == 0 {
        return Ok(None);
    }

    let reader = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(file);
    Ok(Some(reader))
}

fn check_header(
    reader: &mut Reader<File>,
    path: &Path,
    expected: &[&str],
) -> Result<StringRecord, LedgerError> {
    let headers = reader
        .headers()
        .map_err(|e| LedgerError::csv(path, e))?
        .clone();
    if !headers.iter().eq(expected.iter().copied()) {
        return Err(LedgerError::BadHeader {
            path: path.to_path_buf(),
            expected: expected.join(","),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }
    Ok(headers)
}

/// Parses every data row, yielding `(line, row)`.
fn rows<T: DeserializeOwned>(
    reader: &mut Reader<File>,
    path: &Path,
    headers: &StringRecord,
) -> Result<Vec<(u64, T)>, LedgerError> {
    let mut parsed = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| LedgerError::MalformedRow {
            path: path.to_path_buf(),
            line: e.position().map_or(0, |p| p.line()),
            reason: e.to_string(),
        })?;
        let line = record.position().map_or(0, |p| p.line());
        let row = record
            .deserialize(Some(headers))
            .map_err(|e| LedgerError::MalformedRow {
                path: path.to_path_buf(),
                line,
                reason: e.to_string(),
            })?;
        parsed.push((line, row));
    }
    Ok(parsed)
}

fn ensure_region(path: &Path, line: u64, region: RegionId, regions: usize) -> Result<(), LedgerError> {
    if region.is_within(regions) {
        Ok(())
    } else {
        Err(LedgerError::RegionOutOfRange {
            path: path.to_path_buf(),
            line,
            region,
            regions,
        })
    }
}

/// Rebuilds the order history from the transaction log.
///
/// A missing or empty log yields an empty history.
pub fn load_history(path: &Path, regions: usize, block: usize) -> Result<OrderHistory, LedgerError> {
    let mut history = OrderHistory::new(block);
    let Some(mut reader) = open_reader(path)? else {
        return Ok(history);
    };
    let headers = check_header(&mut reader, path, &LOG_HEADER)?;

    for (line, order) in rows::<Order>(&mut reader, path, &headers)? {
        ensure_region(path, line, order.sender(), regions)?;
        ensure_region(path, line, order.recipient(), regions)?;
        history.push(order);
    }
    Ok(history)
}

/// Reads balances from the snapshot.
///
/// Returns `None` if the snapshot is missing or empty. Otherwise every region
/// must appear exactly once.
pub fn load_balances(path: &Path, regions: usize) -> Result<Option<BalanceTable>, LedgerError> {
    let Some(mut reader) = open_reader(path)? else {
        return Ok(None);
    };
    let headers = check_header(&mut reader, path, &SNAPSHOT_HEADER)?;

    let mut slots = vec![None; regions];
    for (line, row) in rows::<BalanceRow>(&mut reader, path, &headers)? {
        ensure_region(path, line, row.region, regions)?;
        let slot = &mut slots[row.region.index()];
        if slot.is_some() {
            return Err(LedgerError::DuplicateRegion {
                path: path.to_path_buf(),
                region: row.region,
            });
        }
        *slot = Some(row.balance);
    }

    let found = slots.iter().filter(|slot| slot.is_some()).count();
    if found != regions {
        return Err(LedgerError::MissingRegions {
            path: path.to_path_buf(),
            found,
            expected: regions,
        });
    }
    let table = BalanceTable::from_balances(slots.into_iter().flatten().collect())?;
    Ok(Some(table))
}

/// Applies every order in `history` to `initial`.
///
/// # Errors
///
/// [`LedgerError::ReplayFailed`] if an order does not pass the balance check,
/// which means the log does not start from `initial`.
pub fn replay(initial: BalanceTable, history: &OrderHistory) -> Result<BalanceTable, LedgerError> {
    let mut balances = initial;
    for (index, order) in history.as_slice().iter().enumerate() {
        balances
            .transfer(order)
            .map_err(|source| LedgerError::ReplayFailed { index, source })?;
    }
    Ok(balances)
}

/// Resolves the allocation the transaction log replays from.
///
/// A recorded genesis wins, and a configured allocation must equal it.
/// Without one the configured allocation (all zero if empty) is used, unless
/// the log already holds orders and nothing was configured. Returns the
/// allocation and whether it still has to be recorded.
pub fn resolve_genesis(
    config: &LedgerConfig,
    history: &OrderHistory,
) -> Result<(BalanceTable, bool), LedgerError> {
    let path = &config.genesis_path;
    if let Some(recorded) = load_balances(path, config.regions)? {
        if !config.initial_balances.is_empty() && config.initial_balances != recorded.as_slice() {
            return Err(LedgerError::GenesisMismatch {
                path: path.clone(),
                recorded: recorded.as_slice().to_vec(),
                configured: config.initial_balances.clone(),
            });
        }
        return Ok((recorded, true));
    }

    if !history.is_empty() && config.initial_balances.is_empty() {
        return Err(LedgerError::MissingGenesis {
            path: path.clone(),
            orders: history.len(),
        });
    }
    Ok((config.initial_table()?, false))
}

/// Warns when an existing snapshot disagrees with the replayed balances.
fn compare_snapshot(config: &LedgerConfig, replayed: &BalanceTable) {
    match load_balances(&config.snapshot_path, config.regions) {
        Ok(Some(cached)) if &cached != replayed => warn!(
            snapshot = ?cached.as_slice(),
            replayed = ?replayed.as_slice(),
            "balance snapshot disagrees with transaction log, rewriting it"
        ),
        Ok(_) => {}
        Err(error) => warn!(%error, "ignoring unreadable balance snapshot"),
    }
}

/// Rebuilds the in-memory book according to `config.recovery`.
///
/// Expects the log tail to be repaired already (see [`repair_log_tail`]).
/// Records the genesis allocation if it was not recorded yet and the log
/// replays from it.
pub fn recover(config: &LedgerConfig) -> Result<Book, LedgerError> {
    let history = load_history(&config.log_path, config.regions, config.history_block)?;
    let (genesis, recorded) = resolve_genesis(config, &history)?;

    let (balances, replays) = match config.recovery {
        RecoveryMode::Replay => {
            let replayed = replay(genesis.clone(), &history)?;
            compare_snapshot(config, &replayed);
            (replayed, true)
        }
        RecoveryMode::Snapshot => {
            let balances = match load_balances(&config.snapshot_path, config.regions)? {
                Some(balances) => balances,
                None => genesis.clone(),
            };
            let replays = match replay(genesis.clone(), &history) {
                Ok(replayed) => {
                    if replayed != balances {
                        warn!(
                            snapshot = ?balances.as_slice(),
                            replayed = ?replayed.as_slice(),
                            "balance snapshot disagrees with transaction log"
                        );
                    }
                    true
                }
                Err(e) => {
                    warn!(error = %e, "transaction log does not replay from the genesis allocation");
                    false
                }
            };
            (balances, replays)
        }
    };

    if !recorded && replays {
        write_genesis(&config.genesis_path, &genesis, config.sync_writes)?;
        info!(
            path = %config.genesis_path.display(),
            total = %genesis.total(),
            "recorded genesis allocation"
        );
    }

    info!(
        mode = ?config.recovery,
        orders = history.len(),
        total = %balances.total(),
        "recovered ledger state"
    );
    Ok(Book::new(balances, history))
}
