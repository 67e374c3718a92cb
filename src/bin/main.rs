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

use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use region_ledger::{Ledger, LedgerConfig, LedgerError, Order, RecoveryMode, RegionDirectory};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::{panic, process, thread};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Region Ledger - Apply transfer orders and print balances
///
/// Opens (or creates) the transaction log and balance snapshot, submits the
/// orders from FILE, waits for them to be applied and writes the resulting
/// balances to stdout.
#[derive(Parser, Debug)]
#[command(name = "region-ledger")]
#[command(about = "A single-writer ledger that applies transfer orders between regions", long_about = None)]
struct Args {
    /// Path to CSV file with orders
    ///
    /// Expected format: sender,recipient,money
    /// Example: cargo run -- orders.csv > balances-report.csv
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Append-only transaction log
    #[arg(long, default_value = "transactions.csv")]
    log: PathBuf,

    /// Balance snapshot, rewritten after every applied order
    #[arg(long, default_value = "balances.csv")]
    snapshot: PathBuf,

    /// Initial balances, one per region, comma separated. Optional once the
    /// ledger has recorded its genesis allocation, which they must match
    #[arg(long, value_delimiter = ',')]
    initial: Vec<u64>,

    /// Where startup balances come from
    #[arg(long, value_enum, default_value_t = Recovery::Replay)]
    recovery: Recovery,

    /// Number of threads submitting orders
    #[arg(long, default_value_t = 1)]
    producers: usize,

    /// fsync the log and snapshot after every write
    #[arg(long)]
    sync: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Recovery {
    /// Initial balances plus a replay of the transaction log
    Replay,
    /// Balances from the snapshot file, history from the log
    Snapshot,
}

impl From<Recovery> for RecoveryMode {
    fn from(recovery: Recovery) -> Self {
        match recovery {
            Recovery::Replay => RecoveryMode::Replay,
            Recovery::Snapshot => RecoveryMode::Snapshot,
        }
    }
}

fn main() {
    // Logs go to stderr so stdout stays CSV.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let directory = RegionDirectory::default();

    let config = LedgerConfig::new(args.log, args.snapshot, directory.len())
        .with_initial_balances(args.initial)
        .with_recovery(args.recovery.into())
        .with_sync_writes(args.sync);

    let ledger = match Ledger::open(config) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!(error = %e, "ledger failed to start");
            process::exit(1);
        }
    };

    if let Some(input) = &args.input {
        let file = match File::open(input) {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %input.display(), "cannot open orders file");
                process::exit(1);
            }
        };
        match submit_orders(&ledger, BufReader::new(file), args.producers) {
            Ok(submitted) => info!(submitted, "orders queued"),
            Err(e) => {
                error!(error = %e, "failed to submit orders");
                process::exit(1);
            }
        }
    }

    if let Err(e) = ledger.sync() {
        error!(error = %e, "failed to wait for the ledger worker");
        process::exit(1);
    }
    if let Err(e) = write_balances(&ledger, &directory, std::io::stdout()) {
        error!(error = %e, "failed to write balances");
        process::exit(1);
    }

    match ledger.shutdown() {
        Ok(stats) => info!(applied = stats.applied, rejected = stats.rejected, "done"),
        Err(e) => {
            error!(error = %e, "ledger shutdown failed");
            process::exit(1);
        }
    }
}

/// Parses orders from a CSV reader.
///
/// Malformed rows are skipped with a warning.
///
/// # CSV Format
///
/// ```csv
/// sender,recipient,money
/// 0,1,40
/// ```
fn read_orders<R: Read>(reader: R) -> Vec<Order> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);

    rdr.deserialize::<Order>()
        .filter_map(|result| match result {
            Ok(order) => Some(order),
            Err(e) => {
                warn!(error = %e, "skipping malformed order row");
                None
            }
        })
        .collect()
}

/// Submits the orders from `reader`, split evenly across `producers` threads.
///
/// Returns the number of orders queued.
fn submit_orders<R: Read>(ledger: &Ledger, reader: R, producers: usize) -> Result<usize, LedgerError> {
    let orders = read_orders(reader);
    if orders.is_empty() {
        return Ok(0);
    }
    let chunk = orders.len().div_ceil(producers.max(1));

    thread::scope(|scope| {
        let handles: Vec<_> = orders
            .chunks(chunk)
            .map(|batch| {
                let submitter = ledger.submitter();
                scope.spawn(move || submitter.submit(batch.to_vec()))
            })
            .collect();

        let mut submitted = 0;
        for handle in handles {
            match handle.join() {
                Ok(result) => submitted += result?,
                Err(payload) => panic::resume_unwind(payload),
            }
        }
        Ok(submitted)
    })
}

/// Writes `region,name,balance` rows for every region.
fn write_balances<W: Write>(
    ledger: &Ledger,
    directory: &RegionDirectory,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["region", "name", "balance"])?;

    let balances = ledger.balances();
    for (region, balance) in balances.iter() {
        let name = directory.name(region).unwrap_or("");
        wtr.write_record([region.to_string(), name.to_string(), balance.to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}
