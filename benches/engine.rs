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

//! Benchmarks for the ledger.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - In-memory transfers and history growth
//! - Channel throughput with one and many producers
//! - End-to-end ledger throughput, including the log and snapshot writes
//! - Startup recovery from a populated log

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use region_ledger::recovery::{load_history, replay};
use region_ledger::{
    Amount, BalanceTable, Channel, Ledger, LedgerConfig, Order, OrderHistory, RegionId,
};
use std::fmt::Write as _;
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const REGIONS: u16 = 16;

// =============================================================================
// Helper Functions
// =============================================================================

fn make_order(seed: usize, amount: Amount) -> Order {
    let sender = (seed % usize::from(REGIONS)) as u16;
    let recipient = ((seed + 1) % usize::from(REGIONS)) as u16;
    Order::new(RegionId(sender), RegionId(recipient), amount)
}

fn open_ledger(dir: &TempDir) -> Ledger {
    let config = LedgerConfig::in_dir(dir.path(), usize::from(REGIONS))
        .with_initial_balances(vec![1_000_000; usize::from(REGIONS)]);
    Ledger::open(config).unwrap()
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_transfer(c: &mut Criterion) {
    c.bench_function("balance_table_transfer", |b| {
        let mut table = BalanceTable::from_balances(vec![1_000_000; usize::from(REGIONS)]).unwrap();
        let mut seed = 0usize;
        b.iter(|| {
            let order = make_order(seed, 1);
            seed += 1;
            let _ = table.transfer(black_box(&order));
        })
    });
}

fn bench_history_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_push");

    for block in [1, 64, 4_096].iter() {
        group.throughput(Throughput::Elements(10_000));
        group.bench_with_input(BenchmarkId::from_parameter(block), block, |b, &block| {
            b.iter(|| {
                let mut history = OrderHistory::new(block);
                for i in 0..10_000 {
                    history.push(make_order(i, 1));
                }
                black_box(&history);
            })
        });
    }
    group.finish();
}

fn bench_channel_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_push_pop");

    for count in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let channel = Channel::new();
                for i in 0..count {
                    channel.push(i);
                }
                for _ in 0..count {
                    black_box(channel.pop());
                }
            })
        });
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_channel_parallel_producers(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_parallel_producers");

    for count in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let channel = Arc::new(Channel::new());
                let consumer = {
                    let channel = channel.clone();
                    thread::spawn(move || {
                        for _ in 0..count {
                            black_box(channel.pop());
                        }
                    })
                };

                (0..count).into_par_iter().for_each(|i| channel.push(i));
                consumer.join().unwrap();
            })
        });
    }
    group.finish();
}

fn bench_ledger_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_throughput");
    group.sample_size(10);

    for count in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let dir = TempDir::new().unwrap();
            let ledger = open_ledger(&dir);
            b.iter(|| {
                let orders = (0..count).map(|i| make_order(i, 1)).collect();
                ledger.submit(orders).unwrap();
                ledger.sync().unwrap();
            });
            ledger.shutdown().unwrap();
        });
    }
    group.finish();
}

fn bench_ledger_parallel_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_parallel_submit");
    group.sample_size(10);

    for count in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let dir = TempDir::new().unwrap();
            let ledger = open_ledger(&dir);
            b.iter(|| {
                (0..count).into_par_iter().for_each_init(
                    || ledger.submitter(),
                    |submitter, i| {
                        submitter.submit(vec![make_order(i, 1)]).unwrap();
                    },
                );
                ledger.sync().unwrap();
            });
            ledger.shutdown().unwrap();
        });
    }
    group.finish();
}

// =============================================================================
// Recovery Benchmarks
// =============================================================================

fn bench_recovery_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery_replay");

    for count in [1_000, 10_000, 100_000].iter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("transactions.csv");
        let mut log = String::from("sender,recipient,money\n");
        for i in 0..*count {
            let order = make_order(i, 1);
            writeln!(log, "{},{},1", order.sender(), order.recipient()).unwrap();
        }
        fs::write(&path, log).unwrap();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                let history = load_history(&path, usize::from(REGIONS), 64).unwrap();
                let initial = BalanceTable::from_balances(vec![1_000_000; usize::from(REGIONS)]).unwrap();
                black_box(replay(initial, &history).unwrap());
            })
        });
    }
    group.finish();
}

criterion_group!(
    single_threaded,
    bench_transfer,
    bench_history_push,
    bench_channel_push_pop,
);

criterion_group!(
    multi_threaded,
    bench_channel_parallel_producers,
    bench_ledger_throughput,
    bench_ledger_parallel_submit,
);

criterion_group!(recovery, bench_recovery_replay,);

criterion_main!(single_threaded, multi_threaded, recovery);
