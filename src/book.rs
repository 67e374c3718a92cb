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

//! In-memory ledger state: balances per region and the applied order history.
//!
//! # Example
//!
//! ```
//! use region_ledger::{BalanceTable, Order, RegionId};
//!
//! let mut table = BalanceTable::from_balances(vec![100, 0]).unwrap();
//! table.transfer(&Order::new(RegionId(0), RegionId(1), 40)).unwrap();
//! assert_eq!(table.as_slice(), &[60, 40]);
//! ```

use crate::base::{Amount, MAX_REGIONS, RegionId};
use crate::error::{LedgerError, TransferError};
use crate::order::Order;

/// Fixed-size mapping of region to balance.
///
/// # Invariants
///
/// - The number of regions never changes and is at most [`MAX_REGIONS`], so
///   every slot has a [`RegionId`].
/// - A successful [`transfer`](BalanceTable::transfer) leaves the sum of all
///   balances unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceTable {
    balances: Vec<Amount>,
}

impl BalanceTable {
    /// Creates a table of `regions` zero balances.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TooManyRegions`] above [`MAX_REGIONS`].
    pub fn zeroed(regions: usize) -> Result<Self, LedgerError> {
        if regions > MAX_REGIONS {
            return Err(LedgerError::TooManyRegions { regions });
        }
        Ok(Self {
            balances: vec![0; regions],
        })
    }

    /// Creates a table from balances listed in region order.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TooManyRegions`] if more than [`MAX_REGIONS`] balances
    /// are given.
    pub fn from_balances(balances: Vec<Amount>) -> Result<Self, LedgerError> {
        if balances.len() > MAX_REGIONS {
            return Err(LedgerError::TooManyRegions {
                regions: balances.len(),
            });
        }
        Ok(Self { balances })
    }

    pub fn regions(&self) -> usize {
        self.balances.len()
    }

    pub fn get(&self, region: RegionId) -> Option<Amount> {
        self.balances.get(region.index()).copied()
    }

    pub fn as_slice(&self) -> &[Amount] {
        &self.balances
    }

    /// Iterates `(region, balance)` pairs in region order.
    pub fn iter(&self) -> impl Iterator<Item = (RegionId, Amount)> + '_ {
        (0..=u16::MAX)
            .map(RegionId)
            .zip(self.balances.iter().copied())
    }

    /// Sum of all balances.
    pub fn total(&self) -> u128 {
        self.balances.iter().map(|&b| u128::from(b)).sum()
    }

    /// Validates `order` against current balances without changing them.
    pub fn check(&self, order: &Order) -> Result<(), TransferError> {
        let available = self
            .get(order.sender())
            .ok_or(TransferError::UnknownRegion(order.sender()))?;
        let received = self
            .get(order.recipient())
            .ok_or(TransferError::UnknownRegion(order.recipient()))?;

        if available < order.amount() {
            return Err(TransferError::InsufficientFunds);
        }
        if order.sender() != order.recipient() && received.checked_add(order.amount()).is_none() {
            return Err(TransferError::BalanceOverflow);
        }
        Ok(())
    }

    /// Debits the sender and credits the recipient.
    ///
    /// On error no balance changes.
    pub fn transfer(&mut self, order: &Order) -> Result<(), TransferError> {
        self.check(order)?;
        #[cfg(debug_assertions)]
        let total = self.total();

        self.balances[order.sender().index()] -= order.amount();
        self.balances[order.recipient().index()] += order.amount();

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            total,
            self.total(),
            "Invariant violated: transfer {order} changed the total balance"
        );
        Ok(())
    }
}

/// Append-only sequence of applied orders, indexed by insertion order.
///
/// Storage grows by a fixed block of slots whenever it is full and never
/// shrinks.
#[derive(Debug, Clone)]
pub struct OrderHistory {
    orders: Vec<Order>,
    block: usize,
}

impl OrderHistory {
    pub const DEFAULT_BLOCK: usize = 64;

    /// Creates an empty history growing by `block` orders at a time.
    pub fn new(block: usize) -> Self {
        Self {
            orders: Vec::new(),
            block: block.max(1),
        }
    }

    pub fn push(&mut self, order: Order) {
        if self.orders.len() == self.orders.capacity() {
            self.orders.reserve_exact(self.block);
        }
        self.orders.push(order);
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Order> {
        self.orders.get(index).copied()
    }

    pub fn as_slice(&self) -> &[Order] {
        &self.orders
    }

    /// Allocated slots.
    pub fn capacity(&self) -> usize {
        self.orders.capacity()
    }
}

impl Default for OrderHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BLOCK)
    }
}

/// Balances and history, updated together as one unit under one lock.
#[derive(Debug, Clone)]
pub struct Book {
    balances: BalanceTable,
    history: OrderHistory,
}

impl Book {
    pub fn new(balances: BalanceTable, history: OrderHistory) -> Self {
        Self { balances, history }
    }

    pub fn balances(&self) -> &BalanceTable {
        &self.balances
    }

    pub fn history(&self) -> &OrderHistory {
        &self.history
    }

    /// Applies a transfer and records it. A rejected order is not recorded.
    pub fn apply(&mut self, order: Order) -> Result<(), TransferError> {
        self.balances.transfer(&order)?;
        self.history.push(order);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(sender: u16, recipient: u16, amount: Amount) -> Order {
        Order::new(RegionId(sender), RegionId(recipient), amount)
    }

    #[test]
    fn transfer_moves_funds() {
        let mut table = BalanceTable::from_balances(vec![100, 0, 5]).unwrap();
        table.transfer(&order(0, 1, 40)).unwrap();
        assert_eq!(table.as_slice(), &[60, 40, 5]);
        assert_eq!(table.total(), 105);
    }

    #[test]
    fn region_count_is_bounded() {
        let full = BalanceTable::zeroed(MAX_REGIONS).unwrap();
        assert_eq!(full.iter().count(), MAX_REGIONS);
        assert_eq!(full.iter().last().map(|(region, _)| region), Some(RegionId(u16::MAX)));

        assert!(matches!(
            BalanceTable::zeroed(MAX_REGIONS + 1),
            Err(LedgerError::TooManyRegions { regions }) if regions == MAX_REGIONS + 1
        ));
        assert!(matches!(
            BalanceTable::from_balances(vec![1; MAX_REGIONS + 1]),
            Err(LedgerError::TooManyRegions { .. })
        ));
    }

    #[test]
    fn transfer_of_whole_balance() {
        let mut table = BalanceTable::from_balances(vec![10, 0]).unwrap();
        table.transfer(&order(0, 1, 10)).unwrap();
        assert_eq!(table.as_slice(), &[0, 10]);
    }

    #[test]
    fn insufficient_funds_leaves_balances() {
        let mut table = BalanceTable::from_balances(vec![60, 40]).unwrap();
        let result = table.transfer(&order(0, 1, 1000));
        assert_eq!(result, Err(TransferError::InsufficientFunds));
        assert_eq!(table.as_slice(), &[60, 40]);
    }

    #[test]
    fn unknown_regions_are_rejected() {
        let table = BalanceTable::zeroed(2).unwrap();
        assert_eq!(
            table.check(&order(2, 0, 0)),
            Err(TransferError::UnknownRegion(RegionId(2)))
        );
        assert_eq!(
            table.check(&order(0, 9, 0)),
            Err(TransferError::UnknownRegion(RegionId(9)))
        );
    }

    #[test]
    fn overflowing_credit_is_rejected() {
        let mut table = BalanceTable::from_balances(vec![10, Amount::MAX]).unwrap();
        assert_eq!(
            table.transfer(&order(0, 1, 1)),
            Err(TransferError::BalanceOverflow)
        );
        assert_eq!(table.as_slice(), &[10, Amount::MAX]);
    }

    #[test]
    fn self_transfer_is_a_no_op() {
        let mut table = BalanceTable::from_balances(vec![Amount::MAX]).unwrap();
        table.transfer(&order(0, 0, 5)).unwrap();
        assert_eq!(table.as_slice(), &[Amount::MAX]);
    }

    #[test]
    fn zero_amount_is_allowed() {
        let mut table = BalanceTable::zeroed(2).unwrap();
        table.transfer(&order(0, 1, 0)).unwrap();
        assert_eq!(table.as_slice(), &[0, 0]);
    }

    #[test]
    fn iter_pairs_regions_in_order() {
        let table = BalanceTable::from_balances(vec![3, 1, 2]).unwrap();
        let pairs: Vec<_> = table.iter().collect();
        assert_eq!(
            pairs,
            vec![(RegionId(0), 3), (RegionId(1), 1), (RegionId(2), 2)]
        );
    }

    #[test]
    fn history_grows_in_blocks() {
        let mut history = OrderHistory::new(4);
        assert_eq!(history.capacity(), 0);
        for i in 0..9 {
            history.push(order(0, 1, i));
            assert!(history.capacity() >= history.len());
        }
        assert_eq!(history.len(), 9);
        assert_eq!(history.get(8), Some(order(0, 1, 8)));
        assert_eq!(history.get(9), None);
    }

    #[test]
    fn zero_block_is_clamped() {
        let mut history = OrderHistory::new(0);
        history.push(order(0, 1, 1));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn book_records_only_applied_orders() {
        let mut book = Book::new(BalanceTable::from_balances(vec![100, 0]).unwrap(), OrderHistory::default());
        book.apply(order(0, 1, 40)).unwrap();
        assert_eq!(book.apply(order(0, 1, 1000)), Err(TransferError::InsufficientFunds));

        assert_eq!(book.balances().as_slice(), &[60, 40]);
        assert_eq!(book.history().as_slice(), &[order(0, 1, 40)]);
    }
}
