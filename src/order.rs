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

//! Transfer orders and the messages that carry them to the ledger worker.

use crate::base::{Amount, RegionId};
use crate::signal::Signal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A requested transfer of `amount` from `sender` to `recipient`.
///
/// Serializes as the transaction log row `sender,recipient,money`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    sender: RegionId,
    recipient: RegionId,
    #[serde(rename = "money")]
    amount: Amount,
}

impl Order {
    pub fn new(sender: RegionId, recipient: RegionId, amount: Amount) -> Self {
        Self {
            sender,
            recipient,
            amount,
        }
    }

    pub fn sender(&self) -> RegionId {
        self.sender
    }

    pub fn recipient(&self) -> RegionId {
        self.recipient
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Returns `true` if both ends name one of `regions` known regions.
    pub fn within(&self, regions: usize) -> bool {
        self.sender.is_within(regions) && self.recipient.is_within(regions)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.sender, self.recipient, self.amount)
    }
}

/// Items flowing through the ledger channel.
///
/// The channel order is the order in which the worker applies or rejects
/// transfers and observes shutdown.
#[derive(Debug)]
pub enum Message {
    Order(Order),
    /// Raised to `true` by the worker once every earlier message is handled.
    Barrier(Arc<Signal<bool>>),
    Shutdown,
}

impl From<Order> for Message {
    fn from(order: Order) -> Self {
        Message::Order(order)
    }
}
