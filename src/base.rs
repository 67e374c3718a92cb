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

//! Core identifier and money types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Money, in whole units. Balances and transfer amounts are never negative.
pub type Amount = u64;

/// Number of distinct [`RegionId`] values.
pub const MAX_REGIONS: usize = 1 << 16;

/// Identifier of a balance-holding region.
///
/// Wraps a `u16` used as a bounded index into the balance table. The ledger
/// never resolves it to a name; see [`RegionDirectory`](crate::RegionDirectory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RegionId(pub u16);

impl RegionId {
    /// Position of this region in a balance table.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Returns `true` if the id addresses one of `regions` known regions.
    pub fn is_within(self, regions: usize) -> bool {
        self.index() < regions
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for RegionId {
    fn from(id: u16) -> Self {
        RegionId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::RegionId;

    #[test]
    fn region_bounds() {
        assert!(RegionId(0).is_within(3));
        assert!(RegionId(2).is_within(3));
        assert!(!RegionId(3).is_within(3));
        assert!(!RegionId(0).is_within(0));
    }

    #[test]
    fn region_displays_as_number() {
        assert_eq!(RegionId(7).to_string(), "7");
        assert_eq!(RegionId::from(4).index(), 4);
    }

    #[test]
    fn max_regions_covers_every_id() {
        assert_eq!(RegionId(u16::MAX).index() + 1, super::MAX_REGIONS);
    }
}
