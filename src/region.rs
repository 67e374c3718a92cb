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

//! Region names.

use crate::base::RegionId;

/// Maps region ids to human-readable names.
///
/// The ledger itself only needs [`len`](RegionDirectory::len).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionDirectory {
    names: Vec<String>,
}

impl RegionDirectory {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, region: RegionId) -> Option<&str> {
        self.names.get(region.index()).map(String::as_str)
    }

    /// Looks a region up by name, ignoring ASCII case.
    pub fn find(&self, name: &str) -> Option<RegionId> {
        self.names
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
            .and_then(|index| u16::try_from(index).ok())
            .map(RegionId)
    }
}

impl Default for RegionDirectory {
    fn default() -> Self {
        Self::new(["Calgary", "New York", "Singapore"])
    }
}
