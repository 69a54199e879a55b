// Copyright (C) 2025 Marcus L. Hanestad <marlhan@proton.me>
//
// This file is part of Castbeam.
//
// Castbeam is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Castbeam is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Castbeam.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::HashSet;

use common::discovery::local_name;

/// Receiver names currently connected to this sender, compared the way they
/// appear in discovery records.
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if an equivalent name is already registered.
    pub fn register(&mut self, name: &str) -> bool {
        self.names.insert(local_name(name))
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.names.remove(&local_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&local_name(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
