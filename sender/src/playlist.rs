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

use cast_lib::models::{ControlCommand, PlaylistPosition};

/// Outcome of a navigation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(usize),
    Unchanged,
    /// The last item finished playing.
    End,
}

/// Ordered, deduplicated list of media items with a cursor.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    items: Vec<String>,
    cursor: usize,
}

impl Playlist {
    /// Keeps the first occurrence of every item.
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut deduped: Vec<String> = Vec::new();
        for item in items {
            let item = item.into();
            if !deduped.contains(&item) {
                deduped.push(item);
            }
        }

        Self {
            items: deduped,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn current(&self) -> Option<&str> {
        self.items.get(self.cursor).map(String::as_str)
    }

    pub fn position(&self) -> PlaylistPosition {
        PlaylistPosition {
            index: self.cursor + 1,
            length: self.items.len().max(1),
        }
    }

    /// Moves the cursor to `index` if it is in bounds.
    pub fn set_cursor(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.cursor = index;
            true
        } else {
            false
        }
    }

    pub fn navigate(&mut self, command: ControlCommand) -> Navigation {
        let Some(last) = self.items.len().checked_sub(1) else {
            return Navigation::Unchanged;
        };

        let target = match command {
            ControlCommand::TrackEnded if self.cursor >= last => return Navigation::End,
            ControlCommand::TrackEnded | ControlCommand::NextTrack if self.cursor < last => {
                self.cursor + 1
            }
            ControlCommand::PreviousTrack if self.cursor > 0 => self.cursor - 1,
            _ => return Navigation::Unchanged,
        };

        self.cursor = target;
        Navigation::Moved(target)
    }

    /// Moves the cursor forward to the first item at or after it that passes
    /// `exists`. Returns the new cursor, or `None` when no such item is left.
    pub fn resolve<F>(&mut self, exists: F) -> Option<usize>
    where
        F: Fn(&str) -> bool,
    {
        let index = self
            .items
            .iter()
            .enumerate()
            .skip(self.cursor)
            .find(|(_, item)| exists(item))
            .map(|(index, _)| index)?;
        self.cursor = index;
        Some(index)
    }
}
