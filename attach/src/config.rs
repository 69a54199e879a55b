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

use cast_lib::models::{RemoteAction, RemoteSignal};
use clap::Parser;

/// Follows the cast running on a Castbeam receiver.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct AttachConfig {
    /// Receiver to attach to (the first one found when empty)
    #[arg(short, long, default_value = "")]
    pub name: String,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Send one remote action (PLAY, SEEK+, VOLUME, ...) and exit
    #[arg(short, long)]
    pub action: Option<RemoteAction>,

    /// Value for the action: a 0-1 fraction for SEEK and VOLUME, seconds for SEEK+/SEEK-
    #[arg(short, long, requires = "action", allow_negative_numbers = true)]
    pub value: Option<f64>,
}

impl AttachConfig {
    pub fn signal(&self) -> Option<RemoteSignal> {
        self.action.map(|action| RemoteSignal::new(action, self.value))
    }
}
