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

use cast_lib::models::{AttachInfo, HostTarget, RemoteSignal};
use common::channel::ChannelEvent;
use tokio::sync::oneshot;

pub mod api;
pub mod cec;
pub mod config;
pub mod keymap;
pub mod player;
pub mod session;

#[derive(Debug)]
pub enum Event {
    Channel(ChannelEvent),
    Player(player::PlayerEvent),
    CecKey(cec::CecKey),
    /// Host migration request from the HTTP API.
    Connect(HostTarget),
    Remote(RemoteSignal),
    AttachQuery(oneshot::Sender<AttachInfo>),
    Quit,
}

impl From<ChannelEvent> for Event {
    fn from(value: ChannelEvent) -> Self {
        Self::Channel(value)
    }
}
