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

use cast_lib::packet::Packet;
use tokio::sync::mpsc;

pub mod config;
pub mod media;
pub mod media_server;
pub mod playlist;
pub mod registry;
pub mod server;
pub mod session;

pub type ClientId = u64;

#[derive(Debug)]
pub enum Event {
    ClientConnected {
        id: ClientId,
        tx: mpsc::Sender<Packet>,
    },
    ClientDisconnected(ClientId),
    Packet {
        id: ClientId,
        packet: Packet,
    },
    Quit,
}
