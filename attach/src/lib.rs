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

use anyhow::{anyhow, Result};
use cast_lib::models::{AttachInfo, HostTarget, RemoteSignal};
use cast_lib::packet::Packet;
use common::channel::{ChannelEvent, ChannelHandle};
use log::{debug, info, warn};

pub mod config;

#[derive(Debug)]
pub enum Event {
    Channel(ChannelEvent),
    Quit,
}

impl From<ChannelEvent> for Event {
    fn from(value: ChannelEvent) -> Self {
        Self::Channel(value)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AttachFlow {
    Continue,
    Done,
}

/// Sender controlling the receiver `name`, as reported by its API.
pub fn sender_target(name: &str, info: &AttachInfo) -> Result<HostTarget> {
    let host = info
        .host
        .as_deref()
        .ok_or_else(|| anyhow!("{name} is inactive"))?;
    HostTarget::from_url(host).ok_or_else(|| anyhow!("{name} reported an invalid sender: {host}"))
}

/// Observer of a running cast. With a pending signal it sends that signal once
/// attached and then finishes.
pub struct AttachSession {
    channel: ChannelHandle,
    receiver: Option<String>,
    pending: Option<RemoteSignal>,
}

impl AttachSession {
    pub fn new(channel: ChannelHandle) -> Self {
        Self {
            channel,
            receiver: None,
            pending: None,
        }
    }

    pub fn with_signal(mut self, signal: RemoteSignal) -> Self {
        self.pending = Some(signal);
        self
    }

    pub fn receiver(&self) -> Option<&str> {
        self.receiver.as_deref()
    }

    pub async fn handle(&mut self, event: Event) -> Result<AttachFlow> {
        let event = match event {
            Event::Channel(event) => event,
            Event::Quit => return Ok(AttachFlow::Done),
        };

        match event {
            ChannelEvent::Connected(target) => {
                debug!("Connected to sender {}", target.to_url());
                self.channel.send(Packet::AttachRequest).await?;
            }
            ChannelEvent::Disconnected(_) => {
                info!("Sender disconnected");
                return Ok(AttachFlow::Done);
            }
            ChannelEvent::Unreachable(err) => return Err(err.into()),
            ChannelEvent::Packet(packet) => return self.on_packet(packet).await,
        }

        Ok(AttachFlow::Continue)
    }

    async fn on_packet(&mut self, packet: Packet) -> Result<AttachFlow> {
        match packet {
            Packet::AttachConnect(msg) => {
                info!("Attached to {}", msg.name);
                info!("{}", msg.status.summary());
                self.receiver = Some(msg.name);
                if let Some(signal) = self.pending.take() {
                    self.remote(signal).await?;
                    return Ok(AttachFlow::Done);
                }
            }
            Packet::AttachStatus(status) => info!("{}", status.summary()),
            Packet::AttachShow(true) => debug!("Remote shown"),
            Packet::AttachShow(false) => {
                info!("Cast finished");
                return Ok(AttachFlow::Done);
            }
            Packet::None => (),
            _ => warn!("Unexpected packet: {packet:?}"),
        }

        Ok(AttachFlow::Continue)
    }

    /// Forwards a remote signal to the receiver through the sender.
    pub async fn remote(&self, signal: RemoteSignal) -> Result<()> {
        let Some(receiver) = self.receiver.as_deref() else {
            return Err(anyhow!("not attached"));
        };
        info!("Sending {:?} to {receiver}", signal.action);
        self.channel.send(Packet::AttachRemote(signal)).await?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Err(err) = self.channel.shutdown().await {
            debug!("Failed to shut down control channel: {err}");
        }
    }
}
