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

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use cast_lib::models::{
    is_url, AttachConnectMessage, CastMessage, ControlCommand, InvalidMessage, SessionStatus,
};
use cast_lib::packet::Packet;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};

use crate::media::{MediaInfo, MediaProbe};
use crate::media_server::ActiveMedia;
use crate::playlist::{Navigation, Playlist};
use crate::registry::NameRegistry;
use crate::{ClientId, Event};

#[derive(Debug)]
pub enum SessionFlow {
    Continue,
    Finished,
    Failed(anyhow::Error),
}

#[derive(Debug)]
struct Client {
    tx: mpsc::Sender<Packet>,
    /// Set once the client's `connect` was accepted.
    name: Option<String>,
    invalid: bool,
    attached: bool,
}

/// Sender side of a cast: owns the playlist and answers the receivers and
/// attach clients connected to the control port.
pub struct CastSession<M> {
    playlist: Playlist,
    probe: M,
    registry: NameRegistry,
    clients: HashMap<ClientId, Client>,
    controller: Option<ClientId>,
    identity: Option<String>,
    explicit_subs: Option<PathBuf>,
    media_tx: watch::Sender<ActiveMedia>,
    status: Option<SessionStatus>,
    changing_track: bool,
}

impl<M: MediaProbe> CastSession<M> {
    pub fn new(playlist: Playlist, probe: M, media_tx: watch::Sender<ActiveMedia>) -> Self {
        Self {
            playlist,
            probe,
            registry: NameRegistry::new(),
            clients: HashMap::new(),
            controller: None,
            identity: None,
            explicit_subs: None,
            media_tx,
            status: None,
            changing_track: false,
        }
    }

    /// Subtitles used for the first playlist item instead of probed ones.
    pub fn with_subs(mut self, subs: Option<PathBuf>) -> Self {
        self.explicit_subs = subs;
        self
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_changing_track(&self) -> bool {
        self.changing_track
    }

    pub async fn handle(&mut self, event: Event) -> SessionFlow {
        match event {
            Event::ClientConnected { id, tx } => {
                debug!("id={id} Client connected");
                self.clients.insert(
                    id,
                    Client {
                        tx,
                        name: None,
                        invalid: false,
                        attached: false,
                    },
                );
                SessionFlow::Continue
            }
            Event::ClientDisconnected(id) => self.on_disconnect(id),
            Event::Packet { id, packet } => self.on_packet(id, packet).await,
            Event::Quit => {
                info!("Stopping cast");
                SessionFlow::Finished
            }
        }
    }

    async fn send(&self, id: ClientId, packet: Packet) {
        let Some(client) = self.clients.get(&id) else {
            return;
        };
        if client.tx.send(packet).await.is_err() {
            debug!("id={id} Client is gone");
        }
    }

    async fn mirror(&self, packet: Packet) {
        let attached = self
            .clients
            .iter()
            .filter(|(_, client)| client.attached)
            .map(|(id, client)| (*id, client.tx.clone()))
            .collect::<Vec<_>>();

        for (id, tx) in attached {
            if tx.send(packet.clone()).await.is_err() {
                debug!("id={id} Attach client is gone");
            }
        }
    }

    async fn on_packet(&mut self, id: ClientId, packet: Packet) -> SessionFlow {
        let Some(client) = self.clients.get(&id) else {
            return SessionFlow::Continue;
        };
        if client.invalid {
            debug!("id={id} Ignoring packet from rejected client");
            return SessionFlow::Continue;
        }
        let attached = client.attached;
        let is_controller = self.controller == Some(id);

        match packet {
            Packet::Connect(name) => return self.on_connect(id, name).await,
            Packet::Control(command) if is_controller => return self.on_control(command).await,
            Packet::StatusUpdate(status) if is_controller => {
                info!("{}", status.summary());
                self.mirror(Packet::AttachStatus(status.clone())).await;
                self.status = Some(status);
            }
            Packet::ShowRemote(show) if is_controller => {
                self.mirror(Packet::AttachShow(show)).await;
                if !show {
                    info!("Cast finished");
                    return SessionFlow::Finished;
                }
                if self.changing_track {
                    debug!("Track change completed");
                }
                self.changing_track = false;
            }
            Packet::CastError(msg) => {
                error!("Receiver error: {msg}");
                self.changing_track = false;
            }
            Packet::AttachRequest => self.on_attach_request(id).await,
            Packet::AttachRemote(signal) if attached => match self.controller {
                Some(controller) => self.send(controller, Packet::RemoteSignal(signal)).await,
                None => debug!("id={id} No receiver to forward remote signal to"),
            },
            Packet::None => (),
            _ => warn!("id={id} Unexpected packet: {packet:?}"),
        }

        SessionFlow::Continue
    }

    async fn on_connect(&mut self, id: ClientId, name: String) -> SessionFlow {
        if name.trim().is_empty() || self.registry.contains(&name) {
            warn!("id={id} Receiver name \"{name}\" is already in use");
            self.send(id, Packet::Invalid(InvalidMessage::name_conflict()))
                .await;
            if let Some(client) = self.clients.get_mut(&id) {
                client.invalid = true;
            }
            return SessionFlow::Continue;
        }

        self.registry.register(&name);
        if let Some(client) = self.clients.get_mut(&id) {
            client.name = Some(name.clone());
        }
        info!("Connected to {name}");
        self.identity = Some(name);
        self.controller = Some(id);
        self.changing_track = false;

        self.send(id, Packet::Invalid(InvalidMessage::accepted()))
            .await;

        match self.cast(id).await {
            Ok(()) => SessionFlow::Continue,
            Err(err) => SessionFlow::Failed(err),
        }
    }

    fn on_disconnect(&mut self, id: ClientId) -> SessionFlow {
        let Some(client) = self.clients.remove(&id) else {
            return SessionFlow::Continue;
        };

        if let Some(name) = &client.name {
            self.registry.unregister(name);
        }

        if self.controller == Some(id) {
            info!(
                "{} disconnected",
                client.name.as_deref().unwrap_or("Receiver")
            );
            self.controller = None;
            return SessionFlow::Finished;
        }

        debug!("id={id} Client disconnected");
        SessionFlow::Continue
    }

    async fn on_control(&mut self, command: ControlCommand) -> SessionFlow {
        let Some(controller) = self.controller else {
            return SessionFlow::Continue;
        };
        if self.changing_track {
            debug!("Track change in progress, ignoring {command:?}");
            return SessionFlow::Continue;
        }

        let previous = self.playlist.cursor();
        match self.playlist.navigate(command) {
            Navigation::Unchanged => {
                debug!("Cannot navigate {command:?} from item {}", previous + 1);
                SessionFlow::Continue
            }
            Navigation::End => {
                info!("Playlist finished");
                SessionFlow::Finished
            }
            Navigation::Moved(_) => {
                self.changing_track = true;
                match self.cast(controller).await {
                    Ok(()) => SessionFlow::Continue,
                    Err(err) if command == ControlCommand::TrackEnded => {
                        info!("{err}");
                        SessionFlow::Finished
                    }
                    Err(err) => {
                        warn!("{err}");
                        self.playlist.set_cursor(previous);
                        self.changing_track = false;
                        SessionFlow::Continue
                    }
                }
            }
        }
    }

    async fn on_attach_request(&mut self, id: ClientId) {
        if self.controller == Some(id) || self.clients.len() < 2 {
            debug!("id={id} Attach request without an active cast");
            return;
        }
        let (Some(name), Some(status)) = (self.identity.clone(), self.status.clone()) else {
            debug!("id={id} Nothing cast yet, ignoring attach request");
            return;
        };

        if let Some(client) = self.clients.get_mut(&id) {
            client.attached = true;
        }
        info!("Attach client connected");

        self.send(
            id,
            Packet::AttachConnect(AttachConnectMessage { name, status }),
        )
        .await;
    }

    /// Pushes the item under the cursor to `id`, skipping missing items.
    async fn cast(&mut self, id: ClientId) -> Result<()> {
        let probe = &self.probe;
        let index = self
            .playlist
            .resolve(|item| probe.exists(item))
            .ok_or_else(|| anyhow!("No playable items left in the playlist"))?;
        let item = self
            .playlist
            .current()
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("Playlist is empty"))?;

        let info = match self.probe.probe(&item) {
            Ok(info) => info,
            Err(err) => {
                warn!("Failed to probe {item}: {err}");
                MediaInfo::unprobed(&item)
            }
        };
        let subs = match (index, &self.explicit_subs) {
            (0, Some(subs)) => Some(subs.clone()),
            _ => info.subs,
        };

        self.media_tx.send_replace(ActiveMedia {
            cast: (!is_url(&info.location)).then(|| PathBuf::from(&info.location)),
            subs: subs.clone(),
            cover: info.cover.clone(),
        });

        let msg = CastMessage {
            name: self.identity.clone().unwrap_or_default(),
            stream_type: info.stream_type,
            file_path: info.location,
            subs_path: subs.map(|path| path.to_string_lossy().to_string()),
            cover_path: info.cover.map(|path| path.to_string_lossy().to_string()),
            title: info.title,
            addon: None,
            playlist: self.playlist.position(),
        };
        info!(
            "Casting {} ({}/{})",
            msg.display_title(),
            msg.playlist.index,
            msg.playlist.length
        );

        let status = SessionStatus::for_cast(&msg, self.status.as_ref());
        self.mirror(Packet::AttachStatus(status.clone())).await;
        self.status = Some(status);

        self.send(id, Packet::Cast(msg)).await;

        Ok(())
    }
}
