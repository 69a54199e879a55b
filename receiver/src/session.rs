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

//! Receiver side of a cast session.
//!
//! All session state (track-change guard, status, the player and CEC handles)
//! lives in [`ReceiverSession`] and is only mutated from [`ReceiverSession::handle`],
//! which the binary calls for every [`Event`] in order.

use cast_lib::models::{
    clamp_volume, AttachInfo, CastMessage, ControlCommand, HostTarget, InvalidMessage,
    PlayerState, RemoteSignal, SessionStatus,
};
use cast_lib::packet::Packet;
use common::channel::{ChannelClient, ChannelEvent, ChannelHandle};
use common::error::CastError;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc::Sender;

use crate::cec::Cec;
use crate::keymap::{Action, Keymap};
use crate::player::{
    Cycle, LaunchSpec, MediaSource, Player, PlayerArgsBuilder, PlayerError, PlayerEvent,
    PlayerProperty,
};
use crate::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    CheckingCec,
    AwaitingCast,
    Loading,
    Playing,
    Closed,
}

/// What the event loop should do after an event was handled.
#[derive(Debug, PartialEq)]
pub enum Flow {
    Continue,
    Close(Option<CastError>),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub name: String,
    /// The receiver dialed the sender itself instead of being found.
    pub direct: bool,
    pub cec_force_switch: bool,
    pub cec_end_hdmi: Option<u8>,
    pub keymap: Keymap,
}

/// Relative seek target, or `None` when the seek would not move forward.
/// Seeking at or past the end lands one second before it.
pub fn seek_forward_target(current: f64, duration: f64, step: f64) -> Option<f64> {
    let mut target = current + step;
    if target >= duration {
        target = duration - 1.0;
    }
    (target > current).then_some(target)
}

pub fn seek_backward_target(current: f64, step: f64) -> f64 {
    (current - step).max(0.0)
}

fn log_cec(result: anyhow::Result<()>) {
    if let Err(err) = result {
        warn!("HDMI-CEC: {err}");
    }
}

pub struct ReceiverSession<P, C> {
    config: SessionConfig,
    state: State,
    player: P,
    cec: Option<C>,
    args: Box<dyn PlayerArgsBuilder>,
    channel: Option<ChannelHandle>,
    event_tx: Sender<Event>,
    sender: Option<HostTarget>,
    controlled: bool,
    guard: bool,
    status: Option<SessionStatus>,
    restart_pending: Option<LaunchSpec>,
}

impl<P: Player, C: Cec> ReceiverSession<P, C> {
    pub fn new(
        config: SessionConfig,
        player: P,
        args: Box<dyn PlayerArgsBuilder>,
        event_tx: Sender<Event>,
    ) -> Self {
        Self {
            config,
            state: State::Idle,
            player,
            cec: None,
            args,
            channel: None,
            event_tx,
            sender: None,
            controlled: false,
            guard: false,
            status: None,
            restart_pending: None,
        }
    }

    /// Uses an already running control channel (direct-dial mode).
    pub fn with_channel(mut self, channel: ChannelHandle) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn status(&self) -> Option<&SessionStatus> {
        self.status.as_ref()
    }

    pub fn is_player_running(&self) -> bool {
        self.player.is_running()
    }

    pub fn is_changing_track(&self) -> bool {
        self.guard
    }

    pub fn begin_cec_check(&mut self) {
        info!("Checking HDMI-CEC support...");
        self.state = State::CheckingCec;
    }

    /// Ends the CEC check. `None` disables CEC for the rest of the run.
    pub fn cec_ready(&mut self, cec: Option<C>) {
        if cec.is_none() {
            info!("{}", CastError::CecUnavailable);
        }
        self.cec = cec;
        self.state = State::AwaitingCast;
    }

    pub async fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::Channel(event) => self.on_channel_event(event).await,
            Event::Player(PlayerEvent::Property(property)) => {
                self.on_property(property).await;
                Flow::Continue
            }
            Event::Player(PlayerEvent::Exited(code)) => self.on_player_exit(code).await,
            Event::CecKey(key) => match self.config.keymap.map(&key) {
                Some(action) => self.perform(action).await,
                None => {
                    trace!("Unmapped CEC key: {key:?}");
                    Flow::Continue
                }
            },
            Event::Remote(signal) => self.on_remote_signal(signal).await,
            Event::Connect(target) => {
                self.on_connect_request(target).await;
                Flow::Continue
            }
            Event::AttachQuery(reply) => {
                if reply.send(self.attach_info()).is_err() {
                    debug!("Attach query was dropped");
                }
                Flow::Continue
            }
            Event::Quit => Flow::Close(None),
        }
    }

    async fn send(&self, packet: Packet) {
        let Some(channel) = &self.channel else {
            debug!("No control channel, dropping {packet:?}");
            return;
        };
        if let Err(err) = channel.send(packet).await {
            warn!("{err}");
        }
    }

    async fn push_status(&self) {
        if let Some(status) = &self.status {
            self.send(Packet::StatusUpdate(status.clone())).await;
        }
    }

    fn attach_info(&self) -> AttachInfo {
        AttachInfo {
            host: self
                .sender
                .as_ref()
                .filter(|_| self.controlled)
                .map(HostTarget::to_url),
        }
    }

    async fn on_connect_request(&mut self, target: HostTarget) {
        match &self.channel {
            Some(channel) => {
                debug!("Connect request for {}", target.to_url());
                if let Err(err) = channel.migrate(target).await {
                    error!("{err}");
                }
            }
            None => {
                self.channel = Some(ChannelClient::spawn(target, true, self.event_tx.clone()));
            }
        }
    }

    async fn on_channel_event(&mut self, event: ChannelEvent) -> Flow {
        match event {
            ChannelEvent::Connected(target) => {
                info!("Connected to {}", target.to_url());
                self.sender = Some(target);
                self.send(Packet::Connect(self.config.name.clone())).await;
                Flow::Continue
            }
            ChannelEvent::Disconnected(target) => self.on_sender_disconnect(target).await,
            ChannelEvent::Unreachable(err) => {
                warn!("{err}");
                if err.is_fatal() {
                    Flow::Close(Some(err))
                } else {
                    Flow::Continue
                }
            }
            ChannelEvent::Packet(packet) => match packet {
                Packet::Invalid(msg) => self.on_invalid(msg),
                Packet::Cast(msg) => self.on_cast(msg).await,
                Packet::RemoteSignal(signal) => self.on_remote_signal(signal).await,
                packet => {
                    warn!("Unexpected packet from sender: {packet:?}");
                    Flow::Continue
                }
            },
        }
    }

    fn on_invalid(&mut self, msg: InvalidMessage) -> Flow {
        if msg.is_name_conflict() {
            let err = CastError::NameConflict(self.config.name.clone());
            error!("{err}");
            return Flow::Close(Some(err));
        }

        info!("{} waiting for media cast...", self.config.name);
        Flow::Continue
    }

    async fn on_sender_disconnect(&mut self, target: HostTarget) -> Flow {
        debug!("Sender {} disconnected", target.to_url());

        if self.player.is_running() {
            if let Err(err) = self.player.quit().await {
                warn!("Failed to quit player: {err}");
            }
        }

        self.controlled = false;
        self.guard = false;
        self.restart_pending = None;
        if self.sender.as_ref() == Some(&target) {
            self.sender = None;
        }

        if let Some(channel) = &self.channel {
            if let Err(err) = channel.set_reconnect(false).await {
                warn!("{err}");
            }
        }

        if self.config.direct {
            info!("Sender disconnected, session is over");
            return Flow::Close(None);
        }

        info!("{} waiting for connection...", self.config.name);
        Flow::Continue
    }

    async fn on_cast(&mut self, msg: CastMessage) -> Flow {
        self.controlled = msg.name == self.config.name;
        if !self.controlled {
            debug!("Cast for {} is not for us", msg.name);
            return Flow::Continue;
        }

        let Some(sender) = self.sender.clone() else {
            warn!("Received media cast without a sender");
            return Flow::Continue;
        };

        if !self.guard {
            info!("Received media cast");
        }
        self.guard = true;

        self.status = Some(SessionStatus::for_cast(&msg, self.status.as_ref()));

        let source = MediaSource::for_cast(&msg, &sender);
        let spec = self.args.build(&msg, &source, &msg.display_title());
        debug!("Media source: {}", spec.media);

        if self.restart_pending.is_some() {
            debug!("Player is restarting, replacing pending media");
            self.restart_pending = Some(spec);
            return Flow::Continue;
        }

        if !self.player.is_running() {
            debug!("No open media player process found");
            return self.launch(spec, false).await;
        }

        self.state = State::Loading;
        debug!("Loading new media: {}", spec.media);

        if let Err(err) = self.player.load(&spec).await {
            debug!("Error on media load: {err}");
            debug!("Retrying media load...");

            if let Err(err) = self.player.load(&spec).await {
                debug!("Error on media load retry: {err}");
                info!("Restarting media player...");

                self.restart_pending = Some(spec);
                if let Err(err) = self.player.quit().await {
                    error!("{err}");
                }
                return Flow::Continue;
            }
        }

        info!("File loaded");
        self.started().await;
        Flow::Continue
    }

    async fn launch(&mut self, spec: LaunchSpec, is_restart: bool) -> Flow {
        if !is_restart {
            if let Some(cec) = self.cec.as_mut() {
                info!("Sending HDMI-CEC signals...");
                log_cec(cec.turn_on().await);
                log_cec(cec.set_active().await);
                if self.config.cec_force_switch {
                    if let Some(hdmi) = cec.hdmi_port() {
                        log_cec(cec.change_source(hdmi).await);
                    }
                }
            }
        }

        info!("Starting player...");
        self.state = State::Loading;

        match self.player.launch(&spec).await {
            Ok(()) => {
                info!("Player started");
                self.started().await;
                Flow::Continue
            }
            Err(err) => {
                let err = CastError::from(err);
                error!("{err}");
                self.guard = false;
                self.state = State::AwaitingCast;
                if self.controlled {
                    self.send(Packet::CastError(err.to_string())).await;
                }

                if is_restart {
                    Flow::Close(Some(err))
                } else {
                    Flow::Continue
                }
            }
        }
    }

    async fn started(&mut self) {
        self.guard = false;
        self.state = State::Playing;

        self.send(Packet::ShowRemote(true)).await;
        self.push_status().await;

        if let Err(err) = self.player.play().await {
            self.report(err).await;
        }
    }

    async fn on_player_exit(&mut self, code: Option<i32>) -> Flow {
        debug!("Player exited");

        if let Some(spec) = self.restart_pending.take() {
            return self.launch(spec, true).await;
        }

        let was_controlled = self.controlled;
        self.controlled = false;
        self.guard = false;
        self.status = None;
        if self.state != State::Closed {
            self.state = State::AwaitingCast;
        }

        if was_controlled {
            self.send(Packet::ShowRemote(false)).await;
        }

        if let Some(cec) = self.cec.as_mut() {
            log_cec(cec.set_inactive().await);
            if let Some(hdmi) = self.config.cec_end_hdmi {
                log_cec(cec.change_source(hdmi).await);
            }
        }

        if let Some(code) = code.filter(|code| *code != 0) {
            error!("Player exited with status code: {code}");
        }

        info!("{} waiting for media cast...", self.config.name);
        Flow::Continue
    }

    async fn on_property(&mut self, property: PlayerProperty) {
        let Some(status) = self.status.as_mut() else {
            return;
        };

        match property {
            PlayerProperty::Volume(volume) => status.volume = clamp_volume(volume),
            PlayerProperty::TimePos(time) => status.current_time = time,
            PlayerProperty::Duration(duration) => status.duration = duration,
            PlayerProperty::Pause(paused) => {
                status.player_state = if paused {
                    PlayerState::Paused
                } else {
                    PlayerState::Playing
                }
            }
            PlayerProperty::Speed(speed) => status.speed = speed,
            PlayerProperty::EofReached(true) => {
                if self.controlled {
                    self.navigate(ControlCommand::TrackEnded).await;
                }
                return;
            }
            PlayerProperty::EofReached(false) => (),
        }

        if self.controlled && !self.guard {
            self.push_status().await;
        }
    }

    async fn on_remote_signal(&mut self, signal: RemoteSignal) -> Flow {
        debug!("External remote signal: {signal:?}");
        match Action::from_remote(&signal) {
            Some(action) => self.perform(action).await,
            None => {
                warn!("Remote signal {:?} is missing a value", signal.action);
                Flow::Continue
            }
        }
    }

    /// Receiver initiated track change. Refused while another one is in
    /// flight or at the playlist boundary.
    fn can_navigate(&self, command: ControlCommand) -> bool {
        if self.guard {
            return false;
        }
        let Some(status) = &self.status else {
            return false;
        };
        match command {
            ControlCommand::NextTrack => !status.playlist.is_last(),
            ControlCommand::PreviousTrack => !status.playlist.is_first(),
            ControlCommand::TrackEnded => true,
        }
    }

    async fn navigate(&mut self, command: ControlCommand) {
        if !self.can_navigate(command) {
            debug!("Ignoring {command:?}");
            return;
        }

        self.guard = true;
        info!("Loading new media...");
        self.send(Packet::Control(command)).await;
    }

    async fn report(&self, err: PlayerError) {
        let err = CastError::from(err);
        error!("{err}");
        self.send(Packet::CastError(err.to_string())).await;
    }

    async fn perform(&mut self, action: Action) -> Flow {
        if !self.controlled || !self.player.is_running() {
            debug!("Not controlling a player, ignoring {action:?}");
            return Flow::Continue;
        }

        let (current_time, duration, volume) = self
            .status
            .as_ref()
            .map(|s| (s.current_time, s.duration, s.volume))
            .unwrap_or_default();

        let result = match action {
            Action::Play => self.player.play().await,
            Action::Pause => self.player.pause().await,
            Action::CyclePause => self.player.cycle(Cycle::Pause).await,
            Action::CycleVideo => self.player.cycle(Cycle::Video).await,
            Action::CycleAudio => self.player.cycle(Cycle::Audio).await,
            Action::CycleSubs => self.player.cycle(Cycle::Subtitles).await,
            Action::CycleFullscreen => self.player.cycle(Cycle::Fullscreen).await,
            Action::SeekPercent(fraction) => {
                self.player.seek(fraction.clamp(0.0, 1.0) * duration).await
            }
            Action::SeekForward(step) => match seek_forward_target(current_time, duration, step) {
                Some(target) => self.player.seek(target).await,
                None => {
                    debug!("Seek forward past the end suppressed");
                    Ok(())
                }
            },
            Action::SeekBackward(step) => {
                self.player
                    .seek(seek_backward_target(current_time, step))
                    .await
            }
            Action::NextTrack => {
                self.navigate(ControlCommand::NextTrack).await;
                Ok(())
            }
            Action::PreviousTrack => {
                self.navigate(ControlCommand::PreviousTrack).await;
                Ok(())
            }
            Action::SetVolume(value) => self.player.set_volume(clamp_volume(value)).await,
            Action::VolumeUp(delta) => self.player.set_volume(clamp_volume(volume + delta)).await,
            Action::VolumeDown(delta) => {
                self.player.set_volume(clamp_volume(volume - delta)).await
            }
            Action::Quit => self.player.quit().await,
        };

        if let Err(err) = result {
            self.report(err).await;
        }

        Flow::Continue
    }

    /// Quits the player and CEC client and closes the control channel.
    /// The caller waits for the player to exit.
    pub async fn close(&mut self) {
        info!("Castbeam closing...");
        self.state = State::Closed;
        self.restart_pending = None;

        if self.player.is_running() {
            if let Err(err) = self.player.quit().await {
                warn!("Failed to quit player: {err}");
            }
        }

        if self.controlled {
            self.send(Packet::ShowRemote(false)).await;
            self.controlled = false;
        }

        if let Some(cec) = self.cec.as_mut() {
            log_cec(cec.close().await);
        }

        if let Some(channel) = &self.channel {
            if let Err(err) = channel.shutdown().await {
                debug!("{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use cast_lib::models::{PlaylistPosition, RemoteAction, StreamType};
    use common::channel::ChannelCommand;
    use tokio::sync::mpsc::{self, Receiver};
    use tokio::sync::oneshot;

    use super::*;
    use crate::cec::CecKey;
    use crate::player::MpvArgs;

    #[derive(Default)]
    struct FakeState {
        running: bool,
        calls: Vec<String>,
        launch_results: VecDeque<Result<(), PlayerError>>,
        load_results: VecDeque<Result<(), PlayerError>>,
    }

    #[derive(Clone, Default)]
    struct FakePlayer(Arc<Mutex<FakeState>>);

    impl FakePlayer {
        fn record(&self, call: String) {
            self.0.lock().unwrap().calls.push(call);
        }

        fn calls(&self) -> Vec<String> {
            std::mem::take(&mut self.0.lock().unwrap().calls)
        }
    }

    #[async_trait]
    impl Player for FakePlayer {
        fn is_running(&self) -> bool {
            self.0.lock().unwrap().running
        }

        async fn launch(&mut self, spec: &LaunchSpec) -> Result<(), PlayerError> {
            self.record(format!("launch {}", spec.media));
            let mut state = self.0.lock().unwrap();
            let result = state.launch_results.pop_front().unwrap_or(Ok(()));
            state.running = result.is_ok();
            result
        }

        async fn load(&mut self, spec: &LaunchSpec) -> Result<(), PlayerError> {
            self.record(format!("load {}", spec.media));
            self.0.lock().unwrap().load_results.pop_front().unwrap_or(Ok(()))
        }

        async fn play(&mut self) -> Result<(), PlayerError> {
            self.record("play".to_owned());
            Ok(())
        }

        async fn pause(&mut self) -> Result<(), PlayerError> {
            self.record("pause".to_owned());
            Ok(())
        }

        async fn cycle(&mut self, what: Cycle) -> Result<(), PlayerError> {
            self.record(format!("cycle {what:?}"));
            Ok(())
        }

        async fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
            self.record(format!("seek {position}"));
            Ok(())
        }

        async fn set_volume(&mut self, volume: f64) -> Result<(), PlayerError> {
            self.record(format!("volume {volume}"));
            Ok(())
        }

        async fn quit(&mut self) -> Result<(), PlayerError> {
            self.record("quit".to_owned());
            self.0.lock().unwrap().running = false;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeCec(Arc<Mutex<Vec<String>>>);

    impl FakeCec {
        fn calls(&self) -> Vec<String> {
            std::mem::take(&mut self.0.lock().unwrap())
        }
    }

    #[async_trait]
    impl Cec for FakeCec {
        fn hdmi_port(&self) -> Option<u8> {
            Some(2)
        }

        async fn turn_on(&mut self) -> anyhow::Result<()> {
            self.0.lock().unwrap().push("on".to_owned());
            Ok(())
        }

        async fn set_active(&mut self) -> anyhow::Result<()> {
            self.0.lock().unwrap().push("active".to_owned());
            Ok(())
        }

        async fn set_inactive(&mut self) -> anyhow::Result<()> {
            self.0.lock().unwrap().push("inactive".to_owned());
            Ok(())
        }

        async fn change_source(&mut self, hdmi: u8) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(format!("source {hdmi}"));
            Ok(())
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            self.0.lock().unwrap().push("close".to_owned());
            Ok(())
        }
    }

    struct Harness {
        session: ReceiverSession<FakePlayer, FakeCec>,
        player: FakePlayer,
        cec: FakeCec,
        cmd_rx: Receiver<ChannelCommand>,
        _event_rx: Receiver<Event>,
    }

    const NAME: &str = "Living Room";

    fn sender() -> HostTarget {
        HostTarget::new("10.0.0.2", 9880)
    }

    fn config(direct: bool) -> SessionConfig {
        SessionConfig {
            name: NAME.to_owned(),
            direct,
            cec_force_switch: true,
            cec_end_hdmi: Some(1),
            keymap: Keymap::Primary,
        }
    }

    async fn harness(direct: bool, with_cec: bool) -> Harness {
        let player = FakePlayer::default();
        let cec = FakeCec::default();
        let (event_tx, event_rx) = mpsc::channel(16);
        let (channel, cmd_rx) = ChannelHandle::detached(100);

        let mut session =
            ReceiverSession::new(config(direct), player.clone(), Box::new(MpvArgs), event_tx)
                .with_channel(channel);
        session.cec_ready(with_cec.then(|| cec.clone()));

        let mut harness = Harness {
            session,
            player,
            cec,
            cmd_rx,
            _event_rx: event_rx,
        };

        let flow = harness
            .session
            .handle(Event::Channel(ChannelEvent::Connected(sender())))
            .await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(harness.sent(), vec![Packet::Connect(NAME.to_owned())]);

        harness
    }

    fn cast(file: &str, index: usize, length: usize) -> CastMessage {
        CastMessage {
            name: NAME.to_owned(),
            stream_type: StreamType::Video,
            file_path: file.to_owned(),
            subs_path: None,
            cover_path: None,
            title: None,
            addon: None,
            playlist: PlaylistPosition { index, length },
        }
    }

    impl Harness {
        async fn packet(&mut self, packet: Packet) -> Flow {
            self.session
                .handle(Event::Channel(ChannelEvent::Packet(packet)))
                .await
        }

        async fn remote(&mut self, action: RemoteAction, value: Option<f64>) -> Flow {
            self.session
                .handle(Event::Remote(RemoteSignal::new(action, value)))
                .await
        }

        async fn property(&mut self, property: PlayerProperty) {
            self.session
                .handle(Event::Player(PlayerEvent::Property(property)))
                .await;
        }

        fn commands(&mut self) -> Vec<ChannelCommand> {
            let mut commands = Vec::new();
            while let Ok(cmd) = self.cmd_rx.try_recv() {
                commands.push(cmd);
            }
            commands
        }

        fn sent(&mut self) -> Vec<Packet> {
            self.commands()
                .into_iter()
                .filter_map(|cmd| match cmd {
                    ChannelCommand::Send(packet) => Some(packet),
                    _ => None,
                })
                .collect()
        }

        /// Casts `a.mp4` as the first of two items and clears the records.
        async fn playing(&mut self) {
            self.packet(Packet::Cast(cast("/media/a.mp4", 1, 2))).await;
            self.player.calls();
            self.cec.calls();
            self.sent();
        }
    }

    fn status_updates(packets: &[Packet]) -> Vec<&SessionStatus> {
        packets
            .iter()
            .filter_map(|p| match p {
                Packet::StatusUpdate(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn seek_targets() {
        assert_eq!(seek_forward_target(99.5, 100.0, 10.0), None);
        assert_eq!(seek_forward_target(95.0, 100.0, 10.0), Some(99.0));
        assert_eq!(seek_forward_target(10.0, 100.0, 10.0), Some(20.0));
        assert_eq!(seek_forward_target(0.0, 0.0, 10.0), None);
        assert_eq!(seek_backward_target(5.0, 10.0), 0.0);
        assert_eq!(seek_backward_target(50.0, 10.0), 40.0);
    }

    #[tokio::test]
    async fn cast_launches_player_after_cec() {
        let mut h = harness(false, true).await;

        let flow = h.packet(Packet::Cast(cast("/media/a.mp4", 1, 2))).await;
        assert_eq!(flow, Flow::Continue);

        assert_eq!(h.cec.calls(), vec!["on", "active", "source 2"]);
        assert_eq!(
            h.player.calls(),
            vec!["launch http://10.0.0.2:9880/cast", "play"]
        );

        let sent = h.sent();
        assert_eq!(sent[0], Packet::ShowRemote(true));
        let status = status_updates(&sent);
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].title, "a");
        assert_eq!(status[0].current_time, 0.0);

        assert_eq!(h.session.state(), State::Playing);
        assert!(!h.session.is_changing_track());
    }

    #[tokio::test]
    async fn url_media_is_played_directly() {
        let mut h = harness(false, false).await;
        h.packet(Packet::Cast(cast("https://example.com/live.m3u8", 1, 1)))
            .await;
        assert_eq!(
            h.player.calls(),
            vec!["launch https://example.com/live.m3u8", "play"]
        );
    }

    #[tokio::test]
    async fn cast_for_other_receiver_is_ignored() {
        let mut h = harness(false, true).await;
        let mut msg = cast("/media/a.mp4", 1, 1);
        msg.name = "Bedroom".to_owned();

        h.packet(Packet::Cast(msg)).await;

        assert!(h.player.calls().is_empty());
        assert!(h.cec.calls().is_empty());
        assert!(h.sent().is_empty());
        assert_eq!(h.session.state(), State::AwaitingCast);
    }

    #[tokio::test]
    async fn next_track_loads_in_place() {
        let mut h = harness(false, true).await;
        h.playing().await;

        h.remote(RemoteAction::SkipForward, None).await;
        assert!(h.session.is_changing_track());
        assert_eq!(h.sent(), vec![Packet::Control(ControlCommand::NextTrack)]);

        h.packet(Packet::Cast(cast("/media/b.mp4", 2, 2))).await;
        assert_eq!(
            h.player.calls(),
            vec!["load http://10.0.0.2:9880/cast", "play"]
        );
        assert!(!h.session.is_changing_track());
        assert!(h.cec.calls().is_empty());

        let sent = h.sent();
        let status = status_updates(&sent);
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].title, "b");
        assert_eq!(status[0].current_time, 0.0);
        assert_eq!(status[0].playlist, PlaylistPosition { index: 2, length: 2 });
    }

    #[tokio::test]
    async fn navigation_is_guarded() {
        let mut h = harness(false, false).await;
        h.playing().await;

        // First item: no previous track
        h.remote(RemoteAction::SkipBackward, None).await;
        assert!(h.sent().is_empty());

        h.remote(RemoteAction::SkipForward, None).await;
        h.remote(RemoteAction::SkipForward, None).await;
        assert_eq!(h.sent(), vec![Packet::Control(ControlCommand::NextTrack)]);

        h.packet(Packet::Cast(cast("/media/b.mp4", 2, 2))).await;
        h.sent();

        // Last item: no next track
        h.session.handle(Event::CecKey(CecKey::Right)).await;
        assert!(h.sent().is_empty());

        h.session.handle(Event::CecKey(CecKey::Left)).await;
        assert_eq!(
            h.sent(),
            vec![Packet::Control(ControlCommand::PreviousTrack)]
        );
    }

    #[tokio::test]
    async fn load_retry_avoids_restart() {
        let mut h = harness(false, true).await;
        h.playing().await;

        h.player
            .0
            .lock()
            .unwrap()
            .load_results
            .extend([Err(PlayerError::Load("busy".into())), Ok(())]);

        h.packet(Packet::Cast(cast("/media/b.mp4", 2, 2))).await;

        assert_eq!(
            h.player.calls(),
            vec![
                "load http://10.0.0.2:9880/cast",
                "load http://10.0.0.2:9880/cast",
                "play"
            ]
        );
        assert!(!h.session.is_changing_track());
        assert!(!h
            .sent()
            .iter()
            .any(|p| matches!(p, Packet::CastError(_))));
    }

    #[tokio::test]
    async fn failed_loads_restart_player_without_cec() {
        let mut h = harness(false, true).await;
        h.playing().await;

        h.player.0.lock().unwrap().load_results.extend([
            Err(PlayerError::Load("busy".into())),
            Err(PlayerError::Load("busy".into())),
        ]);

        h.packet(Packet::Cast(cast("/media/b.mp4", 2, 2))).await;
        assert_eq!(
            h.player.calls(),
            vec![
                "load http://10.0.0.2:9880/cast",
                "load http://10.0.0.2:9880/cast",
                "quit"
            ]
        );
        assert!(h.session.is_changing_track());

        h.session
            .handle(Event::Player(PlayerEvent::Exited(Some(0))))
            .await;

        assert_eq!(
            h.player.calls(),
            vec!["launch http://10.0.0.2:9880/cast", "play"]
        );
        assert!(h.cec.calls().is_empty());
        assert!(!h.session.is_changing_track());
        assert_eq!(h.session.state(), State::Playing);

        let sent = h.sent();
        assert_eq!(sent[0], Packet::ShowRemote(true));
        assert!(!sent.contains(&Packet::ShowRemote(false)));
    }

    #[tokio::test]
    async fn failed_restart_closes_session() {
        let mut h = harness(false, false).await;
        h.playing().await;

        {
            let mut state = h.player.0.lock().unwrap();
            state.load_results.extend([
                Err(PlayerError::Load("busy".into())),
                Err(PlayerError::Load("busy".into())),
            ]);
            state
                .launch_results
                .push_back(Err(PlayerError::Launch("no mpv".into())));
        }

        h.packet(Packet::Cast(cast("/media/b.mp4", 2, 2))).await;
        let flow = h
            .session
            .handle(Event::Player(PlayerEvent::Exited(Some(0))))
            .await;

        assert_eq!(flow, Flow::Close(Some(CastError::Restart("no mpv".into()))));
        assert!(h.sent().contains(&Packet::CastError(
            CastError::Restart("no mpv".into()).to_string()
        )));
    }

    #[tokio::test]
    async fn failed_launch_keeps_waiting() {
        let mut h = harness(false, false).await;
        h.player
            .0
            .lock()
            .unwrap()
            .launch_results
            .push_back(Err(PlayerError::Launch("no mpv".into())));

        let flow = h.packet(Packet::Cast(cast("/media/a.mp4", 1, 1))).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(h.session.state(), State::AwaitingCast);
        assert!(!h.session.is_changing_track());
        assert!(matches!(h.sent().as_slice(), [Packet::CastError(_)]));
    }

    #[tokio::test]
    async fn status_follows_player_properties() {
        let mut h = harness(false, false).await;
        h.playing().await;

        h.property(PlayerProperty::Duration(120.0)).await;
        h.property(PlayerProperty::Pause(false)).await;
        h.property(PlayerProperty::Volume(1.4)).await;

        let sent = h.sent();
        let status = status_updates(&sent);
        assert_eq!(status.len(), 3);
        assert_eq!(status[2].duration, 120.0);
        assert_eq!(status[2].player_state, PlayerState::Playing);
        assert_eq!(status[2].volume, 1.0);

        h.property(PlayerProperty::EofReached(true)).await;
        assert_eq!(h.sent(), vec![Packet::Control(ControlCommand::TrackEnded)]);
    }

    #[tokio::test]
    async fn unreachable_sender_is_not_fatal() {
        let mut h = harness(false, false).await;
        let err = CastError::HostUnreachable("http://10.0.0.9:9880".into());
        let flow = h
            .session
            .handle(Event::Channel(ChannelEvent::Unreachable(err)))
            .await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(h.session.state(), State::AwaitingCast);
    }

    #[tokio::test]
    async fn end_of_file_is_guarded() {
        let mut h = harness(false, false).await;
        h.playing().await;

        h.remote(RemoteAction::SkipForward, None).await;
        assert_eq!(h.sent(), vec![Packet::Control(ControlCommand::NextTrack)]);

        h.property(PlayerProperty::EofReached(true)).await;
        assert!(h.sent().is_empty());
        assert!(h.session.is_changing_track());

        h.packet(Packet::Cast(cast("/media/b.mp4", 2, 2))).await;
        h.sent();
        assert!(!h.session.is_changing_track());

        h.property(PlayerProperty::EofReached(true)).await;
        assert_eq!(h.sent(), vec![Packet::Control(ControlCommand::TrackEnded)]);
        assert!(h.session.is_changing_track());

        h.property(PlayerProperty::EofReached(true)).await;
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn speed_is_reported() {
        let mut h = harness(false, false).await;
        h.playing().await;

        h.property(PlayerProperty::Speed(1.5)).await;
        let sent = h.sent();
        assert_eq!(status_updates(&sent)[0].speed, 1.5);
    }

    #[tokio::test]
    async fn seek_fraction_is_clamped() {
        let mut h = harness(false, false).await;
        h.playing().await;
        h.property(PlayerProperty::Duration(200.0)).await;

        h.remote(RemoteAction::Seek, Some(1.5)).await;
        h.remote(RemoteAction::Seek, Some(-0.5)).await;
        assert_eq!(h.player.calls(), vec!["seek 200", "seek 0"]);
    }

    #[tokio::test]
    async fn status_is_held_back_while_changing_track() {
        let mut h = harness(false, false).await;
        h.playing().await;

        h.remote(RemoteAction::SkipForward, None).await;
        h.sent();

        h.property(PlayerProperty::TimePos(30.0)).await;
        assert!(h.sent().is_empty());
        assert_eq!(h.session.status().map(|s| s.current_time), Some(30.0));
    }

    #[tokio::test]
    async fn remote_actions_reach_player() {
        let mut h = harness(false, false).await;
        h.playing().await;
        h.property(PlayerProperty::Duration(100.0)).await;
        h.property(PlayerProperty::TimePos(99.5)).await;
        h.property(PlayerProperty::Volume(0.5)).await;

        h.remote(RemoteAction::SeekForward, Some(10.0)).await;
        h.remote(RemoteAction::SeekBackward, Some(10.0)).await;
        h.remote(RemoteAction::Seek, Some(0.25)).await;
        h.remote(RemoteAction::Volume, Some(1.2)).await;
        h.remote(RemoteAction::Volume, Some(-0.3)).await;
        h.remote(RemoteAction::VolumeUp, Some(0.25)).await;
        h.remote(RemoteAction::CycleSubs, None).await;

        assert_eq!(
            h.player.calls(),
            vec![
                "seek 89.5",
                "seek 25",
                "volume 1",
                "volume 0",
                "volume 0.75",
                "cycle Subtitles"
            ]
        );
    }

    #[tokio::test]
    async fn remote_actions_need_control() {
        let mut h = harness(false, false).await;
        h.remote(RemoteAction::Play, None).await;
        h.session.handle(Event::CecKey(CecKey::Play)).await;
        assert!(h.player.calls().is_empty());
    }

    #[tokio::test]
    async fn player_exit_releases_display() {
        let mut h = harness(false, true).await;
        h.playing().await;

        h.remote(RemoteAction::Stop, None).await;
        assert_eq!(h.player.calls(), vec!["quit"]);

        h.session
            .handle(Event::Player(PlayerEvent::Exited(Some(0))))
            .await;

        assert_eq!(h.sent(), vec![Packet::ShowRemote(false)]);
        assert_eq!(h.cec.calls(), vec!["inactive", "source 1"]);
        assert_eq!(h.session.state(), State::AwaitingCast);
        assert!(h.session.status().is_none());
    }

    #[tokio::test]
    async fn name_conflict_is_fatal() {
        let mut h = harness(false, false).await;
        assert_eq!(
            h.packet(Packet::Invalid(InvalidMessage::accepted())).await,
            Flow::Continue
        );
        assert_eq!(
            h.packet(Packet::Invalid(InvalidMessage::name_conflict()))
                .await,
            Flow::Close(Some(CastError::NameConflict(NAME.to_owned())))
        );
    }

    #[tokio::test]
    async fn disconnect_in_direct_mode_ends_session() {
        let mut h = harness(true, false).await;
        h.playing().await;

        let flow = h
            .session
            .handle(Event::Channel(ChannelEvent::Disconnected(sender())))
            .await;

        assert_eq!(flow, Flow::Close(None));
        assert_eq!(h.player.calls(), vec!["quit"]);
        assert_eq!(h.commands(), vec![ChannelCommand::SetReconnect(false)]);
    }

    #[tokio::test]
    async fn disconnect_in_discovery_mode_waits() {
        let mut h = harness(false, false).await;
        h.playing().await;

        let flow = h
            .session
            .handle(Event::Channel(ChannelEvent::Disconnected(sender())))
            .await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(h.player.calls(), vec!["quit"]);
        assert_eq!(h.commands(), vec![ChannelCommand::SetReconnect(false)]);

        let new = HostTarget::new("10.0.0.3", 9880);
        h.session.handle(Event::Connect(new.clone())).await;
        assert_eq!(h.commands(), vec![ChannelCommand::Migrate(new)]);
    }

    #[tokio::test]
    async fn attach_query_reports_controlling_sender() {
        let mut h = harness(false, false).await;

        let (tx, rx) = oneshot::channel();
        h.session.handle(Event::AttachQuery(tx)).await;
        assert_eq!(rx.await.unwrap(), AttachInfo { host: None });

        h.playing().await;
        let (tx, rx) = oneshot::channel();
        h.session.handle(Event::AttachQuery(tx)).await;
        assert_eq!(
            rx.await.unwrap(),
            AttachInfo {
                host: Some("http://10.0.0.2:9880".to_owned())
            }
        );
    }

    #[tokio::test]
    async fn close_quits_player_and_channel() {
        let mut h = harness(false, true).await;
        h.playing().await;

        h.session.close().await;

        assert_eq!(h.player.calls(), vec!["quit"]);
        assert_eq!(h.cec.calls(), vec!["close"]);
        assert_eq!(
            h.commands(),
            vec![
                ChannelCommand::Send(Packet::ShowRemote(false)),
                ChannelCommand::Shutdown
            ]
        );
        assert_eq!(h.session.state(), State::Closed);
    }

    #[quickcheck_macros::quickcheck]
    fn seek_forward_stays_inside(current: u16, duration: u16, step: u8) -> bool {
        let (current, duration, step) = (current as f64, duration as f64, step as f64);
        match seek_forward_target(current, duration, step) {
            Some(target) => target > current && target < duration,
            None => step == 0.0 || current + step >= duration,
        }
    }

    #[quickcheck_macros::quickcheck]
    fn seek_backward_never_negative(current: u16, step: u8) -> bool {
        seek_backward_target(current as f64, step as f64) >= 0.0
    }
}
