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

//! VLC driven over its remote control interface (`--extraintf=oldrc`) on a
//! Unix socket.
//!
//! The interface has no request ids and no property events, so one task owns
//! the socket, runs commands in order and polls playback state.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cast_lib::models::clamp_volume;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use super::process::{wait_for_socket, ProcessHandle};
use super::{Cycle, LaunchSpec, Player, PlayerError, PlayerEvent, PlayerProperty};

const RC_TIMEOUT: Duration = Duration::from_secs(5);
const LOAD_TIMEOUT: Duration = Duration::from_secs(20);
const LOAD_POLL: Duration = Duration::from_millis(200);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// VLC reports and takes volume on a 0-512 scale where 256 is 100%.
const VOLUME_SCALE: f64 = 256.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RcFailure {
    Closed,
    TimedOut,
}

impl RcFailure {
    fn describe(self, command: &str) -> String {
        match self {
            Self::Closed => format!("{command}: player closed"),
            Self::TimedOut => format!("{command}: timed out"),
        }
    }
}

struct Request {
    line: String,
    reply: Option<oneshot::Sender<Result<f64, RcFailure>>>,
}

/// Numeric answer in an interface line. Prompts (`> `) are stripped, and
/// banners or `status change` notices yield `None`.
fn parse_number(line: &str) -> Option<f64> {
    let mut line = line.trim();
    while let Some(rest) = line.strip_prefix('>') {
        line = rest.trim_start();
    }
    line.replace(',', ".").parse().ok()
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Sample {
    time: f64,
    length: f64,
    playing: bool,
    volume: f64,
}

/// Turns polled samples into property changes.
#[derive(Debug, Default)]
struct Tracker {
    last: Option<Sample>,
    eof: bool,
}

impl Tracker {
    fn update(&mut self, sample: Sample) -> Vec<PlayerProperty> {
        let last = self.last.replace(sample);
        let changed =
            |field: fn(&Sample) -> f64| last.is_none_or(|last| field(&last) != field(&sample));

        let mut changes = Vec::new();
        if changed(|s| s.volume) {
            changes.push(PlayerProperty::Volume(clamp_volume(sample.volume / VOLUME_SCALE)));
        }
        if changed(|s| s.time) {
            changes.push(PlayerProperty::TimePos(sample.time));
        }
        if changed(|s| s.length) {
            changes.push(PlayerProperty::Duration(sample.length));
        }
        if last.is_none_or(|last| last.playing != sample.playing) {
            changes.push(PlayerProperty::Pause(!sample.playing));
        }

        // `--play-and-pause` leaves VLC paused on the last frame
        let eof = !sample.playing && sample.length > 0.0 && sample.time >= sample.length - 1.0;
        if eof != self.eof {
            self.eof = eof;
            changes.push(PlayerProperty::EofReached(eof));
        }

        changes
    }
}

type RcLines = Lines<BufReader<OwnedReadHalf>>;

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> Result<(), RcFailure> {
    writer
        .write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|_| RcFailure::Closed)
}

async fn query(
    writer: &mut OwnedWriteHalf,
    lines: &mut RcLines,
    command: &str,
) -> Result<f64, RcFailure> {
    write_line(writer, command).await?;

    let deadline = Instant::now() + RC_TIMEOUT;
    loop {
        let line = match tokio::time::timeout_at(deadline, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(_) => return Err(RcFailure::Closed),
            Err(_) => return Err(RcFailure::TimedOut),
        };

        trace!("vlc: {line}");

        if let Some(value) = parse_number(&line) {
            return Ok(value);
        }
    }
}

async fn sample(writer: &mut OwnedWriteHalf, lines: &mut RcLines) -> Result<Sample, RcFailure> {
    Ok(Sample {
        time: query(writer, lines, "get_time").await?,
        length: query(writer, lines, "get_length").await?,
        playing: query(writer, lines, "is_playing").await? != 0.0,
        volume: query(writer, lines, "volume").await?,
    })
}

async fn drive_rc(
    stream: UnixStream,
    mut request_rx: mpsc::Receiver<Request>,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    playing: Arc<AtomicBool>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut tracker = Tracker::default();

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let failure = tokio::select! {
            request = request_rx.recv() => {
                let Some(request) = request else {
                    break;
                };

                match request.reply {
                    Some(reply) => {
                        let result = query(&mut writer, &mut lines, &request.line).await;
                        let _ = reply.send(result);
                        result.err()
                    }
                    None => write_line(&mut writer, &request.line).await.err(),
                }
            }
            _ = poll.tick() => match sample(&mut writer, &mut lines).await {
                Ok(sample) => {
                    playing.store(sample.playing, Ordering::SeqCst);
                    for property in tracker.update(sample) {
                        if event_tx.send(PlayerEvent::Property(property)).is_err() {
                            return;
                        }
                    }
                    None
                }
                Err(err) => Some(err),
            },
        };

        match failure {
            Some(RcFailure::Closed) => break,
            Some(RcFailure::TimedOut) => debug!("VLC did not answer in time"),
            None => (),
        }
    }

    debug!("VLC control interface closed");
}

struct Connection {
    request_tx: mpsc::Sender<Request>,
    playing: Arc<AtomicBool>,
    process: ProcessHandle,
}

pub struct VlcPlayer {
    executable: String,
    ipc_path: PathBuf,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    conn: Option<Connection>,
}

impl VlcPlayer {
    pub fn new(
        executable: impl Into<String>,
        ipc_path: impl Into<PathBuf>,
        event_tx: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        Self {
            executable: executable.into(),
            ipc_path: ipc_path.into(),
            event_tx,
            conn: None,
        }
    }

    fn live_connection(&mut self) -> Result<&mut Connection, PlayerError> {
        self.conn
            .as_mut()
            .filter(|conn| conn.process.is_alive())
            .ok_or(PlayerError::NotRunning)
    }

    async fn command(&mut self, line: impl Into<String>) -> Result<(), PlayerError> {
        let request = Request {
            line: line.into(),
            reply: None,
        };
        self.live_connection()?
            .request_tx
            .send(request)
            .await
            .map_err(|_| PlayerError::NotRunning)
    }

    async fn query(&mut self, line: &str) -> Result<f64, PlayerError> {
        let (tx, rx) = oneshot::channel();
        let request = Request {
            line: line.to_owned(),
            reply: Some(tx),
        };
        self.live_connection()?
            .request_tx
            .send(request)
            .await
            .map_err(|_| PlayerError::NotRunning)?;

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(PlayerError::Action(err.describe(line))),
            Err(_) => Err(PlayerError::Action(RcFailure::Closed.describe(line))),
        }
    }
}

#[async_trait]
impl Player for VlcPlayer {
    fn is_running(&self) -> bool {
        self.conn
            .as_ref()
            .is_some_and(|conn| conn.process.is_alive())
    }

    async fn launch(&mut self, spec: &LaunchSpec) -> Result<(), PlayerError> {
        if self.is_running() {
            return Err(PlayerError::Launch("player is already running".to_owned()));
        }

        // Stale socket from a previous run
        let _ = tokio::fs::remove_file(&self.ipc_path).await;

        debug!("Player args: {:?}", spec.args);

        let mut child = Command::new(&self.executable)
            .arg("--extraintf=oldrc")
            .arg(format!("--rc-unix={}", self.ipc_path.display()))
            .args(&spec.args)
            .arg(&spec.media)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| PlayerError::Launch(format!("{}: {err}", self.executable)))?;

        let stream = wait_for_socket(&self.executable, &self.ipc_path, &mut child).await?;

        let (request_tx, request_rx) = mpsc::channel(16);
        let playing = Arc::new(AtomicBool::new(false));

        tokio::spawn(drive_rc(
            stream,
            request_rx,
            self.event_tx.clone(),
            Arc::clone(&playing),
        ));
        let process = ProcessHandle::watch(child, self.event_tx.clone());

        self.conn = Some(Connection {
            request_tx,
            playing,
            process,
        });

        info!("Player started");

        Ok(())
    }

    async fn load(&mut self, spec: &LaunchSpec) -> Result<(), PlayerError> {
        debug!("Loading new media: {}", spec.media);

        let load_err = |err: PlayerError| PlayerError::Load(err.to_string());
        self.command("clear").await.map_err(load_err)?;
        self.command(format!("add {}", spec.media))
            .await
            .map_err(load_err)?;

        let deadline = Instant::now() + LOAD_TIMEOUT;
        loop {
            if self.query("is_playing").await.map_err(load_err)? != 0.0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PlayerError::Load("timed out".to_owned()));
            }
            tokio::time::sleep(LOAD_POLL).await;
        }
    }

    async fn play(&mut self) -> Result<(), PlayerError> {
        self.command("play").await
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        // `pause` toggles
        if self.live_connection()?.playing.load(Ordering::SeqCst) {
            self.command("pause").await?;
        }
        Ok(())
    }

    async fn cycle(&mut self, what: Cycle) -> Result<(), PlayerError> {
        let command = match what {
            Cycle::Pause => "pause",
            Cycle::Audio => "key key-audio-track",
            Cycle::Subtitles => "key key-subtitle-track",
            Cycle::Fullscreen => "fullscreen",
            Cycle::Video => {
                return Err(PlayerError::Action(
                    "VLC cannot cycle video tracks".to_owned(),
                ))
            }
        };
        self.command(command).await
    }

    async fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        self.command(format!("seek {}", position.max(0.0).round() as u64))
            .await
    }

    async fn set_volume(&mut self, volume: f64) -> Result<(), PlayerError> {
        let level = (clamp_volume(volume) * VOLUME_SCALE).round() as u32;
        self.command(format!("volume {level}")).await
    }

    async fn quit(&mut self) -> Result<(), PlayerError> {
        let conn = self.live_connection()?;

        let request = Request {
            line: "quit".to_owned(),
            reply: None,
        };
        if conn.request_tx.send(request).await.is_err() {
            warn!("Control interface is gone, killing player");
            conn.process.kill();
        }

        Ok(())
    }
}
