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

//! mpv driven over its JSON IPC socket (`--input-ipc-server`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cast_lib::models::clamp_volume;
use log::{debug, info, trace, warn};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::process::{wait_for_socket, ProcessHandle};
use super::{Cycle, LaunchSpec, Player, PlayerError, PlayerEvent, PlayerProperty};

const IPC_TIMEOUT: Duration = Duration::from_secs(5);
const LOAD_TIMEOUT: Duration = Duration::from_secs(20);

const OBSERVED_PROPERTIES: [&str; 6] = [
    "volume",
    "time-pos",
    "duration",
    "pause",
    "speed",
    "eof-reached",
];

type Reply = Result<Value, String>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;
type LoadWaiter = Arc<Mutex<Option<oneshot::Sender<Result<(), String>>>>>;

#[derive(Debug, PartialEq)]
enum IpcMessage {
    Reply { request_id: u64, result: Reply },
    Property(PlayerProperty),
    FileLoaded,
    LoadFailed(String),
}

fn property_from_ipc(name: &str, data: &Value) -> Option<PlayerProperty> {
    match name {
        "volume" => data
            .as_f64()
            .map(|v| PlayerProperty::Volume(clamp_volume(v / 100.0))),
        "time-pos" => data.as_f64().map(PlayerProperty::TimePos),
        "duration" => data.as_f64().map(PlayerProperty::Duration),
        "pause" => data.as_bool().map(PlayerProperty::Pause),
        "speed" => data.as_f64().map(PlayerProperty::Speed),
        "eof-reached" => data.as_bool().map(PlayerProperty::EofReached),
        _ => None,
    }
}

fn parse_ipc_line(line: &str) -> Option<IpcMessage> {
    let value: Value = serde_json::from_str(line).ok()?;

    if let Some(event) = value.get("event").and_then(Value::as_str) {
        return match event {
            "property-change" => {
                let name = value.get("name").and_then(Value::as_str)?;
                let data = value.get("data")?;
                property_from_ipc(name, data).map(IpcMessage::Property)
            }
            "file-loaded" => Some(IpcMessage::FileLoaded),
            "end-file" if value.get("reason").and_then(Value::as_str) == Some("error") => {
                let reason = value
                    .get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Some(IpcMessage::LoadFailed(reason.to_owned()))
            }
            _ => None,
        };
    }

    let request_id = value.get("request_id").and_then(Value::as_u64)?;
    let result = match value.get("error").and_then(Value::as_str) {
        Some("success") => Ok(value.get("data").cloned().unwrap_or(Value::Null)),
        Some(err) => Err(err.to_owned()),
        None => Err("malformed reply".to_owned()),
    };

    Some(IpcMessage::Reply { request_id, result })
}

async fn read_ipc(
    reader: OwnedReadHalf,
    pending: Pending,
    load_waiter: LoadWaiter,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                debug!("mpv IPC read failed: {err}");
                break;
            }
        };

        trace!("mpv: {line}");

        match parse_ipc_line(&line) {
            Some(IpcMessage::Reply { request_id, result }) => {
                if let Some(tx) = pending.lock().await.remove(&request_id) {
                    let _ = tx.send(result);
                }
            }
            Some(IpcMessage::Property(property)) => {
                if event_tx.send(PlayerEvent::Property(property)).is_err() {
                    break;
                }
            }
            Some(IpcMessage::FileLoaded) => {
                if let Some(tx) = load_waiter.lock().await.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Some(IpcMessage::LoadFailed(err)) => {
                if let Some(tx) = load_waiter.lock().await.take() {
                    let _ = tx.send(Err(err));
                }
            }
            None => (),
        }
    }

    // Outstanding requests fail once their senders are gone
    pending.lock().await.clear();
    if let Some(tx) = load_waiter.lock().await.take() {
        let _ = tx.send(Err("player closed".to_owned()));
    }
}

struct Connection {
    writer: OwnedWriteHalf,
    pending: Pending,
    load_waiter: LoadWaiter,
    process: ProcessHandle,
}

impl Connection {
    fn is_alive(&self) -> bool {
        self.process.is_alive()
    }
}

pub struct MpvPlayer {
    executable: String,
    ipc_path: PathBuf,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
    next_request_id: u64,
    conn: Option<Connection>,
}

impl MpvPlayer {
    pub fn new(
        executable: impl Into<String>,
        ipc_path: impl Into<PathBuf>,
        event_tx: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        Self {
            executable: executable.into(),
            ipc_path: ipc_path.into(),
            event_tx,
            next_request_id: 0,
            conn: None,
        }
    }

    fn live_connection(&mut self) -> Result<&mut Connection, PlayerError> {
        self.conn
            .as_mut()
            .filter(|conn| conn.is_alive())
            .ok_or(PlayerError::NotRunning)
    }

    async fn command(&mut self, command: Value) -> Result<Value, PlayerError> {
        self.next_request_id += 1;
        let request_id = self.next_request_id;

        let conn = self.live_connection()?;
        let (tx, rx) = oneshot::channel();
        conn.pending.lock().await.insert(request_id, tx);

        let mut line = json!({ "command": command, "request_id": request_id }).to_string();
        line.push('\n');

        if let Err(err) = conn.writer.write_all(line.as_bytes()).await {
            conn.pending.lock().await.remove(&request_id);
            return Err(PlayerError::Action(format!("{command}: {err}")));
        }

        match tokio::time::timeout(IPC_TIMEOUT, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(err))) => Err(PlayerError::Action(format!("{command}: {err}"))),
            Ok(Err(_)) => Err(PlayerError::Action(format!("{command}: player closed"))),
            Err(_) => {
                conn.pending.lock().await.remove(&request_id);
                Err(PlayerError::Action(format!("{command}: timed out")))
            }
        }
    }

    async fn set_property(&mut self, key: &str, value: Value) -> Result<(), PlayerError> {
        self.command(json!(["set_property", key, value])).await.map(|_| ())
    }

    async fn apply_properties(&mut self, properties: &[(String, String)]) {
        for (key, value) in properties {
            if let Err(err) = self.set_property(key, json!(value)).await {
                warn!("Failed to set {key}: {err}");
            }
        }
    }
}

#[async_trait]
impl Player for MpvPlayer {
    fn is_running(&self) -> bool {
        self.conn.as_ref().is_some_and(Connection::is_alive)
    }

    async fn launch(&mut self, spec: &LaunchSpec) -> Result<(), PlayerError> {
        if self.is_running() {
            return Err(PlayerError::Launch("player is already running".to_owned()));
        }

        // Stale socket from a previous run
        let _ = tokio::fs::remove_file(&self.ipc_path).await;

        debug!("Player args: {:?}", spec.args);

        let mut child = Command::new(&self.executable)
            .args(&spec.args)
            .arg(format!("--input-ipc-server={}", self.ipc_path.display()))
            .arg(&spec.media)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| PlayerError::Launch(format!("{}: {err}", self.executable)))?;

        let stream = wait_for_socket(&self.executable, &self.ipc_path, &mut child).await?;
        let (reader, writer) = stream.into_split();

        let pending: Pending = Arc::default();
        let load_waiter: LoadWaiter = Arc::default();

        tokio::spawn(read_ipc(
            reader,
            Arc::clone(&pending),
            Arc::clone(&load_waiter),
            self.event_tx.clone(),
        ));
        let process = ProcessHandle::watch(child, self.event_tx.clone());

        self.conn = Some(Connection {
            writer,
            pending,
            load_waiter,
            process,
        });

        for (id, name) in OBSERVED_PROPERTIES.iter().enumerate() {
            if let Err(err) = self.command(json!(["observe_property", id + 1, name])).await {
                warn!("Failed to observe {name}: {err}");
            }
        }

        self.apply_properties(&spec.properties).await;

        info!("Player started");

        Ok(())
    }

    async fn load(&mut self, spec: &LaunchSpec) -> Result<(), PlayerError> {
        self.apply_properties(&spec.properties).await;

        let load_waiter = Arc::clone(&self.live_connection()?.load_waiter);
        let (tx, rx) = oneshot::channel();
        *load_waiter.lock().await = Some(tx);

        debug!("Loading new media: {}", spec.media);
        self.command(json!(["loadfile", spec.media, "replace"]))
            .await
            .map_err(|err| PlayerError::Load(err.to_string()))?;

        match tokio::time::timeout(LOAD_TIMEOUT, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(PlayerError::Load(err)),
            Ok(Err(_)) => Err(PlayerError::Load("player closed".to_owned())),
            Err(_) => {
                load_waiter.lock().await.take();
                Err(PlayerError::Load("timed out".to_owned()))
            }
        }
    }

    async fn play(&mut self) -> Result<(), PlayerError> {
        self.set_property("pause", json!(false)).await
    }

    async fn pause(&mut self) -> Result<(), PlayerError> {
        self.set_property("pause", json!(true)).await
    }

    async fn cycle(&mut self, what: Cycle) -> Result<(), PlayerError> {
        let property = match what {
            Cycle::Pause => "pause",
            Cycle::Video => "video",
            Cycle::Audio => "audio",
            Cycle::Subtitles => "sub",
            Cycle::Fullscreen => "fullscreen",
        };
        self.command(json!(["cycle", property])).await.map(|_| ())
    }

    async fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        self.command(json!(["seek", position, "absolute"]))
            .await
            .map(|_| ())
    }

    async fn set_volume(&mut self, volume: f64) -> Result<(), PlayerError> {
        self.set_property("volume", json!(clamp_volume(volume) * 100.0))
            .await
    }

    async fn quit(&mut self) -> Result<(), PlayerError> {
        let conn = self.live_connection()?;

        // mpv may close the socket before replying, so don't wait for one
        let line = format!("{}\n", json!({ "command": ["quit"] }));
        if let Err(err) = conn.writer.write_all(line.as_bytes()).await {
            warn!("Failed to send quit, killing player: {err}");
            conn.process.kill();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replies() {
        assert_eq!(
            parse_ipc_line(r#"{"data":null,"error":"success","request_id":3}"#),
            Some(IpcMessage::Reply {
                request_id: 3,
                result: Ok(Value::Null)
            })
        );
        assert_eq!(
            parse_ipc_line(r#"{"error":"property not found","request_id":4}"#),
            Some(IpcMessage::Reply {
                request_id: 4,
                result: Err("property not found".to_owned())
            })
        );
    }

    #[test]
    fn parses_property_changes() {
        assert_eq!(
            parse_ipc_line(r#"{"event":"property-change","id":1,"name":"volume","data":55.0}"#),
            Some(IpcMessage::Property(PlayerProperty::Volume(0.55)))
        );
        assert_eq!(
            parse_ipc_line(r#"{"event":"property-change","id":1,"name":"volume","data":130.0}"#),
            Some(IpcMessage::Property(PlayerProperty::Volume(1.0)))
        );
        assert_eq!(
            parse_ipc_line(r#"{"event":"property-change","id":2,"name":"time-pos","data":12.5}"#),
            Some(IpcMessage::Property(PlayerProperty::TimePos(12.5)))
        );
        assert_eq!(
            parse_ipc_line(r#"{"event":"property-change","id":4,"name":"pause","data":true}"#),
            Some(IpcMessage::Property(PlayerProperty::Pause(true)))
        );
        assert_eq!(
            parse_ipc_line(r#"{"event":"property-change","id":5,"name":"speed","data":2.0}"#),
            Some(IpcMessage::Property(PlayerProperty::Speed(2.0)))
        );
        assert_eq!(
            parse_ipc_line(r#"{"event":"property-change","id":6,"name":"eof-reached","data":true}"#),
            Some(IpcMessage::Property(PlayerProperty::EofReached(true)))
        );
        assert_eq!(
            parse_ipc_line(r#"{"event":"property-change","id":3,"name":"duration"}"#),
            None
        );
    }

    #[test]
    fn parses_load_events() {
        assert_eq!(
            parse_ipc_line(r#"{"event":"file-loaded"}"#),
            Some(IpcMessage::FileLoaded)
        );
        assert_eq!(
            parse_ipc_line(r#"{"event":"end-file","reason":"error","file_error":"loading failed"}"#),
            Some(IpcMessage::LoadFailed("loading failed".to_owned()))
        );
        assert_eq!(
            parse_ipc_line(r#"{"event":"end-file","reason":"eof"}"#),
            None
        );
        assert_eq!(parse_ipc_line("not json"), None);
    }

    #[tokio::test]
    async fn actions_need_a_process() {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let mut player = MpvPlayer::new("mpv", "/tmp/castbeam-test-socket", event_tx);
        assert!(!player.is_running());
        assert_eq!(player.play().await, Err(PlayerError::NotRunning));
        assert_eq!(player.quit().await, Err(PlayerError::NotRunning));
    }

    #[tokio::test]
    async fn missing_executable_fails_launch() {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let mut player = MpvPlayer::new(
            "castbeam-no-such-player",
            "/tmp/castbeam-test-missing-socket",
            event_tx,
        );
        let spec = LaunchSpec {
            media: "a.mp4".to_owned(),
            args: Vec::new(),
            properties: Vec::new(),
        };
        assert!(matches!(
            player.launch(&spec).await,
            Err(PlayerError::Launch(_))
        ));
    }
}
