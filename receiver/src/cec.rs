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

//! HDMI-CEC through a long running `cec-client` process.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use common::error::CastError;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

/// Upper bound for any single CEC call.
pub const CEC_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound for starting `cec-client` and scanning the bus.
pub const CEC_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Time the display gets to settle after a successful probe.
pub const CEC_GRACE: Duration = Duration::from_secs(2);
pub const OSD_NAME: &str = "Castbeam";

const CEC_CLIENT: &str = "cec-client";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CecKey {
    Select,
    Up,
    Down,
    Left,
    Right,
    Exit,
    Play,
    Stop,
    Pause,
    Rewind,
    FastForward,
    Subtitle,
    Blue,
    Red,
    Green,
    Yellow,
    Other(String),
}

impl CecKey {
    /// Maps a CEC user control code, falling back to the printed name.
    pub fn from_code(code: u8, name: &str) -> Self {
        match code {
            0x00 => Self::Select,
            0x01 => Self::Up,
            0x02 => Self::Down,
            0x03 => Self::Left,
            0x04 => Self::Right,
            0x0D => Self::Exit,
            0x44 => Self::Play,
            0x45 => Self::Stop,
            0x46 => Self::Pause,
            0x48 => Self::Rewind,
            0x49 => Self::FastForward,
            0x51 => Self::Subtitle,
            0x71 => Self::Blue,
            0x72 => Self::Red,
            0x73 => Self::Green,
            0x74 => Self::Yellow,
            _ => Self::Other(name.to_owned()),
        }
    }
}

/// Parses `key pressed: <name> (<hex code>)` lines. Names may contain
/// parentheses themselves, e.g. `F2 (red) (72)`.
pub fn parse_key_line(line: &str) -> Option<CecKey> {
    let (_, rest) = line.split_once("key pressed: ")?;

    let mut search = 0;
    while let Some(open) = rest[search..].find('(').map(|i| search + i) {
        let close = open + rest[open..].find(')')?;
        let inner = &rest[open + 1..close];
        if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_hexdigit()) {
            let code = u8::from_str_radix(inner, 16).ok()?;
            let name = rest[..open].trim();
            return Some(CecKey::from_code(code, name));
        }
        search = close + 1;
    }

    None
}

#[derive(Debug, Default)]
struct ScanDevice {
    id: u8,
    address: Option<String>,
    osd: Option<String>,
}

/// Result of a `scan`: whether a TV (device #0) answered and the HDMI port we
/// are plugged into, if our own OSD name was listed.
#[derive(Debug, PartialEq, Eq)]
pub struct ScanResult {
    pub has_tv: bool,
    pub hdmi: Option<u8>,
}

#[derive(Debug, Default)]
struct ScanParser {
    devices: Vec<ScanDevice>,
}

impl ScanParser {
    /// Feeds one output line. Returns the result once the scan listing ends.
    fn feed(&mut self, line: &str) -> Option<ScanResult> {
        let line = line.trim();

        if line.starts_with("currently active source") {
            return Some(self.result());
        }

        if let Some(rest) = line.strip_prefix("device #") {
            let id = rest.split(':').next().and_then(|id| id.trim().parse().ok());
            if let Some(id) = id {
                self.devices.push(ScanDevice {
                    id,
                    ..Default::default()
                });
            }
        } else if let Some((key, value)) = line.split_once(':') {
            let Some(device) = self.devices.last_mut() else {
                return None;
            };
            match key.trim() {
                "address" => device.address = Some(value.trim().to_owned()),
                "osd string" => device.osd = Some(value.trim().to_owned()),
                _ => (),
            }
        }

        None
    }

    fn result(&self) -> ScanResult {
        let hdmi = self
            .devices
            .iter()
            .find(|d| d.osd.as_deref() == Some(OSD_NAME))
            .and_then(|d| d.address.as_deref())
            .and_then(|addr| addr.split('.').next())
            .and_then(|port| port.parse().ok());

        ScanResult {
            has_tv: self.devices.iter().any(|d| d.id == 0),
            hdmi,
        }
    }
}

#[async_trait]
pub trait Cec: Send {
    /// HDMI input of the display this device is connected to.
    fn hdmi_port(&self) -> Option<u8>;

    async fn turn_on(&mut self) -> Result<()>;

    async fn set_active(&mut self) -> Result<()>;

    async fn set_inactive(&mut self) -> Result<()>;

    async fn change_source(&mut self, hdmi: u8) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

pub struct CecClient {
    child: Child,
    stdin: ChildStdin,
    hdmi: Option<u8>,
}

impl CecClient {
    /// Starts `cec-client` and scans the bus. Any failure, including no TV on
    /// the bus, disables CEC for the run.
    pub async fn probe(timeout: Duration, key_tx: mpsc::Sender<CecKey>) -> Option<Self> {
        match tokio::time::timeout(timeout, Self::start(key_tx)).await {
            Ok(Ok(client)) => Some(client),
            Ok(Err(err)) => {
                debug!("CEC probe failed: {err}");
                None
            }
            Err(_) => {
                debug!("CEC probe timed out");
                None
            }
        }
    }

    async fn start(key_tx: mpsc::Sender<CecKey>) -> Result<Self> {
        let mut child = Command::new(CEC_CLIENT)
            .args(["-t", "p", "-o", OSD_NAME, "-d", "1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| anyhow!("{CEC_CLIENT}: {err}"))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("{CEC_CLIENT} has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("{CEC_CLIENT} has no stdout"))?;
        let mut lines = BufReader::new(stdout).lines();

        loop {
            let line = next_line(&mut lines).await?;
            trace!("cec: {line}");
            if line.contains("waiting for input") {
                break;
            }
        }

        stdin.write_all(b"scan\n").await?;

        let mut parser = ScanParser::default();
        let scan = loop {
            let line = next_line(&mut lines).await?;
            trace!("cec: {line}");
            if let Some(scan) = parser.feed(&line) {
                break scan;
            }
        };

        if !scan.has_tv {
            bail!(CastError::CecUnavailable);
        }

        info!("CEC available, HDMI port: {:?}", scan.hdmi);

        tokio::spawn(read_keys(lines, key_tx));

        Ok(Self {
            child,
            stdin,
            hdmi: scan.hdmi,
        })
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        debug!("CEC command: {command}");
        let line = format!("{command}\n");
        tokio::time::timeout(CEC_TIMEOUT, async {
            self.stdin.write_all(line.as_bytes()).await?;
            self.stdin.flush().await
        })
        .await
        .map_err(|_| anyhow!("CEC command `{command}` timed out"))??;
        Ok(())
    }
}

async fn next_line(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<String> {
    lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("{CEC_CLIENT} exited"))
}

async fn read_keys(mut lines: Lines<BufReader<ChildStdout>>, key_tx: mpsc::Sender<CecKey>) {
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(key) = parse_key_line(&line) else {
            continue;
        };
        debug!("CEC key: {key:?}");
        if key_tx.send(key).await.is_err() {
            break;
        }
    }
    debug!("CEC key reader finished");
}

#[async_trait]
impl Cec for CecClient {
    fn hdmi_port(&self) -> Option<u8> {
        self.hdmi
    }

    async fn turn_on(&mut self) -> Result<()> {
        self.send("on 0").await
    }

    async fn set_active(&mut self) -> Result<()> {
        self.send("as").await
    }

    async fn set_inactive(&mut self) -> Result<()> {
        self.send("is").await
    }

    async fn change_source(&mut self, hdmi: u8) -> Result<()> {
        self.send(&format!("tx 1F:82:{hdmi}0:00")).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(err) = self.send("q").await {
            warn!("Failed to quit {CEC_CLIENT}: {err}");
        }
        match tokio::time::timeout(CEC_TIMEOUT, self.child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_) => self.child.start_kill()?,
        }
        Ok(())
    }
}
