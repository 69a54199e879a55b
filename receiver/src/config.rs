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

use std::path::{Path, PathBuf};

use cast_lib::models::HostTarget;
use clap::Parser;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::keymap::Keymap;
use crate::session::SessionConfig;

pub const DEFAULT_SENDER_PORT: u16 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Mpv,
    Vlc,
}

pub fn random_name() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect();
    format!("Castbeam-{suffix}")
}

fn parse_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("name must not be empty".to_owned());
    }
    Ok(name.to_owned())
}

/// `host` or `host:port`, optionally prefixed with `http://`.
pub fn parse_host(value: &str) -> Result<HostTarget, String> {
    let bare = value
        .strip_prefix("http://")
        .unwrap_or(value)
        .trim_end_matches('/');
    if bare.is_empty() {
        return Err("host must not be empty".to_owned());
    }

    let has_port = match bare.rsplit_once(':') {
        // Bare IPv6 addresses contain colons without a port
        Some((host, _)) => !host.contains(':') || host.ends_with(']'),
        None => false,
    };

    if has_port {
        HostTarget::from_url(bare).ok_or_else(|| format!("invalid host: {value}"))
    } else {
        let host = bare.trim_start_matches('[').trim_end_matches(']');
        Ok(HostTarget::new(host, DEFAULT_SENDER_PORT))
    }
}

/// Receives media casted from a Castbeam sender and plays it with mpv or VLC.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct ReceiverConfig {
    /// Name of this receiver
    #[arg(short, long, default_value_t = random_name(), value_parser = parse_name)]
    pub name: String,

    /// Port of the HTTP API used for discovery mode connections
    #[arg(short, long, default_value_t = 9881, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Media player executable (mpv, or vlc/cvlc)
    #[arg(long, default_value = "mpv")]
    pub player: String,

    /// Path of the player IPC socket
    #[arg(long, default_value = "/tmp/castbeam-socket")]
    pub ipc_path: PathBuf,

    /// Do not use HDMI-CEC
    #[arg(long)]
    pub disable_cec: bool,

    /// Use the alternative CEC remote keymap
    #[arg(long)]
    pub cec_alt_remote: bool,

    /// Switch the TV input to this device when a cast starts
    #[arg(long)]
    pub cec_force_switch: bool,

    /// HDMI port the TV switches to after playback ends
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=15))]
    pub cec_end_hdmi: Option<u8>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Connect directly to a sender at host[:port] instead of waiting to be found
    #[arg(value_parser = parse_host)]
    pub host: Option<HostTarget>,
}

impl ReceiverConfig {
    pub fn keymap(&self) -> Keymap {
        if self.cec_alt_remote {
            Keymap::Alt
        } else {
            Keymap::Primary
        }
    }

    /// VLC for `vlc`/`cvlc` executables, mpv otherwise.
    pub fn player_kind(&self) -> PlayerKind {
        let stem = Path::new(&self.player)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match stem.as_str() {
            "vlc" | "cvlc" => PlayerKind::Vlc,
            _ => PlayerKind::Mpv,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            name: self.name.clone(),
            direct: self.host.is_some(),
            cec_force_switch: self.cec_force_switch,
            cec_end_hdmi: self.cec_end_hdmi,
            keymap: self.keymap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_names() {
        let name = random_name();
        assert!(name.starts_with("Castbeam-"));
        assert_eq!(name.len(), "Castbeam-".len() + 4);
        assert!(name["Castbeam-".len()..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hosts() {
        assert_eq!(
            parse_host("10.0.0.2"),
            Ok(HostTarget::new("10.0.0.2", DEFAULT_SENDER_PORT))
        );
        assert_eq!(
            parse_host("http://10.0.0.2:9880/"),
            Ok(HostTarget::new("10.0.0.2", 9880))
        );
        assert_eq!(parse_host("fe80::1"), Ok(HostTarget::new("fe80::1", 4000)));
        assert_eq!(parse_host("[fe80::1]:9880"), Ok(HostTarget::new("fe80::1", 9880)));
        assert!(parse_host("10.0.0.2:0").is_err());
        assert!(parse_host("").is_err());
    }

    #[test]
    fn command_line() {
        let config =
            ReceiverConfig::try_parse_from(["receiver", "--name", "Living Room", "10.0.0.2:9880"])
                .unwrap();
        assert_eq!(config.name, "Living Room");
        assert_eq!(config.port, 9881);
        assert_eq!(config.host, Some(HostTarget::new("10.0.0.2", 9880)));
        assert!(config.session_config().direct);
        assert_eq!(config.keymap(), Keymap::Primary);

        let config = ReceiverConfig::try_parse_from(["receiver", "--cec-alt-remote"]).unwrap();
        assert!(config.host.is_none());
        assert!(config.name.starts_with("Castbeam-"));
        assert_eq!(config.keymap(), Keymap::Alt);

        assert!(ReceiverConfig::try_parse_from(["receiver", "--name", " "]).is_err());
        assert!(ReceiverConfig::try_parse_from(["receiver", "--port", "0"]).is_err());
        assert!(ReceiverConfig::try_parse_from(["receiver", "--cec-end-hdmi", "16"]).is_err());
    }

    #[test]
    fn player_by_executable() {
        let kind = |player: &str| {
            ReceiverConfig::try_parse_from(["receiver", "--player", player])
                .unwrap()
                .player_kind()
        };
        assert_eq!(kind("mpv"), PlayerKind::Mpv);
        assert_eq!(kind("/usr/local/bin/mpv"), PlayerKind::Mpv);
        assert_eq!(kind("vlc"), PlayerKind::Vlc);
        assert_eq!(kind("/usr/bin/cvlc"), PlayerKind::Vlc);
        assert_eq!(kind("VLC.exe"), PlayerKind::Vlc);
        assert_eq!(
            ReceiverConfig::try_parse_from(["receiver"])
                .unwrap()
                .player_kind(),
            PlayerKind::Mpv
        );
    }
}
