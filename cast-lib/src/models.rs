use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Opcode {
    None = 0,
    Connect,
    Invalid,
    Cast,
    StatusUpdate,
    RemoteSignal,
    Control,
    ShowRemote,
    CastError,
    AttachRequest,
    AttachRemote,
    AttachConnect,
    AttachStatus,
    AttachShow,
    Ping,
    Pong,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub size: u32,
    pub opcode: Opcode,
}

/// Classification of a cast item, decides how the player is configured.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    #[default]
    Video,
    Music,
    Picture,
    VideoLive,
}

impl StreamType {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video | Self::VideoLive)
    }

    pub fn is_live(&self) -> bool {
        *self == Self::VideoLive
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Addon {
    Desktop,
}

/// 1-based position of the cast item inside the sender's playlist.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistPosition {
    pub index: usize,
    pub length: usize,
}

impl Default for PlaylistPosition {
    fn default() -> Self {
        Self {
            index: 1,
            length: 1,
        }
    }
}

impl PlaylistPosition {
    pub fn is_first(&self) -> bool {
        self.index <= 1
    }

    pub fn is_last(&self) -> bool {
        self.index >= self.length
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CastMessage {
    pub name: String,
    #[serde(default)]
    pub stream_type: StreamType,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subs_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addon: Option<Addon>,
    #[serde(default)]
    pub playlist: PlaylistPosition,
}

impl CastMessage {
    /// Extracted title, falling back to the file stem.
    pub fn display_title(&self) -> String {
        if let Some(title) = self.title.as_ref().filter(|t| !t.is_empty()) {
            return title.clone();
        }

        Path::new(&self.file_path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "Castbeam".to_owned())
    }
}

/// Whether a playlist item or file path is a network URL (`scheme://host...`)
/// rather than a local path.
pub fn is_url(path: &str) -> bool {
    let Some((scheme, rest)) = path.split_once("://") else {
        return false;
    };

    !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !rest.is_empty()
        && !rest.starts_with('/')
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Playing,
    Paused,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub title: String,
    pub player_state: PlayerState,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub speed: f64,
    pub stream_type: StreamType,
    pub subtitles: bool,
    pub playlist: PlaylistPosition,
}

impl SessionStatus {
    /// Fresh status for a newly accepted cast. Volume and player state carry
    /// over from `previous`, timing starts from zero.
    pub fn for_cast(msg: &CastMessage, previous: Option<&SessionStatus>) -> Self {
        Self {
            title: msg.display_title(),
            player_state: previous
                .map(|s| s.player_state)
                .unwrap_or(PlayerState::Paused),
            current_time: 0.0,
            duration: 0.0,
            volume: previous.map(|s| s.volume).unwrap_or(0.0),
            speed: 1.0,
            stream_type: msg.stream_type,
            subtitles: msg.subs_path.is_some(),
            playlist: msg.playlist,
        }
    }
}

fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

impl SessionStatus {
    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let state = match self.player_state {
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
        };
        format!(
            "{state}: {} [{}/{}] {} / {} | volume {}%",
            self.title,
            self.playlist.index,
            self.playlist.length,
            format_time(self.current_time),
            format_time(self.duration),
            (self.volume * 100.0).round() as i64,
        )
    }
}

/// Clamp a volume fraction into `[0, 1]`.
pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvalidField {
    Name,
}

/// Payload of the `invalid` message: `"name"` on rejection, `false` when the
/// connect was accepted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum InvalidMessage {
    Field(InvalidField),
    Flag(bool),
}

impl InvalidMessage {
    pub const fn name_conflict() -> Self {
        Self::Field(InvalidField::Name)
    }

    pub const fn accepted() -> Self {
        Self::Flag(false)
    }

    pub fn is_name_conflict(&self) -> bool {
        matches!(self, Self::Field(InvalidField::Name))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteAction {
    #[serde(rename = "PLAY")]
    Play,
    #[serde(rename = "PAUSE")]
    Pause,
    #[serde(rename = "CYCLEPAUSE")]
    CyclePause,
    #[serde(rename = "CYCLEVIDEO")]
    CycleVideo,
    #[serde(rename = "CYCLEAUDIO")]
    CycleAudio,
    #[serde(rename = "CYCLESUBS")]
    CycleSubs,
    #[serde(rename = "CYCLEFULLSCREEN")]
    CycleFullscreen,
    #[serde(rename = "SEEK")]
    Seek,
    #[serde(rename = "SEEK+")]
    SeekForward,
    #[serde(rename = "SEEK-")]
    SeekBackward,
    #[serde(rename = "SKIP+")]
    SkipForward,
    #[serde(rename = "SKIP-")]
    SkipBackward,
    #[serde(rename = "VOLUME")]
    Volume,
    #[serde(rename = "VOLUME+")]
    VolumeUp,
    #[serde(rename = "VOLUME-")]
    VolumeDown,
    #[serde(rename = "STOP")]
    Stop,
}

impl std::str::FromStr for RemoteAction {
    type Err = String;

    /// Accepts the wire names case-insensitively (`play`, `SEEK+`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_uppercase()))
            .map_err(|_| format!("unknown remote action: {s}"))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RemoteSignal {
    pub action: RemoteAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl RemoteSignal {
    pub fn new(action: RemoteAction, value: Option<f64>) -> Self {
        Self { action, value }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ControlCommand {
    TrackEnded,
    NextTrack,
    PreviousTrack,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AttachConnectMessage {
    pub name: String,
    #[serde(flatten)]
    pub status: SessionStatus,
}

/// Sender address handed to a receiver through its connect endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostTarget {
    pub hostname: String,
    pub port: u16,
}

impl HostTarget {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// `host:port` suitable for `TcpStream::connect`.
    pub fn authority(&self) -> String {
        if self.hostname.contains(':') && !self.hostname.starts_with('[') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }

    pub fn to_url(&self) -> String {
        format!("http://{}", self.authority())
    }

    /// Parse `http://host:port` (scheme optional).
    pub fn from_url(url: &str) -> Option<Self> {
        let rest = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("ws://"))
            .unwrap_or(url);
        let rest = rest.trim_end_matches('/');
        let (host, port) = rest.rsplit_once(':')?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }
        let port = port.parse::<u16>().ok().filter(|p| *p > 0)?;
        Some(Self::new(host, port))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AttachInfo {
    pub host: Option<String>,
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Connect,
            2 => Self::Invalid,
            3 => Self::Cast,
            4 => Self::StatusUpdate,
            5 => Self::RemoteSignal,
            6 => Self::Control,
            7 => Self::ShowRemote,
            8 => Self::CastError,
            9 => Self::AttachRequest,
            10 => Self::AttachRemote,
            11 => Self::AttachConnect,
            12 => Self::AttachStatus,
            13 => Self::AttachShow,
            14 => Self::Ping,
            15 => Self::Pong,
            _ => Self::None,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value as u8
    }
}

impl Header {
    pub fn new(opcode: Opcode, size: u32) -> Self {
        Self {
            size: size + 1,
            opcode,
        }
    }

    pub fn decode(buf: [u8; 5]) -> Self {
        Self {
            size: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]).saturating_sub(1),
            opcode: Opcode::from(buf[4]),
        }
    }

    pub fn encode(&self) -> [u8; 5] {
        let size_slice = u32::to_le_bytes(self.size);
        [
            size_slice[0],
            size_slice[1],
            size_slice[2],
            size_slice[3],
            self.opcode.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast(file_path: &str) -> CastMessage {
        CastMessage {
            name: "Living Room".to_owned(),
            stream_type: StreamType::Video,
            file_path: file_path.to_owned(),
            subs_path: None,
            cover_path: None,
            title: None,
            addon: None,
            playlist: PlaylistPosition::default(),
        }
    }

    #[test]
    fn test_header_encode() {
        assert_eq!(Header::new(Opcode::Ping, 0).encode(), [1, 0, 0, 0, 14]);
        assert_eq!(Header::new(Opcode::Cast, 200).encode(), [201, 0, 0, 0, 3]);
        assert_eq!(Header::new(Opcode::None, 0).encode(), [1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_header_decode() {
        assert_eq!(
            Header::decode([201, 0, 0, 0, 3]),
            Header {
                size: 200,
                opcode: Opcode::Cast
            }
        );
        assert_eq!(Header::decode([0, 0, 0, 0, 99]).size, 0);
        assert_eq!(Header::decode([1, 0, 0, 0, 99]).opcode, Opcode::None);
    }

    #[test]
    fn invalid_message_wire_form() {
        assert_eq!(
            serde_json::to_string(&InvalidMessage::name_conflict()).unwrap(),
            "\"name\""
        );
        assert_eq!(
            serde_json::to_string(&InvalidMessage::accepted()).unwrap(),
            "false"
        );
        let parsed: InvalidMessage = serde_json::from_str("\"name\"").unwrap();
        assert!(parsed.is_name_conflict());
        let parsed: InvalidMessage = serde_json::from_str("false").unwrap();
        assert!(!parsed.is_name_conflict());
    }

    #[test]
    fn remote_signal_wire_form() {
        let signal: RemoteSignal =
            serde_json::from_str(r#"{"action":"SEEK+","value":10}"#).unwrap();
        assert_eq!(signal, RemoteSignal::new(RemoteAction::SeekForward, Some(10.0)));

        let signal: RemoteSignal = serde_json::from_str(r#"{"action":"STOP"}"#).unwrap();
        assert_eq!(signal.value, None);

        assert!(serde_json::from_str::<RemoteSignal>(r#"{"action":"JUMP"}"#).is_err());
    }

    #[test]
    fn control_command_wire_form() {
        assert_eq!(
            serde_json::to_string(&ControlCommand::TrackEnded).unwrap(),
            "\"track-ended\""
        );
        assert_eq!(
            serde_json::from_str::<ControlCommand>("\"previous-track\"").unwrap(),
            ControlCommand::PreviousTrack
        );
    }

    #[test]
    fn cast_message_uses_camel_case() {
        let mut msg = cast("/media/a.mp4");
        msg.stream_type = StreamType::VideoLive;
        msg.playlist = PlaylistPosition {
            index: 2,
            length: 2,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["streamType"], "VIDEO_LIVE");
        assert_eq!(json["filePath"], "/media/a.mp4");
        assert_eq!(json["playlist"]["index"], 2);
        assert!(json.get("subsPath").is_none());
    }

    #[test]
    fn display_title_falls_back_to_stem() {
        assert_eq!(cast("/media/holiday.mp4").display_title(), "holiday");

        let mut msg = cast("/media/holiday.mp4");
        msg.title = Some("Summer".to_owned());
        assert_eq!(msg.display_title(), "Summer");

        assert_eq!(cast("").display_title(), "Castbeam");
    }

    #[test]
    fn status_for_cast_keeps_volume_and_state() {
        let first = SessionStatus::for_cast(&cast("a.mp4"), None);
        assert_eq!(first.volume, 0.0);
        assert_eq!(first.player_state, PlayerState::Paused);

        let mut previous = first.clone();
        previous.volume = 0.7;
        previous.player_state = PlayerState::Playing;
        previous.current_time = 42.0;
        previous.duration = 100.0;

        let mut msg = cast("b.mp4");
        msg.subs_path = Some("b.srt".to_owned());
        let next = SessionStatus::for_cast(&msg, Some(&previous));
        assert_eq!(next.volume, 0.7);
        assert_eq!(next.player_state, PlayerState::Playing);
        assert_eq!(next.current_time, 0.0);
        assert_eq!(next.duration, 0.0);
        assert!(next.subtitles);
        assert_eq!(next.title, "b");
    }

    #[test]
    fn volume_is_clamped() {
        assert_eq!(clamp_volume(1.2), 1.0);
        assert_eq!(clamp_volume(-0.3), 0.0);
        assert_eq!(clamp_volume(0.5), 0.5);
        assert_eq!(clamp_volume(f64::NAN), 0.0);
    }

    #[test]
    fn host_target_urls() {
        let target = HostTarget::new("192.168.1.5", 9880);
        assert_eq!(target.to_url(), "http://192.168.1.5:9880");
        assert_eq!(HostTarget::from_url("http://192.168.1.5:9880"), Some(target));
        assert_eq!(
            HostTarget::from_url("http://[fe80::1]:4000/"),
            Some(HostTarget::new("fe80::1", 4000))
        );
        assert_eq!(HostTarget::new("fe80::1", 4000).authority(), "[fe80::1]:4000");
        assert_eq!(HostTarget::from_url("http://host"), None);
        assert_eq!(HostTarget::from_url("http://host:0"), None);
    }

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/video.mp4"));
        assert!(is_url("http://10.0.0.2:9880/cast"));
        assert!(!is_url("/home/user/video.mp4"));
        assert!(!is_url("video.mp4"));
        assert!(!is_url("file:///home/user/video.mp4"));
        assert!(!is_url("://nohost"));
    }

    #[test]
    fn status_summary() {
        let status = SessionStatus {
            title: "Movie".to_owned(),
            player_state: PlayerState::Playing,
            current_time: 65.0,
            duration: 3725.0,
            volume: 0.5,
            speed: 1.0,
            stream_type: StreamType::Video,
            subtitles: false,
            playlist: PlaylistPosition::default(),
        };
        assert_eq!(
            status.summary(),
            "Playing: Movie [1/1] 01:05 / 1:02:05 | volume 50%"
        );
        assert_eq!(format_time(f64::NAN), "00:00");
        assert_eq!(format_time(-3.0), "00:00");
    }

    #[test]
    fn remote_actions_from_str() {
        assert_eq!("play".parse::<RemoteAction>(), Ok(RemoteAction::Play));
        assert_eq!("SEEK+".parse::<RemoteAction>(), Ok(RemoteAction::SeekForward));
        assert_eq!(" volume- ".parse::<RemoteAction>(), Ok(RemoteAction::VolumeDown));
        assert!("rewind".parse::<RemoteAction>().is_err());
    }
}
