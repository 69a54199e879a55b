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

use cast_lib::models::{is_url, Addon, CastMessage, HostTarget, StreamType};

/// Where the player fetches the media, subtitles and cover from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub media: String,
    pub subs: String,
    pub cover: String,
    pub is_url: bool,
}

impl MediaSource {
    /// URLs are played directly, local files through the sender's media
    /// server.
    pub fn for_cast(msg: &CastMessage, sender: &HostTarget) -> Self {
        let base = sender.to_url();
        let is_url = is_url(&msg.file_path);

        Self {
            media: if is_url {
                msg.file_path.clone()
            } else {
                format!("{base}/cast")
            },
            subs: format!("{base}/subs"),
            cover: format!("{base}/cover"),
            is_url,
        }
    }
}

/// Everything needed to start or load one media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub media: String,
    pub args: Vec<String>,
    /// Applied in order after launch and before every load.
    pub properties: Vec<(String, String)>,
}

pub trait PlayerArgsBuilder: Send + Sync {
    fn args(&self, msg: &CastMessage, source: &MediaSource) -> Vec<String>;

    fn properties(&self, msg: &CastMessage, title: &str) -> Vec<(String, String)>;

    fn build(&self, msg: &CastMessage, source: &MediaSource, title: &str) -> LaunchSpec {
        LaunchSpec {
            media: source.media.clone(),
            args: self.args(msg, source),
            properties: self.properties(msg, title),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MpvArgs;

impl PlayerArgsBuilder for MpvArgs {
    fn args(&self, _msg: &CastMessage, source: &MediaSource) -> Vec<String> {
        let mut args = Vec::new();
        if !source.is_url {
            args.push("--no-ytdl".to_owned());
        }

        args.extend([
            "--fullscreen".to_owned(),
            "--volume-max=100".to_owned(),
            "--keep-open=yes".to_owned(),
            "--image-display-duration=inf".to_owned(),
            "--vid=1".to_owned(),
            format!("--external-file={}", source.cover),
            format!("--sub-file={}", source.subs),
        ]);

        args
    }

    fn properties(&self, msg: &CastMessage, title: &str) -> Vec<(String, String)> {
        let picture = msg.stream_type == StreamType::Picture;
        let no_cache = msg.addon == Some(Addon::Desktop) || msg.stream_type == StreamType::VideoLive;

        let prop = |key: &str, value: &str| (key.to_owned(), value.to_owned());

        vec![
            prop("force-media-title", title),
            prop("osc", if picture { "no" } else { "yes" }),
            prop("cache", if no_cache { "no" } else { "auto" }),
            prop("loop-file", if picture { "inf" } else { "no" }),
        ]
    }
}

/// VLC has no runtime properties, so everything goes on the command line.
/// Subtitles are attached as an input slave since VLC's `--sub-file` only
/// takes local paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct VlcArgs;

impl PlayerArgsBuilder for VlcArgs {
    fn args(&self, msg: &CastMessage, source: &MediaSource) -> Vec<String> {
        let mut args = vec![
            "--fullscreen".to_owned(),
            "--play-and-pause".to_owned(),
            "--no-video-title-show".to_owned(),
        ];

        match msg.stream_type {
            StreamType::Picture => args.push("--image-duration=-1".to_owned()),
            StreamType::Video | StreamType::VideoLive if msg.subs_path.is_some() => {
                args.push(format!("--input-slave={}", source.subs));
            }
            _ => (),
        }

        if msg.addon == Some(Addon::Desktop) || msg.stream_type == StreamType::VideoLive {
            args.push("--network-caching=0".to_owned());
        }

        args
    }

    fn properties(&self, _msg: &CastMessage, _title: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}
