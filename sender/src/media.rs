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

use cast_lib::models::{is_url, StreamType};
use log::debug;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "avi", "mov", "m4v", "mpg", "mpeg", "ts", "m2ts", "wmv", "flv", "ogv",
    "3gp",
];
const MUSIC_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "m4a", "aac", "wav", "wma", "alac", "ape",
];
const PICTURE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"];

const SUBS_DIRS: &[&str] = &["Subs", "Subtitles"];
const SUBS_FORMATS: &[&str] = &["srt", "ass", "vtt"];
const COVER_NAMES: &[&str] = &["cover", "cover_01", "cover 01", "cover1"];
const COVER_FORMATS: &[&str] = &["jpg", "png"];

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("file does not exist: {0}")]
    Missing(PathBuf),
    #[error("failed to resolve {path}: {source}")]
    Resolve {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What the sender knows about one playlist item before casting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    /// Absolute path for local files, the item itself for URLs.
    pub location: String,
    pub stream_type: StreamType,
    pub title: Option<String>,
    pub subs: Option<PathBuf>,
    pub cover: Option<PathBuf>,
}

impl MediaInfo {
    /// Bare info used when probing is skipped or failed.
    pub fn unprobed(item: &str) -> Self {
        Self {
            location: item.to_owned(),
            stream_type: StreamType::Video,
            title: None,
            subs: None,
            cover: None,
        }
    }
}

pub trait MediaProbe: Send + Sync {
    /// URLs always exist.
    fn exists(&self, item: &str) -> bool;

    fn probe(&self, item: &str) -> Result<MediaInfo, ProbeError>;
}

pub fn classify(path: &Path) -> StreamType {
    let Some(ext) = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    else {
        return StreamType::Video;
    };

    if MUSIC_EXTENSIONS.contains(&ext.as_str()) {
        StreamType::Music
    } else if PICTURE_EXTENSIONS.contains(&ext.as_str()) {
        StreamType::Picture
    } else {
        StreamType::Video
    }
}

/// Guess for the `Content-Type` of served files.
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" | "m2ts" => "video/mp2t",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "m4a" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "srt" => "application/x-subrip",
        "ass" => "text/x-ssa",
        "vtt" => "text/vtt",
        ext if VIDEO_EXTENSIONS.contains(&ext) => "video/*",
        _ => "application/octet-stream",
    }
}

fn find_file(dir: &Path, names: &[String], sub_dirs: &[&str]) -> Option<PathBuf> {
    std::iter::once(dir.to_path_buf())
        .chain(sub_dirs.iter().map(|sub| dir.join(sub)))
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

fn possible_names(stems: &[&str], formats: &[&str]) -> Vec<String> {
    stems
        .iter()
        .flat_map(|stem| formats.iter().map(move |ext| format!("{stem}.{ext}")))
        .collect()
}

/// Probes local files by extension and sibling files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

impl MediaProbe for FsProbe {
    fn exists(&self, item: &str) -> bool {
        is_url(item) || Path::new(item).exists()
    }

    fn probe(&self, item: &str) -> Result<MediaInfo, ProbeError> {
        if is_url(item) {
            return Ok(MediaInfo::unprobed(item));
        }

        let path = Path::new(item);
        if !path.exists() {
            return Err(ProbeError::Missing(path.to_path_buf()));
        }
        let path = std::path::absolute(path).map_err(|source| ProbeError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;

        let stream_type = classify(&path);
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .filter(|stem| !stem.is_empty());
        let dir = path.parent().unwrap_or(Path::new("/"));

        let subs = match (stream_type, &stem) {
            (StreamType::Video, Some(stem)) => {
                find_file(dir, &possible_names(&[stem.as_str()], SUBS_FORMATS), SUBS_DIRS)
            }
            _ => None,
        };
        let cover = match stream_type {
            StreamType::Music => find_file(dir, &possible_names(COVER_NAMES, COVER_FORMATS), &[]),
            _ => None,
        };

        debug!("Probed {}: {stream_type:?} subs={subs:?} cover={cover:?}", path.display());

        Ok(MediaInfo {
            location: path.to_string_lossy().to_string(),
            stream_type,
            title: stem,
            subs,
            cover,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "castbeam-probe-{name}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn touch(&self, rel: &str) -> PathBuf {
            let path = self.0.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"x").unwrap();
            path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify(Path::new("a.MKV")), StreamType::Video);
        assert_eq!(classify(Path::new("a.flac")), StreamType::Music);
        assert_eq!(classify(Path::new("a.Jpeg")), StreamType::Picture);
        assert_eq!(classify(Path::new("noext")), StreamType::Video);
        assert_eq!(classify(Path::new("a.xyz")), StreamType::Video);
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_type(Path::new("/a/b.mp4")), "video/mp4");
        assert_eq!(mime_type(Path::new("cover.PNG")), "image/png");
        assert_eq!(mime_type(Path::new("movie.srt")), "application/x-subrip");
        assert_eq!(mime_type(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn urls_are_not_probed() {
        let url = "https://example.com/stream.m3u8";
        assert!(FsProbe.exists(url));
        assert_eq!(FsProbe.probe(url).unwrap(), MediaInfo::unprobed(url));
    }

    #[test]
    fn missing_files() {
        let dir = TempDir::new("missing");
        let path = dir.0.join("gone.mp4");
        let item = path.to_string_lossy();
        assert!(!FsProbe.exists(&item));
        assert!(matches!(FsProbe.probe(&item), Err(ProbeError::Missing(_))));
    }

    #[test]
    fn finds_subtitles_next_to_video() {
        let dir = TempDir::new("subs");
        let video = dir.touch("movie.mkv");
        let subs = dir.touch("movie.srt");

        let info = FsProbe.probe(&video.to_string_lossy()).unwrap();
        assert_eq!(info.stream_type, StreamType::Video);
        assert_eq!(info.title.as_deref(), Some("movie"));
        assert_eq!(info.subs, Some(subs));
        assert_eq!(info.cover, None);
    }

    #[test]
    fn finds_subtitles_in_subs_dir() {
        let dir = TempDir::new("subsdir");
        let video = dir.touch("movie.mp4");
        let subs = dir.touch("Subtitles/movie.vtt");

        let info = FsProbe.probe(&video.to_string_lossy()).unwrap();
        assert_eq!(info.subs, Some(subs));
    }

    #[test]
    fn finds_cover_for_music() {
        let dir = TempDir::new("cover");
        let song = dir.touch("song.mp3");
        let cover = dir.touch("cover 01.png");
        dir.touch("song.srt");

        let info = FsProbe.probe(&song.to_string_lossy()).unwrap();
        assert_eq!(info.stream_type, StreamType::Music);
        assert_eq!(info.cover, Some(cover));
        assert_eq!(info.subs, None);
        assert_eq!(info.location, song.to_string_lossy());
    }
}
