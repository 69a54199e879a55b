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

//! Media player adapter.
//!
//! The session talks to the player only through [`Player`]; property changes
//! and process exit arrive asynchronously as [`PlayerEvent`]s.

use async_trait::async_trait;
use common::error::CastError;
use thiserror::Error;

pub mod args;
pub mod mpv;
mod process;
pub mod vlc;

pub use args::{LaunchSpec, MediaSource, MpvArgs, PlayerArgsBuilder, VlcArgs};
pub use mpv::MpvPlayer;
pub use vlc::VlcPlayer;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlayerError {
    #[error("failed to launch player: {0}")]
    Launch(String),
    #[error("failed to load media: {0}")]
    Load(String),
    #[error("{0}")]
    Action(String),
    #[error("player is not running")]
    NotRunning,
}

impl From<PlayerError> for CastError {
    fn from(value: PlayerError) -> Self {
        match value {
            PlayerError::Launch(err) => CastError::Restart(err),
            PlayerError::Load(err) => CastError::Load(err),
            PlayerError::Action(err) => CastError::Action(err),
            PlayerError::NotRunning => CastError::Action(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerProperty {
    /// Fraction in `[0, 1]`.
    Volume(f64),
    TimePos(f64),
    Duration(f64),
    Pause(bool),
    /// Playback rate, 1.0 is normal speed.
    Speed(f64),
    EofReached(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Property(PlayerProperty),
    Exited(Option<i32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Pause,
    Video,
    Audio,
    Subtitles,
    Fullscreen,
}

#[async_trait]
pub trait Player: Send {
    fn is_running(&self) -> bool;

    /// Starts a new player process playing `spec`.
    async fn launch(&mut self, spec: &LaunchSpec) -> Result<(), PlayerError>;

    /// Replaces the media of the running process.
    async fn load(&mut self, spec: &LaunchSpec) -> Result<(), PlayerError>;

    async fn play(&mut self) -> Result<(), PlayerError>;

    async fn pause(&mut self) -> Result<(), PlayerError>;

    async fn cycle(&mut self, what: Cycle) -> Result<(), PlayerError>;

    /// Absolute seek in seconds.
    async fn seek(&mut self, position: f64) -> Result<(), PlayerError>;

    /// `volume` is a fraction, clamped to `[0, 1]` before it is sent.
    async fn set_volume(&mut self, volume: f64) -> Result<(), PlayerError>;

    /// Asks the process to exit. [`PlayerEvent::Exited`] follows.
    async fn quit(&mut self) -> Result<(), PlayerError>;
}
