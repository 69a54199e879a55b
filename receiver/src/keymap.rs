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

//! Translation of remote signals and CEC keys into player actions.

use cast_lib::models::{RemoteAction, RemoteSignal};

use crate::cec::CecKey;

/// Seconds skipped by the seek keys of a CEC remote.
pub const CEC_SEEK_TIME: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Play,
    Pause,
    CyclePause,
    CycleVideo,
    CycleAudio,
    CycleSubs,
    CycleFullscreen,
    /// Fraction of the duration.
    SeekPercent(f64),
    SeekForward(f64),
    SeekBackward(f64),
    NextTrack,
    PreviousTrack,
    SetVolume(f64),
    VolumeUp(f64),
    VolumeDown(f64),
    Quit,
}

impl Action {
    /// `None` when the action needs a value the signal didn't carry.
    pub fn from_remote(signal: &RemoteSignal) -> Option<Self> {
        let value = signal.value.filter(|v| v.is_finite());
        let action = match signal.action {
            RemoteAction::Play => Self::Play,
            RemoteAction::Pause => Self::Pause,
            RemoteAction::CyclePause => Self::CyclePause,
            RemoteAction::CycleVideo => Self::CycleVideo,
            RemoteAction::CycleAudio => Self::CycleAudio,
            RemoteAction::CycleSubs => Self::CycleSubs,
            RemoteAction::CycleFullscreen => Self::CycleFullscreen,
            RemoteAction::Seek => Self::SeekPercent(value?),
            RemoteAction::SeekForward => Self::SeekForward(value?),
            RemoteAction::SeekBackward => Self::SeekBackward(value?),
            RemoteAction::SkipForward => Self::NextTrack,
            RemoteAction::SkipBackward => Self::PreviousTrack,
            RemoteAction::Volume => Self::SetVolume(value?),
            RemoteAction::VolumeUp => Self::VolumeUp(value?),
            RemoteAction::VolumeDown => Self::VolumeDown(value?),
            RemoteAction::Stop => Self::Quit,
        };
        Some(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Keymap {
    #[default]
    Primary,
    /// Layout for remotes whose arrow keys are better suited for seeking.
    Alt,
}

impl Keymap {
    pub fn map(&self, key: &CecKey) -> Option<Action> {
        match self {
            Keymap::Primary => Self::primary(key),
            Keymap::Alt => Self::alt(key),
        }
    }

    fn primary(key: &CecKey) -> Option<Action> {
        Some(match key {
            CecKey::Select => Action::CycleFullscreen,
            CecKey::Up => Action::CycleVideo,
            CecKey::Down => Action::CycleAudio,
            CecKey::Left => Action::PreviousTrack,
            CecKey::Right => Action::NextTrack,
            CecKey::Play => Action::Play,
            CecKey::Pause => Action::Pause,
            CecKey::Rewind => Action::SeekBackward(CEC_SEEK_TIME),
            CecKey::FastForward => Action::SeekForward(CEC_SEEK_TIME),
            CecKey::Subtitle => Action::CycleSubs,
            CecKey::Stop | CecKey::Exit => Action::Quit,
            _ => return None,
        })
    }

    fn alt(key: &CecKey) -> Option<Action> {
        Some(match key {
            CecKey::Select => Action::CyclePause,
            CecKey::Up => Action::NextTrack,
            CecKey::Down => Action::PreviousTrack,
            CecKey::Left | CecKey::Rewind => Action::SeekBackward(CEC_SEEK_TIME),
            CecKey::Right | CecKey::FastForward => Action::SeekForward(CEC_SEEK_TIME),
            CecKey::Play => Action::Play,
            CecKey::Pause => Action::Pause,
            CecKey::Red => Action::CycleVideo,
            CecKey::Green => Action::CycleAudio,
            CecKey::Yellow | CecKey::Subtitle => Action::CycleSubs,
            CecKey::Blue => Action::CycleFullscreen,
            CecKey::Stop | CecKey::Exit => Action::Quit,
            CecKey::Other(_) => return None,
        })
    }
}
