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

use std::path::PathBuf;

use clap::Parser;

fn parse_item(item: &str) -> Result<String, String> {
    if item.trim().is_empty() {
        return Err("media item must not be empty".to_owned());
    }
    Ok(item.to_owned())
}

/// Casts local files and URLs to a Castbeam receiver.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct SenderConfig {
    /// Files or URLs to play, in order
    #[arg(required = true, num_args = 1.., value_parser = parse_item)]
    pub items: Vec<String>,

    /// Receiver to cast to (the first one found when empty)
    #[arg(short, long, default_value = "")]
    pub name: String,

    /// Port serving the media and control channel
    #[arg(short, long, default_value_t = 9880, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// External subtitles for the first item
    #[arg(short, long)]
    pub subs: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}
