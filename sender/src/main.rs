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

use anyhow::{bail, Result};
use cast_lib::models::HostTarget;
use clap::Parser;
use common::discovery::{self, FIND_TIMEOUT};
use log::{debug, error, info};
use sender::config::SenderConfig;
use sender::media::{FsProbe, MediaProbe};
use sender::media_server::ActiveMedia;
use sender::playlist::Playlist;
use sender::server::Dispatcher;
use sender::session::{CastSession, SessionFlow};
use sender::Event;
use tokio::sync::{mpsc, watch};

async fn run(config: SenderConfig) -> Result<()> {
    let playlist = Playlist::new(config.items);
    if !playlist.items().iter().any(|item| FsProbe.exists(item)) {
        bail!("None of the given media items exist");
    }

    if config.name.is_empty() {
        info!("Searching for receivers...");
    } else {
        info!("Searching for {}...", config.name);
    }
    let device = discovery::find(&config.name, FIND_TIMEOUT).await?;
    info!("Found {} at {}:{}", device.name, device.ip, device.port);

    let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);
    let (media_tx, media_rx) = watch::channel(ActiveMedia::default());

    let dispatcher = Dispatcher::bind(config.port, event_tx.clone(), media_rx).await?;
    let port = dispatcher.local_addr()?.port();
    tokio::spawn(async move {
        if let Err(err) = dispatcher.run().await {
            error!("Server failed: {err}");
        }
    });

    let local = common::net::local_address_for(&device.ip);
    debug!("Serving on {local}:{port}");

    info!("Connecting to {}...", device.name);
    common::http_client::post_json(
        format!("{}/api/connect", device.target().to_url()),
        HostTarget::new(local.to_string(), port),
    )
    .await?;

    let mut session = CastSession::new(playlist, FsProbe, media_tx).with_subs(config.subs);

    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Got interrupt");
                let _ = event_tx.send(Event::Quit).await;
            }
        });
    }

    while let Some(event) = event_rx.recv().await {
        match session.handle(event).await {
            SessionFlow::Continue => (),
            SessionFlow::Finished => break,
            SessionFlow::Failed(err) => return Err(err),
        }
    }

    info!("Castbeam sender closed");

    Ok(())
}

fn main() -> Result<()> {
    let config = SenderConfig::parse();

    env_logger::Builder::from_default_env()
        .filter_module("sender", common::log_level(config.quiet))
        .filter_module("common", common::log_level(config.quiet))
        .init();

    common::runtime()?.block_on(run(config))
}
