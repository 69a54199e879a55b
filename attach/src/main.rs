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

use anyhow::Result;
use attach::config::AttachConfig;
use attach::{sender_target, AttachFlow, AttachSession, Event};
use cast_lib::models::AttachInfo;
use clap::Parser;
use common::channel::ChannelClient;
use common::discovery::{self, FIND_TIMEOUT};
use log::{debug, info};
use tokio::sync::mpsc;

async fn run(config: AttachConfig) -> Result<()> {
    let device = discovery::find(&config.name, FIND_TIMEOUT).await?;
    info!("Found {} at {}:{}", device.name, device.ip, device.port);

    let info: AttachInfo =
        common::http_client::get_json(format!("{}/api/attach", device.target().to_url())).await?;
    let target = sender_target(&device.name, &info)?;

    let (event_tx, mut event_rx) = mpsc::channel::<Event>(100);
    let mut session = AttachSession::new(ChannelClient::spawn(target, false, event_tx.clone()));
    if let Some(signal) = config.signal() {
        session = session.with_signal(signal);
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Got interrupt");
            let _ = event_tx.send(Event::Quit).await;
        }
    });

    let result = loop {
        let Some(event) = event_rx.recv().await else {
            break Ok(());
        };
        match session.handle(event).await {
            Ok(AttachFlow::Continue) => (),
            Ok(AttachFlow::Done) => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    session.close().await;

    result
}

fn main() -> Result<()> {
    let config = AttachConfig::parse();

    env_logger::Builder::from_default_env()
        .filter_module("attach", common::log_level(config.quiet))
        .filter_module("common", common::log_level(config.quiet))
        .init();

    common::runtime()?.block_on(run(config))
}
