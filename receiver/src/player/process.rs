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

//! Player child process supervision shared by the adapters.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::net::UnixStream;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

use super::{PlayerError, PlayerEvent};

const SOCKET_WAIT: Duration = Duration::from_secs(10);
const SOCKET_POLL: Duration = Duration::from_millis(100);

/// Polls `ipc_path` until the freshly spawned player accepts a connection.
pub(super) async fn wait_for_socket(
    executable: &str,
    ipc_path: &Path,
    child: &mut Child,
) -> Result<UnixStream, PlayerError> {
    let deadline = tokio::time::Instant::now() + SOCKET_WAIT;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Err(PlayerError::Launch(format!(
                    "{executable} exited early ({status})"
                )))
            }
            Ok(None) => (),
            Err(err) => return Err(PlayerError::Launch(err.to_string())),
        }

        if let Ok(stream) = UnixStream::connect(ipc_path).await {
            return Ok(stream);
        }

        if tokio::time::Instant::now() >= deadline {
            let _ = child.start_kill();
            return Err(PlayerError::Launch(format!(
                "no IPC socket at {}",
                ipc_path.display()
            )));
        }

        tokio::time::sleep(SOCKET_POLL).await;
    }
}

/// Liveness of a watched player process.
pub(super) struct ProcessHandle {
    running: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Waits on `child` in the background and reports its exit as
    /// [`PlayerEvent::Exited`].
    pub(super) fn watch(child: Child, event_tx: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(watch_process(
            child,
            kill_rx,
            Arc::clone(&running),
            event_tx,
        ));

        Self {
            running,
            kill_tx: Some(kill_tx),
        }
    }

    pub(super) fn is_alive(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(super) fn kill(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
    }
}

async fn watch_process(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    running: Arc<AtomicBool>,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => {
            if let Err(err) = child.start_kill() {
                warn!("Failed to kill player: {err}");
            }
            child.wait().await
        }
    };

    running.store(false, Ordering::SeqCst);

    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!("Failed to get player exit status: {err}");
            None
        }
    };

    debug!("Player exited code={code:?}");
    let _ = event_tx.send(PlayerEvent::Exited(code));
}
