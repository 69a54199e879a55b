use std::sync::OnceLock;

use log::LevelFilter;
use tokio::runtime::Runtime;

pub mod channel;
pub mod discovery;
pub mod error;
pub mod http_client;
pub mod http_server;
pub mod net;

pub fn runtime() -> std::io::Result<&'static Runtime> {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    if let Some(rt) = RUNTIME.get() {
        return Ok(rt);
    }
    let rt = Runtime::new()?;
    Ok(RUNTIME.get_or_init(|| rt))
}

pub fn default_log_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Level for the crate filters of a binary, honoring its `--quiet` flag.
pub fn log_level(quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Warn
    } else {
        default_log_level()
    }
}
