use thiserror::Error;

/// Failures that end or degrade a cast session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CastError {
    #[error("receiver \"{name}\" was not found on the network")]
    DiscoveryTimeout { name: String },
    #[error("name \"{0}\" is already used on another device")]
    NameConflict(String),
    #[error("could not load media: {0}")]
    Load(String),
    #[error("could not restart the player: {0}")]
    Restart(String),
    #[error("player action failed: {0}")]
    Action(String),
    #[error("HDMI-CEC is not supported")]
    CecUnavailable,
    #[error("host {0} is unreachable")]
    HostUnreachable(String),
}

impl CastError {
    /// Whether the error ends the session it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CastError::DiscoveryTimeout { .. } | CastError::NameConflict(_) | CastError::Restart(_)
        )
    }
}
