use crate::models::{
    AttachConnectMessage, CastMessage, ControlCommand, Header, InvalidMessage, Opcode,
    RemoteSignal, SessionStatus,
};
use crate::MAX_BODY_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    None,
    Connect(String),
    Invalid(InvalidMessage),
    Cast(CastMessage),
    StatusUpdate(SessionStatus),
    RemoteSignal(RemoteSignal),
    Control(ControlCommand),
    ShowRemote(bool),
    CastError(String),
    AttachRequest,
    AttachRemote(RemoteSignal),
    AttachConnect(AttachConnectMessage),
    AttachStatus(SessionStatus),
    AttachShow(bool),
    Ping,
    Pong,
}

#[derive(Debug)]
pub enum PacketError {
    Json(serde_json::Error),
    BodyTooLarge(usize),
}

impl std::fmt::Display for PacketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketError::Json(err) => write!(f, "invalid packet body: {err}"),
            PacketError::BodyTooLarge(size) => {
                write!(f, "body size ({size}) exceeds MAX_BODY_SIZE ({MAX_BODY_SIZE})")
            }
        }
    }
}

impl std::error::Error for PacketError {}

impl From<serde_json::Error> for PacketError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<&Packet> for Opcode {
    fn from(value: &Packet) -> Self {
        match value {
            Packet::None => Opcode::None,
            Packet::Connect(_) => Opcode::Connect,
            Packet::Invalid(_) => Opcode::Invalid,
            Packet::Cast(_) => Opcode::Cast,
            Packet::StatusUpdate(_) => Opcode::StatusUpdate,
            Packet::RemoteSignal(_) => Opcode::RemoteSignal,
            Packet::Control(_) => Opcode::Control,
            Packet::ShowRemote(_) => Opcode::ShowRemote,
            Packet::CastError(_) => Opcode::CastError,
            Packet::AttachRequest => Opcode::AttachRequest,
            Packet::AttachRemote(_) => Opcode::AttachRemote,
            Packet::AttachConnect(_) => Opcode::AttachConnect,
            Packet::AttachStatus(_) => Opcode::AttachStatus,
            Packet::AttachShow(_) => Opcode::AttachShow,
            Packet::Ping => Opcode::Ping,
            Packet::Pong => Opcode::Pong,
        }
    }
}

impl From<CastMessage> for Packet {
    fn from(value: CastMessage) -> Self {
        Self::Cast(value)
    }
}

impl From<SessionStatus> for Packet {
    fn from(value: SessionStatus) -> Self {
        Self::StatusUpdate(value)
    }
}

impl From<RemoteSignal> for Packet {
    fn from(value: RemoteSignal) -> Self {
        Self::RemoteSignal(value)
    }
}

impl From<ControlCommand> for Packet {
    fn from(value: ControlCommand) -> Self {
        Self::Control(value)
    }
}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        self.into()
    }

    pub fn decode(header: Header, body: &str) -> Result<Self, serde_json::Error> {
        Ok(match header.opcode {
            Opcode::None => Self::None,
            Opcode::Connect => Self::Connect(serde_json::from_str(body)?),
            Opcode::Invalid => Self::Invalid(serde_json::from_str(body)?),
            Opcode::Cast => Self::Cast(serde_json::from_str(body)?),
            Opcode::StatusUpdate => Self::StatusUpdate(serde_json::from_str(body)?),
            Opcode::RemoteSignal => Self::RemoteSignal(serde_json::from_str(body)?),
            Opcode::Control => Self::Control(serde_json::from_str(body)?),
            Opcode::ShowRemote => Self::ShowRemote(serde_json::from_str(body)?),
            Opcode::CastError => Self::CastError(serde_json::from_str(body)?),
            Opcode::AttachRequest => Self::AttachRequest,
            Opcode::AttachRemote => Self::AttachRemote(serde_json::from_str(body)?),
            Opcode::AttachConnect => Self::AttachConnect(serde_json::from_str(body)?),
            Opcode::AttachStatus => Self::AttachStatus(serde_json::from_str(body)?),
            Opcode::AttachShow => Self::AttachShow(serde_json::from_str(body)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
        })
    }

    fn body(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Packet::Connect(name) => serde_json::to_vec(name),
            Packet::Invalid(invalid) => serde_json::to_vec(invalid),
            Packet::Cast(cast) => serde_json::to_vec(cast),
            Packet::StatusUpdate(status) | Packet::AttachStatus(status) => {
                serde_json::to_vec(status)
            }
            Packet::RemoteSignal(signal) | Packet::AttachRemote(signal) => {
                serde_json::to_vec(signal)
            }
            Packet::Control(cmd) => serde_json::to_vec(cmd),
            Packet::ShowRemote(show) | Packet::AttachShow(show) => serde_json::to_vec(show),
            Packet::CastError(message) => serde_json::to_vec(message),
            Packet::AttachConnect(msg) => serde_json::to_vec(msg),
            Packet::None | Packet::AttachRequest | Packet::Ping | Packet::Pong => Ok(Vec::new()),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let body = self.body()?;

        if body.len() > MAX_BODY_SIZE as usize {
            return Err(PacketError::BodyTooLarge(body.len()));
        }

        let header = Header::new(self.opcode(), body.len() as u32).encode();
        let mut pack = header.to_vec();
        pack.extend_from_slice(&body);
        Ok(pack)
    }
}
