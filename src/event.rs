use crate::server_info::ServerInfo;
use uuid::Uuid;

/// Notifications published on the proxy's event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// A player finished moving to `server`.
    TransferComplete {
        player: String,
        uuid: Uuid,
        server: ServerInfo,
    },
    PlayerDisconnected {
        player: String,
        uuid: Uuid,
    },
}
