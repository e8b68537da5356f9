use crate::{
    crypto::KeyExchangeError, protocol::packet::server::PlayStatus,
    translation::TranslationContainer,
};

/// Why a switch to a backend failed or could not start.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("already connected to {0}")]
    AlreadyConnected(String),
    #[error("another transfer is in progress")]
    TransferInProgress,
    #[error("unknown server '{0}'")]
    UnknownServer(String),
    #[error("failed to connect: {0}")]
    Connect(#[from] std::io::Error),
    #[error("encryption handshake failed: {0}")]
    KeyExchange(#[from] KeyExchangeError),
    #[error("login rejected with status {0:?}")]
    LoginRejected(PlayStatus),
    #[error("disconnected by backend: {0}")]
    Disconnected(String),
    #[error("negotiation timed out")]
    TimedOut,
    #[error("no transfer is pending")]
    NoPendingTransfer,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SwitchError {
    /// Message shown to the player when a switch to `server` fails this way.
    pub fn translation(&self, server: &str) -> TranslationContainer {
        let message = match self {
            SwitchError::AlreadyConnected(_) => "transfer.already_connected",
            SwitchError::TransferInProgress => {
                return TranslationContainer::new("transfer.in_progress")
            }
            SwitchError::UnknownServer(name) => {
                return TranslationContainer::new("command.server.unknown").with_param(name)
            }
            SwitchError::KeyExchange(_) => "transfer.encryption_failed",
            SwitchError::LoginRejected(PlayStatus::FailedClient) => "transfer.outdated_client",
            SwitchError::LoginRejected(PlayStatus::FailedServer) => "transfer.outdated_server",
            SwitchError::LoginRejected(PlayStatus::FailedServerFull) => "transfer.server_full",
            SwitchError::LoginRejected(_) => "transfer.rejected",
            SwitchError::TimedOut => "transfer.timed_out",
            SwitchError::Disconnected(reason) => {
                return TranslationContainer::new("transfer.failed")
                    .with_param(server)
                    .with_param(reason)
            }
            SwitchError::Connect(_) | SwitchError::NoPendingTransfer | SwitchError::Other(_) => {
                return TranslationContainer::new("transfer.failed")
                    .with_param(server)
                    .with_param(self.to_string())
            }
        };
        TranslationContainer::new(message).with_param(server)
    }
}
