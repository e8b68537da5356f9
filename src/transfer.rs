//! Finalizes a switch: the negotiated backend replaces the active one.

use crate::{
    connection::BackendConnection,
    error::SwitchError,
    event::ProxyEvent,
    rewrite::BackendRewrite,
    server_info::ServerInfo,
    session::{Connections, PlayerSession},
};

/// Single-use token that promotes a negotiated connection.
///
/// Attached to the player's rewrite data once a backend's world has been
/// presented to the client, and consumed by [`PlayerSession::complete_transfer`].
#[derive(Debug)]
pub struct TransferCallback {
    connection: BackendConnection,
    /// Rewrite state of the backend being left.
    previous: BackendRewrite,
}

impl TransferCallback {
    pub fn new(connection: BackendConnection, previous: BackendRewrite) -> Self {
        Self {
            connection,
            previous,
        }
    }

    /// Gives up the transfer, returning the rewrite state to restore.
    pub fn into_previous(self) -> BackendRewrite {
        self.previous
    }

    pub fn server(&self) -> &ServerInfo {
        &self.connection.server
    }

    pub fn connection(&self) -> &BackendConnection {
        &self.connection
    }

    /// Swaps the pending connection in as active and hands back the
    /// connection it replaced.
    fn on_transfer_accepted(
        self,
        connections: &mut Connections,
    ) -> Result<Option<BackendConnection>, SwitchError> {
        match connections.pending.take() {
            Some(pending) if pending.same_link(&self.connection) => {}
            other => {
                connections.pending = other;
                return Err(SwitchError::NoPendingTransfer);
            }
        }
        Ok(connections.active.replace(self.connection))
    }
}

impl PlayerSession {
    /// Makes the negotiated backend the player's active one and closes the
    /// previous backend.
    ///
    /// The callback is consumed on the first call; later calls fail with
    /// [`SwitchError::NoPendingTransfer`].
    pub async fn complete_transfer(&self) -> Result<ServerInfo, SwitchError> {
        let mut state = self.state().await;
        let callback = state
            .rewrite
            .take_transfer_callback()
            .ok_or(SwitchError::NoPendingTransfer)?;
        let server = callback.server().clone();
        let previous = callback.on_transfer_accepted(&mut state.connections)?;
        drop(state);

        if let Some(previous) = previous {
            tracing::debug!(server = %previous.server.name, "Closing previous backend");
            previous.close();
        }

        tracing::info!(
            player = %self.login().username,
            server = %server.name,
            "Transfer complete"
        );
        self.emit(ProxyEvent::TransferComplete {
            player: self.login().username.clone(),
            uuid: self.login().uuid,
            server: server.clone(),
        });
        Ok(server)
    }
}
