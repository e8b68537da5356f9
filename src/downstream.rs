//! Handling of packets coming from backends.
//!
//! A backend link is first driven by the [`SwitchHandler`] until its
//! negotiation is done, then by the [`ConnectedHandler`] for play.

use crate::{
    connection::BackendConnection,
    error::SwitchError,
    handler::{PacketAction, PacketHandler},
    session::PlayerSession,
};
use connected::ConnectedHandler;
use std::sync::Arc;
use switch::{NegotiationState, SwitchHandler, SwitchMode};
use tokio::time::timeout;

pub mod connected;
pub mod switch;

/// Drives one backend link for its whole lifetime.
pub async fn run(session: Arc<PlayerSession>, backend: BackendConnection, mode: SwitchMode) {
    let mut switch = SwitchHandler::new(Arc::clone(&session), backend.clone(), mode);
    let negotiation_timeout = session.context().negotiation_timeout;
    match timeout(negotiation_timeout, negotiate(&mut switch)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => switch.fail(e).await,
        Err(_) => switch.fail(SwitchError::TimedOut).await,
    }
    if switch.state() != NegotiationState::Done {
        return;
    }

    let mut connected = ConnectedHandler::new(Arc::clone(&session), backend.clone());
    loop {
        match backend.connection.recv_packet().await {
            Ok(Some(mut packet)) => {
                if connected.handle(&mut packet).await == PacketAction::Forward {
                    session.upstream().send_packet(packet);
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(server = %backend.server.name, "Backend link failed: {e:#}");
                break;
            }
        }
    }
    session.on_backend_closed(&backend).await;
}

/// Feeds packets to the switch handler until it reaches a final state.
async fn negotiate(switch: &mut SwitchHandler) -> Result<(), SwitchError> {
    loop {
        let mut packet = switch
            .backend()
            .connection
            .recv_packet()
            .await?
            .ok_or_else(|| SwitchError::Disconnected("connection closed".to_owned()))?;

        if switch.handle(&mut packet).await == PacketAction::Forward {
            switch.session().upstream().send_packet(packet);
        }
        if switch.state().is_final() {
            return Ok(());
        }
    }
}
