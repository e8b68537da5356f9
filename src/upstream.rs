//! Handling of packets coming from the game client.

use crate::{
    error::SwitchError,
    handler::{PacketAction, PacketHandler},
    protocol::packet::{
        client::{self, PlayerAction, ResourcePackResponseStatus},
        server,
    },
    server_info::ServerInfo,
    session::PlayerSession,
    translation::TranslationContainer,
};
use std::sync::Arc;

const SERVER_COMMAND: &str = "/server";

pub struct UpstreamHandler {
    session: Arc<PlayerSession>,
}

impl UpstreamHandler {
    pub fn new(session: Arc<PlayerSession>) -> Self {
        Self { session }
    }

    /// The client runs the pack negotiation against the proxy itself;
    /// once it completes, the player joins the default server.
    fn on_resource_pack_response(&self, status: ResourcePackResponseStatus) {
        match status {
            ResourcePackResponseStatus::HaveAllPacks | ResourcePackResponseStatus::SendPacks => {
                self.session
                    .upstream()
                    .send_packet(server::ResourcePackStack::empty());
            }
            ResourcePackResponseStatus::Completed => self.join_default_server(),
            ResourcePackResponseStatus::Refused => {
                self.session.disconnect("Resource packs are required");
            }
        }
    }

    fn join_default_server(&self) {
        let Some(server) = self.session.context().servers.default_server().cloned() else {
            tracing::warn!("No default server configured");
            self.session.disconnect("No server available");
            return;
        };
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            if let Err(e) = session.connect(server.clone()).await {
                tracing::warn!(player = %session.login().username, "Initial connection failed: {e}");
                let message = session.context().translator.translate(&e.translation(&server.name));
                session.disconnect(&message);
            }
        });
    }

    /// Handles `/server [name]`.
    fn on_server_command(&self, args: &str) {
        let name = args.trim();
        if name.is_empty() {
            let names: Vec<&str> = self
                .session
                .context()
                .servers
                .iter()
                .map(|server| server.name.as_str())
                .collect();
            self.session.send_message(
                &TranslationContainer::new("command.server.usage").with_param(names.join(", ")),
            );
            return;
        }

        let Some(server) = self.session.context().servers.get(name).cloned() else {
            let error = SwitchError::UnknownServer(name.to_owned());
            self.session.send_message(&error.translation(name));
            return;
        };
        self.switch_to(server);
    }

    fn switch_to(&self, server: ServerInfo) {
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            if let Err(e) = session.connect(server.clone()).await {
                tracing::debug!(player = %session.login().username, "Switch refused: {e}");
                session.send_message(&e.translation(&server.name));
            }
        });
    }

    async fn rewrite_runtime_id(&self, runtime_entity_id: &mut u64) {
        let state = self.session.state().await;
        *runtime_entity_id = state.rewrite.translate_runtime_id(*runtime_entity_id);
    }
}

impl PacketHandler<client::Packet> for UpstreamHandler {
    async fn handle(&mut self, packet: &mut client::Packet) -> PacketAction {
        match packet {
            client::Packet::ResourcePackClientResponse(response) => {
                self.on_resource_pack_response(response.status);
                PacketAction::Handled
            }
            client::Packet::Login(_) | client::Packet::ClientToServerHandshake(_) => {
                tracing::debug!(player = %self.session.login().username, "Ignoring repeated login packet");
                PacketAction::Handled
            }
            client::Packet::PlayerAction(action)
                if action.action == PlayerAction::DIMENSION_CHANGE_SUCCESS =>
            {
                let result = self.session.on_dimension_change_success().await;
                if result == PacketAction::Forward {
                    self.rewrite_runtime_id(&mut action.runtime_entity_id).await;
                }
                result
            }
            client::Packet::PlayerAction(action) => {
                self.rewrite_runtime_id(&mut action.runtime_entity_id).await;
                PacketAction::Forward
            }
            client::Packet::MovePlayer(movement) => {
                self.rewrite_runtime_id(&mut movement.runtime_entity_id).await;
                PacketAction::Forward
            }
            client::Packet::CommandRequest(request) => {
                match request.command.strip_prefix(SERVER_COMMAND) {
                    Some(args) if args.is_empty() || args.starts_with(' ') => {
                        self.on_server_command(args);
                        PacketAction::Handled
                    }
                    _ => PacketAction::Forward,
                }
            }
            _ => PacketAction::Forward,
        }
    }
}

/// Drives the client link until the client goes away.
pub async fn run(session: Arc<PlayerSession>) {
    let mut handler = UpstreamHandler::new(Arc::clone(&session));
    loop {
        match session.upstream().recv_packet().await {
            Ok(Some(mut packet)) => {
                if handler.handle(&mut packet).await == PacketAction::Forward {
                    session.send_to_backend(packet).await;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(player = %session.login().username, "Client link failed: {e:#}");
                break;
            }
        }
    }
    session.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entity_id::EntityId, position::BlockPosition, testing};

    #[tokio::test]
    async fn server_command_without_name_lists_servers() {
        let ctx = testing::context();
        let (session, client) = testing::session(&ctx);
        let mut handler = UpstreamHandler::new(session);

        let mut command = client::Packet::from(client::CommandRequest {
            command: "/server".into(),
            ignored_data: Vec::new(),
        });
        assert_eq!(handler.handle(&mut command).await, PacketAction::Handled);
        let Some(server::Packet::Text(text)) = client.recv().await else {
            panic!("expected usage message");
        };
        let message = text.raw_message().unwrap();
        assert!(message.contains("lobby"), "{message}");
    }

    #[tokio::test]
    async fn unrelated_commands_reach_the_backend() {
        let ctx = testing::context();
        let (session, _client) = testing::session(&ctx);
        let mut handler = UpstreamHandler::new(session);
        let mut command = client::Packet::from(client::CommandRequest {
            command: "/serverinfo".into(),
            ignored_data: Vec::new(),
        });
        assert_eq!(handler.handle(&mut command).await, PacketAction::Forward);
    }

    #[tokio::test]
    async fn client_runtime_id_is_mapped_to_backend_id() {
        let ctx = testing::context();
        let (session, _client) = testing::session(&ctx);
        {
            let mut state = session.state().await;
            state.rewrite.entity_id = EntityId::new(1);
            state.rewrite.original_entity_id = EntityId::new(42);
        }
        let mut handler = UpstreamHandler::new(Arc::clone(&session));
        let mut action = client::Packet::from(client::PlayerAction {
            runtime_entity_id: 1,
            action: 5,
            block_position: BlockPosition::default(),
            face: 0,
        });
        assert_eq!(handler.handle(&mut action).await, PacketAction::Forward);
        let client::Packet::PlayerAction(action) = action else {
            unreachable!()
        };
        assert_eq!(action.runtime_entity_id, 42);
    }
}
