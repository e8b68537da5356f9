//! Negotiation with a backend the player is moving to.
//!
//! Every negotiation packet is consumed here and never reaches the client.
//! The world of the new backend is presented through injected packets;
//! only on the player's initial connection is the backend's start-game
//! passed through as is.

use crate::{
    connection::BackendConnection,
    crypto,
    entity_id::EntityId,
    error::SwitchError,
    handler::{PacketAction, PacketHandler},
    injection,
    protocol::packet::{
        client::{self, ResourcePackClientResponse, ResourcePackResponseStatus},
        server::{self, PlayStatus, ServerToClientHandshake, StartGame},
    },
    session::{DimensionChange, PlayerSession},
    transfer::TransferCallback,
};
use std::sync::Arc;

/// Which packet the negotiation expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NegotiationState {
    AwaitServerHandshake,
    AwaitResourcePacksInfo,
    AwaitResourcePackStack,
    AwaitLoginStatus,
    AwaitStartGame,
    Done,
    Failed,
}

impl NegotiationState {
    fn next(self) -> Self {
        match self {
            NegotiationState::AwaitServerHandshake => NegotiationState::AwaitResourcePacksInfo,
            NegotiationState::AwaitResourcePacksInfo => NegotiationState::AwaitResourcePackStack,
            NegotiationState::AwaitResourcePackStack => NegotiationState::AwaitLoginStatus,
            NegotiationState::AwaitLoginStatus => NegotiationState::AwaitStartGame,
            NegotiationState::AwaitStartGame | NegotiationState::Done => NegotiationState::Done,
            NegotiationState::Failed => NegotiationState::Failed,
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, NegotiationState::Done | NegotiationState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchMode {
    /// The player has no backend yet; the first start-game becomes the
    /// client's baseline.
    Initial,
    /// The player moves away from an active backend.
    Transfer,
}

pub struct SwitchHandler {
    session: Arc<PlayerSession>,
    backend: BackendConnection,
    mode: SwitchMode,
    state: NegotiationState,
}

impl SwitchHandler {
    pub fn new(session: Arc<PlayerSession>, backend: BackendConnection, mode: SwitchMode) -> Self {
        Self {
            session,
            backend,
            mode,
            state: NegotiationState::AwaitServerHandshake,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn session(&self) -> &Arc<PlayerSession> {
        &self.session
    }

    pub fn backend(&self) -> &BackendConnection {
        &self.backend
    }

    /// Records that the packet expected in `handled` was processed.
    ///
    /// Backends differ in the order they send login status and resource
    /// packs, so a packet arriving early is accepted and never moves
    /// the negotiation backwards.
    fn advance(&mut self, handled: NegotiationState) {
        if handled != self.state {
            tracing::debug!(
                server = %self.backend.server.name,
                expected = ?self.state,
                received = ?handled,
                "Negotiation packet out of order"
            );
        }
        self.state = self.state.max(handled.next());
    }

    /// Aborts the negotiation. The backend link is closed and the
    /// player told why; later calls do nothing.
    pub async fn fail(&mut self, error: SwitchError) {
        if self.state == NegotiationState::Failed {
            return;
        }
        tracing::warn!(
            player = %self.session.login().username,
            server = %self.backend.server.name,
            "Transfer failed: {error}"
        );
        self.state = NegotiationState::Failed;
        self.backend.close();
        self.session.abort_switch(&self.backend, &error).await;
    }

    fn on_server_handshake(
        &mut self,
        handshake: &ServerToClientHandshake,
    ) -> Result<PacketAction, SwitchError> {
        let (server_key, salt) = crypto::parse_handshake_token(&handshake.token)?;
        let key = crypto::derive_shared_key(self.session.login().key_pair(), &server_key, &salt);

        let connection = &self.backend.connection;
        connection.enable_encryption(key);
        connection.send_packet(client::ClientToServerHandshake {});
        tracing::debug!(server = %self.backend.server.name, "Enabled encryption");

        self.advance(NegotiationState::AwaitServerHandshake);
        Ok(PacketAction::Handled)
    }

    fn on_resource_packs_info(&mut self) -> PacketAction {
        self.backend
            .connection
            .send_packet(ResourcePackClientResponse::new(
                ResourcePackResponseStatus::HaveAllPacks,
            ));
        self.advance(NegotiationState::AwaitResourcePacksInfo);
        PacketAction::Handled
    }

    fn on_resource_pack_stack(&mut self) -> PacketAction {
        self.backend
            .connection
            .send_packet(ResourcePackClientResponse::new(
                ResourcePackResponseStatus::Completed,
            ));
        self.advance(NegotiationState::AwaitResourcePackStack);
        PacketAction::Handled
    }

    fn on_play_status(&mut self, status: PlayStatus) -> Result<PacketAction, SwitchError> {
        match status {
            PlayStatus::LoginSuccess => {
                self.advance(NegotiationState::AwaitLoginStatus);
                Ok(PacketAction::Handled)
            }
            PlayStatus::PlayerSpawn => Ok(PacketAction::Handled),
            failure => Err(SwitchError::LoginRejected(failure)),
        }
    }

    async fn on_start_game(&mut self, start_game: &StartGame) -> Result<PacketAction, SwitchError> {
        let action = match self.mode {
            SwitchMode::Initial => {
                self.start_initial_game(start_game).await?;
                PacketAction::Forward
            }
            SwitchMode::Transfer => {
                self.present_new_world(start_game).await?;
                PacketAction::Handled
            }
        };
        self.advance(NegotiationState::AwaitStartGame);
        Ok(action)
    }

    /// Takes the first backend's world as the client's baseline and
    /// promotes the connection right away.
    async fn start_initial_game(&self, start_game: &StartGame) -> Result<(), SwitchError> {
        let protocol = self.session.login().protocol;
        let palette = self
            .session
            .context()
            .palettes
            .resolve(&start_game.block_palette, protocol);

        let mut state = self.session.state().await;
        if !state.connections.is_pending(&self.backend) {
            return Err(SwitchError::NoPendingTransfer);
        }
        state.rewrite.set_baseline(start_game, palette);
        state.connections.active = state.connections.pending.take();

        tracing::info!(
            player = %self.session.login().username,
            server = %self.backend.server.name,
            "Joined initial backend"
        );
        Ok(())
    }

    /// Replaces the client's world with the backend's, leaving the
    /// connection pending until the client has changed dimension.
    async fn present_new_world(&self, start_game: &StartGame) -> Result<(), SwitchError> {
        let protocol = self.session.login().protocol;
        let upstream = self.session.upstream();
        let mut state = self.session.state().await;
        if !state.connections.is_pending(&self.backend) {
            return Err(SwitchError::NoPendingTransfer);
        }

        let previous = state.rewrite.backend_rewrite();
        let rewrite = &mut state.rewrite;
        rewrite.original_entity_id = EntityId::from_runtime(start_game.runtime_entity_id);
        rewrite.game_rules = start_game.game_rules.clone();
        rewrite.spawn_position = start_game.player_position;
        rewrite.rotation = start_game.rotation;
        rewrite.parse_item_ids(&start_game.item_entries);
        if protocol.has_block_palette() {
            let palette = self
                .session
                .context()
                .palettes
                .resolve(&start_game.block_palette, protocol);
            rewrite.apply_block_palette(&palette);
        } else {
            rewrite.block_properties = start_game.block_properties.clone();
        }

        let visible = state.drain_visible_state();
        injection::remove_all_players(upstream, &visible.players);
        for &entity_id in &visible.entities {
            injection::remove_entity(upstream, entity_id);
        }
        for objective in &visible.scoreboards {
            injection::remove_objective(upstream, objective);
        }
        for &boss_bar in &visible.boss_bars {
            injection::remove_boss_bar(upstream, boss_bar);
        }

        let rewrite = &mut state.rewrite;
        injection::game_mode(upstream, start_game.player_game_type);
        injection::remove_all_effects(upstream, rewrite.entity_id);
        injection::clear_weather(upstream);
        injection::game_rules(upstream, &rewrite.game_rules);
        injection::set_difficulty(upstream, start_game.difficulty);

        let transient = injection::determine_dimension_id(rewrite.dimension, start_game.dimension);
        injection::dimension_change(
            upstream,
            transient,
            start_game.player_position,
            rewrite.chunk_radius,
        );
        rewrite.dimension = transient;
        rewrite.set_transfer_callback(TransferCallback::new(self.backend.clone(), previous));
        state.dimension_change = DimensionChange::AwaitingFirstAck {
            dimension: start_game.dimension,
            position: start_game.player_position,
        };

        tracing::debug!(
            player = %self.session.login().username,
            server = %self.backend.server.name,
            transient,
            target = start_game.dimension,
            "Presented new world"
        );
        Ok(())
    }
}

impl PacketHandler<server::Packet> for SwitchHandler {
    async fn handle(&mut self, packet: &mut server::Packet) -> PacketAction {
        if self.state.is_final() {
            return PacketAction::Handled;
        }

        let result = match packet {
            server::Packet::ServerToClientHandshake(handshake) => {
                self.on_server_handshake(handshake)
            }
            server::Packet::ResourcePacksInfo(_) => Ok(self.on_resource_packs_info()),
            server::Packet::ResourcePackStack(_) => Ok(self.on_resource_pack_stack()),
            server::Packet::PlayStatus(status) => self.on_play_status(*status),
            server::Packet::StartGame(start_game) => self.on_start_game(start_game).await,
            server::Packet::Disconnect(disconnect) => {
                Err(SwitchError::Disconnected(disconnect.message.clone()))
            }
            other => {
                let name: &str = other.as_ref();
                tracing::trace!("Dropping {name} during negotiation");
                Ok(PacketAction::Handled)
            }
        };

        match result {
            Ok(action) => action,
            Err(e) => {
                self.fail(e).await;
                PacketAction::Handled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::ProxyEvent,
        protocol::packet::server::{BossEvent, Packet},
        testing,
    };

    #[test]
    fn early_packets_never_move_negotiation_backwards() {
        let mut state = NegotiationState::AwaitServerHandshake;
        for handled in [
            NegotiationState::AwaitServerHandshake,
            NegotiationState::AwaitLoginStatus,
            NegotiationState::AwaitResourcePacksInfo,
        ] {
            state = state.max(handled.next());
        }
        assert_eq!(state, NegotiationState::AwaitStartGame);
        assert!(!state.is_final());
        assert!(NegotiationState::AwaitStartGame.next().is_final());
    }

    /// Joins the lobby as runtime entity 1 in the overworld.
    async fn join_lobby(
        session: &Arc<PlayerSession>,
        client: &testing::ClientPeer,
    ) -> testing::BackendPeer {
        let (lobby, lobby_io, lobby_peer) = testing::backend_io("lobby", 19132);
        session.begin_switch(lobby, lobby_io).await.unwrap();
        lobby_peer.accept_login(testing::start_game(1, 0)).await;
        let Some(Packet::StartGame(start_game)) = client.recv().await else {
            panic!("expected the initial start game to be forwarded");
        };
        assert_eq!(start_game.runtime_entity_id, 1);
        lobby_peer
    }

    /// Receives injections up to and including the first dimension change.
    async fn recv_until_dimension_change(client: &testing::ClientPeer) -> Vec<Packet> {
        let mut packets = Vec::new();
        while !matches!(packets.last(), Some(Packet::ChangeDimension(_))) {
            packets.push(client.recv().await.expect("link closed"));
        }
        packets
    }

    #[tokio::test]
    async fn switch_presents_new_world_then_completes() {
        let ctx = testing::context();
        let mut events = ctx.subscribe();
        let (session, client) = testing::session(&ctx);
        let lobby_peer = join_lobby(&session, &client).await;

        lobby_peer.connection.send_batch(vec![
            server::AddEntity {
                unique_entity_id: 10,
                runtime_entity_id: 10,
                ignored_data: Vec::new(),
            }
            .into(),
            server::SetDisplayObjective {
                display_slot: "sidebar".into(),
                objective_name: "kills".into(),
                ignored_data: Vec::new(),
            }
            .into(),
            server::BossEvent {
                boss_entity_id: 3,
                event_type: BossEvent::SHOW,
                ignored_data: Vec::new(),
            }
            .into(),
        ]);
        client.recv_n(3).await;

        let (survival, survival_io, survival_peer) = testing::backend_io("survival", 19133);
        session.begin_switch(survival, survival_io).await.unwrap();
        survival_peer.accept_login(testing::start_game(77, 0)).await;

        let packets = recv_until_dimension_change(&client).await;
        assert!(matches!(&packets[0], Packet::RemoveEntity(p) if p.unique_entity_id == 10));
        assert!(matches!(&packets[1], Packet::RemoveObjective(p) if p.objective_name == "kills"));
        assert!(matches!(
            &packets[2],
            Packet::BossEvent(p) if p.boss_entity_id == 3 && p.event_type == BossEvent::HIDE
        ));
        assert!(!packets.iter().any(|p| matches!(
            p,
            Packet::StartGame(_) | Packet::ResourcePacksInfo(_) | Packet::PlayStatus(_)
        )));
        assert!(packets.iter().any(|p| matches!(p, Packet::SetDifficulty(_))));
        let Some(Packet::ChangeDimension(change)) = packets.last() else {
            unreachable!()
        };
        assert_ne!(change.dimension, 0);

        {
            let state = session.state().await;
            assert!(matches!(
                state.dimension_change,
                DimensionChange::AwaitingFirstAck { dimension: 0, .. }
            ));
            assert_eq!(state.visible, Default::default());
            assert_eq!(state.rewrite.original_entity_id, EntityId::new(77));
            assert_eq!(state.rewrite.entity_id, EntityId::new(1));
            assert!(state.connections.pending.is_some());
        }

        assert_eq!(
            session.on_dimension_change_success().await,
            PacketAction::Handled
        );
        let Some(Packet::ChangeDimension(change)) = client.recv().await else {
            panic!("expected the real dimension change");
        };
        assert_eq!(change.dimension, 0);
        session.on_dimension_change_success().await;

        let state = session.state().await;
        assert!(state.connections.pending.is_none());
        let active = state.connections.active.as_ref().unwrap();
        assert_eq!(active.server.name, "survival");
        drop(state);

        match events.recv().await.unwrap() {
            ProxyEvent::TransferComplete { server, player, .. } => {
                assert_eq!(server.name, "survival");
                assert_eq!(player, "Steve");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(lobby_peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn backend_disconnect_clears_pending_connection() {
        let ctx = testing::context();
        let mut events = ctx.subscribe();
        let (session, client) = testing::session(&ctx);
        let (lobby, _lobby_peer) = testing::backend("lobby");
        session.state().await.connections.active = Some(lobby);

        let (survival, io, peer) = testing::backend_io("survival", 19133);
        session.begin_switch(survival, io).await.unwrap();
        peer.expect_login().await;
        peer.connection.send_packet(server::Disconnect {
            hide_disconnect_screen: false,
            message: "Server closed".into(),
        });

        let Some(Packet::Text(text)) = client.recv().await else {
            panic!("expected a failure message");
        };
        let message = text.raw_message().unwrap();
        assert!(message.contains("survival") && message.contains("Server closed"));
        assert!(session.state().await.connections.pending.is_none());
        assert!(events.try_recv().is_err());
        assert!(matches!(
            session.complete_transfer().await,
            Err(SwitchError::NoPendingTransfer)
        ));
    }

    #[tokio::test]
    async fn kick_after_presentation_restores_rewrite_and_disconnects() {
        let ctx = testing::context();
        let (session, client) = testing::session(&ctx);
        let _lobby_peer = join_lobby(&session, &client).await;

        let (survival, survival_io, survival_peer) = testing::backend_io("survival", 19133);
        session.begin_switch(survival, survival_io).await.unwrap();
        survival_peer.accept_login(testing::start_game(77, 0)).await;
        recv_until_dimension_change(&client).await;

        survival_peer.connection.send_packet(server::Disconnect {
            hide_disconnect_screen: false,
            message: "Restarting".into(),
        });
        let Some(Packet::Disconnect(disconnect)) = client.recv().await else {
            panic!("expected the player to be disconnected");
        };
        assert!(disconnect.message.contains("survival"));
        assert!(disconnect.message.contains("Restarting"));

        let state = session.state().await;
        assert!(state.connections.pending.is_none());
        assert!(state.rewrite.transfer_callback().is_none());
        assert_eq!(state.dimension_change, DimensionChange::Idle);
        assert_eq!(state.rewrite.dimension, 0);
        assert_eq!(state.rewrite.original_entity_id, EntityId::new(1));
        assert_eq!(state.rewrite.translate_runtime_id(1), 1);
    }

    #[tokio::test]
    async fn malformed_handshake_token_aborts_transfer() {
        let ctx = testing::context();
        let (session, client) = testing::session(&ctx);
        let (lobby, _lobby_peer) = testing::backend("lobby");
        session.state().await.connections.active = Some(lobby);

        let (survival, io, peer) = testing::backend_io("survival", 19133);
        session.begin_switch(survival, io).await.unwrap();
        peer.expect_login().await;
        peer.connection.send_packet(ServerToClientHandshake {
            token: "not.a.token".into(),
        });

        let Some(Packet::Text(text)) = client.recv().await else {
            panic!("expected a failure message");
        };
        let message = text.raw_message().unwrap();
        assert!(message.contains("survival") && message.contains("encryption"), "{message}");
        let state = session.state().await;
        assert!(state.connections.pending.is_none());
        assert_eq!(state.connections.active.as_ref().unwrap().server.name, "lobby");
    }

    #[tokio::test]
    async fn rejected_transfer_login_keeps_player_on_active_backend() {
        let ctx = testing::context();
        let (session, client) = testing::session(&ctx);
        let (lobby, _lobby_peer) = testing::backend("lobby");
        session.state().await.connections.active = Some(lobby);

        let (survival, io, peer) = testing::backend_io("survival", 19133);
        session.begin_switch(survival, io).await.unwrap();
        peer.expect_login().await;
        peer.connection.send_packet(PlayStatus::FailedClient);

        let Some(Packet::Text(text)) = client.recv().await else {
            panic!("expected a chat message rather than a disconnect");
        };
        let message = text.raw_message().unwrap();
        assert!(message.contains("client is outdated"), "{message}");
        let state = session.state().await;
        assert!(state.connections.pending.is_none());
        assert_eq!(state.connections.active.as_ref().unwrap().server.name, "lobby");
    }

    #[tokio::test]
    async fn rejected_initial_login_disconnects_the_player() {
        let ctx = testing::context();
        let (session, client) = testing::session(&ctx);
        let (lobby, io, peer) = testing::backend_io("lobby", 19132);
        session.begin_switch(lobby, io).await.unwrap();
        peer.expect_login().await;
        peer.connection.send_packet(PlayStatus::FailedServerFull);

        let Some(Packet::Disconnect(disconnect)) = client.recv().await else {
            panic!("expected a disconnect");
        };
        assert!(disconnect.message.contains("full"));
        assert!(session.state().await.connections.pending.is_none());
    }

    #[tokio::test]
    async fn second_switch_while_pending_is_refused() {
        let ctx = testing::context();
        let (session, _client) = testing::session(&ctx);
        let (lobby, io, _peer) = testing::backend_io("lobby", 19132);
        session.begin_switch(lobby, io).await.unwrap();

        let (survival, io, _survival_peer) = testing::backend_io("survival", 19133);
        assert!(matches!(
            session.begin_switch(survival, io).await,
            Err(SwitchError::TransferInProgress)
        ));
    }
}
