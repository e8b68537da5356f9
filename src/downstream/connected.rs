//! Play-phase handling of backend packets.

use crate::{
    connection::BackendConnection,
    error::SwitchError,
    handler::{PacketAction, PacketHandler},
    protocol::packet::server::{self, BossEvent, PlayerList},
    session::{PlayerSession, SessionState},
};
use std::sync::Arc;

/// Rewrites IDs in backend packets and tracks what the client can see,
/// so a later switch knows what to clean up.
pub struct ConnectedHandler {
    session: Arc<PlayerSession>,
    backend: BackendConnection,
}

impl ConnectedHandler {
    pub fn new(session: Arc<PlayerSession>, backend: BackendConnection) -> Self {
        Self { session, backend }
    }

    /// A kick from the active backend reaches the client; one from a
    /// backend still waiting to be promoted aborts the switch instead.
    async fn on_disconnect(&self, disconnect: &server::Disconnect) -> PacketAction {
        let state = self.session.state().await;
        let is_active = state.connections.is_active(&self.backend);
        let is_pending = state.connections.is_pending(&self.backend);
        drop(state);

        if is_active {
            tracing::info!(
                player = %self.session.login().username,
                server = %self.backend.server.name,
                reason = %disconnect.message,
                "Kicked by backend"
            );
            return PacketAction::Forward;
        }
        if is_pending {
            self.backend.close();
            let error = SwitchError::Disconnected(disconnect.message.clone());
            self.session.abort_switch(&self.backend, &error).await;
        }
        PacketAction::Handled
    }
}

/// Applies the player's ID translations and records visible state.
fn rewrite(state: &mut SessionState, packet: &mut server::Packet) {
    let rewrite = &mut state.rewrite;
    let visible = &mut state.visible;
    match packet {
        server::Packet::AddPlayer(add) => {
            add.unique_entity_id = rewrite.translate_unique_id(add.unique_entity_id);
            add.runtime_entity_id = rewrite.translate_runtime_id(add.runtime_entity_id);
            visible.players.insert(add.uuid);
            visible.entities.insert(add.unique_entity_id);
        }
        server::Packet::AddEntity(add) => {
            add.unique_entity_id = rewrite.translate_unique_id(add.unique_entity_id);
            add.runtime_entity_id = rewrite.translate_runtime_id(add.runtime_entity_id);
            visible.entities.insert(add.unique_entity_id);
        }
        server::Packet::AddItemEntity(add) => {
            add.unique_entity_id = rewrite.translate_unique_id(add.unique_entity_id);
            add.runtime_entity_id = rewrite.translate_runtime_id(add.runtime_entity_id);
            add.item_id = rewrite.item_rewrite.translate(add.item_id);
            visible.entities.insert(add.unique_entity_id);
        }
        server::Packet::RemoveEntity(remove) => {
            remove.unique_entity_id = rewrite.translate_unique_id(remove.unique_entity_id);
            visible.entities.remove(&remove.unique_entity_id);
        }
        server::Packet::PlayerList(PlayerList::Remove { uuids }) => {
            for uuid in uuids.iter() {
                visible.players.remove(uuid);
            }
        }
        server::Packet::MovePlayer(movement) => {
            movement.runtime_entity_id = rewrite.translate_runtime_id(movement.runtime_entity_id);
        }
        server::Packet::SetEntityData(data) => {
            data.runtime_entity_id = rewrite.translate_runtime_id(data.runtime_entity_id);
        }
        server::Packet::MobEffect(effect) => {
            effect.runtime_entity_id = rewrite.translate_runtime_id(effect.runtime_entity_id);
        }
        server::Packet::UpdateBlock(update) => {
            update.block_runtime_id = rewrite.block_palette_rewrite.translate(update.block_runtime_id);
        }
        server::Packet::SetDisplayObjective(display) => {
            visible.scoreboards.insert(display.objective_name.clone());
        }
        server::Packet::RemoveObjective(remove) => {
            visible.scoreboards.remove(&remove.objective_name);
        }
        server::Packet::BossEvent(event) => match event.event_type {
            BossEvent::SHOW => {
                visible.boss_bars.insert(event.boss_entity_id);
            }
            BossEvent::HIDE => {
                visible.boss_bars.remove(&event.boss_entity_id);
            }
            _ => {}
        },
        server::Packet::ChunkRadiusUpdated(update) => rewrite.chunk_radius = update.radius,
        server::Packet::GameRulesChanged(changed) => rewrite.update_game_rules(&changed.game_rules),
        server::Packet::ChangeDimension(change) => rewrite.dimension = change.dimension,
        _ => {}
    }
}

impl PacketHandler<server::Packet> for ConnectedHandler {
    async fn handle(&mut self, packet: &mut server::Packet) -> PacketAction {
        if let server::Packet::Disconnect(disconnect) = packet {
            return self.on_disconnect(disconnect).await;
        }
        let mut state = self.session.state().await;
        if !state.should_forward(&self.backend) {
            let name: &str = packet.as_ref();
            tracing::trace!(server = %self.backend.server.name, "Muted {name}");
            return PacketAction::Handled;
        }
        if let server::Packet::StartGame(_) = packet {
            tracing::warn!(server = %self.backend.server.name, "Unexpected start game after login");
            return PacketAction::Handled;
        }
        rewrite(&mut state, packet);
        PacketAction::Forward
    }
}
