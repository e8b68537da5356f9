//! Per-player translation between backend ID spaces and the one the
//! client saw first.

use crate::{
    entity_id::EntityId,
    position::{Vec2, Vec3},
    protocol::packet::server::{BlockProperty, GameRule, StartGame},
    rewrite::{
        block_palette::{BlockPalette, BlockPaletteRewrite},
        item::{ItemEntry, ItemRewrite},
    },
    transfer::TransferCallback,
};
use std::sync::Arc;

pub mod block_palette;
pub mod item;

/// Chunk radius assumed until the client asks for one.
const DEFAULT_CHUNK_RADIUS: i32 = 8;

/// ID translations and world facts for one player.
///
/// Created with the player's session and overwritten in place by each
/// successful switch.
#[derive(Debug)]
pub struct RewriteData {
    /// ID the client knows itself by. Stable across switches.
    pub entity_id: EntityId,
    /// ID the current backend knows the player by.
    pub original_entity_id: EntityId,
    /// Dimension the client is in.
    pub dimension: i32,
    pub spawn_position: Vec3,
    pub rotation: Vec2,
    pub chunk_radius: i32,
    pub game_rules: Vec<GameRule>,
    /// Palette the client was given by its first backend.
    pub block_palette: Arc<BlockPalette>,
    pub block_palette_rewrite: BlockPaletteRewrite,
    /// Block definitions of the current backend, for protocols
    /// without palette negotiation.
    pub block_properties: Vec<BlockProperty>,
    /// Item table the client was given by its first backend.
    pub item_entries: Vec<ItemEntry>,
    pub item_rewrite: ItemRewrite,
    transfer_callback: Option<TransferCallback>,
}

impl Default for RewriteData {
    fn default() -> Self {
        Self {
            entity_id: EntityId::default(),
            original_entity_id: EntityId::default(),
            dimension: 0,
            spawn_position: Vec3::default(),
            rotation: Vec2::default(),
            chunk_radius: DEFAULT_CHUNK_RADIUS,
            game_rules: Vec::new(),
            block_palette: Arc::default(),
            block_palette_rewrite: BlockPaletteRewrite::default(),
            block_properties: Vec::new(),
            item_entries: Vec::new(),
            item_rewrite: ItemRewrite::default(),
            transfer_callback: None,
        }
    }
}

/// The backend-specific part of [`RewriteData`], kept while a switch
/// is in flight so an aborted switch can put it back.
#[derive(Debug, Clone)]
pub struct BackendRewrite {
    original_entity_id: EntityId,
    dimension: i32,
    spawn_position: Vec3,
    rotation: Vec2,
    game_rules: Vec<GameRule>,
    block_palette_rewrite: BlockPaletteRewrite,
    block_properties: Vec<BlockProperty>,
    item_rewrite: ItemRewrite,
}

impl RewriteData {
    pub fn backend_rewrite(&self) -> BackendRewrite {
        BackendRewrite {
            original_entity_id: self.original_entity_id,
            dimension: self.dimension,
            spawn_position: self.spawn_position,
            rotation: self.rotation,
            game_rules: self.game_rules.clone(),
            block_palette_rewrite: self.block_palette_rewrite.clone(),
            block_properties: self.block_properties.clone(),
            item_rewrite: self.item_rewrite.clone(),
        }
    }

    pub fn restore_backend_rewrite(&mut self, previous: BackendRewrite) {
        self.original_entity_id = previous.original_entity_id;
        self.dimension = previous.dimension;
        self.spawn_position = previous.spawn_position;
        self.rotation = previous.rotation;
        self.game_rules = previous.game_rules;
        self.block_palette_rewrite = previous.block_palette_rewrite;
        self.block_properties = previous.block_properties;
        self.item_rewrite = previous.item_rewrite;
    }

    /// Takes the client's baseline from the first backend's start-game.
    /// Translations start out as the identity.
    pub fn set_baseline(&mut self, start_game: &StartGame, block_palette: Arc<BlockPalette>) {
        let entity_id = EntityId::from_runtime(start_game.runtime_entity_id);
        self.entity_id = entity_id;
        self.original_entity_id = entity_id;
        self.dimension = start_game.dimension;
        self.spawn_position = start_game.player_position;
        self.rotation = start_game.rotation;
        self.game_rules = start_game.game_rules.clone();
        self.block_palette_rewrite = block_palette.create_rewrite(&block_palette);
        self.block_palette = block_palette;
        self.block_properties = start_game.block_properties.clone();
        self.item_entries = start_game.item_entries.clone();
        self.item_rewrite = ItemRewrite::default();
    }

    /// Rebuilds the item translation from a backend's item table.
    pub fn parse_item_ids(&mut self, backend_items: &[ItemEntry]) {
        self.item_rewrite = ItemRewrite::new(backend_items, &self.item_entries);
    }

    /// Rebuilds the block translation from a backend's palette.
    pub fn apply_block_palette(&mut self, backend_palette: &BlockPalette) {
        self.block_palette_rewrite = backend_palette.create_rewrite(&self.block_palette);
    }

    /// Translates the player's entity ID between the backend and the client.
    ///
    /// The two IDs swap places, so the same call works in both directions.
    /// Other entities keep their IDs.
    pub fn translate_runtime_id(&self, id: u64) -> u64 {
        let unique = self.translate_unique_id(EntityId::from_runtime(id).unique());
        EntityId::new(unique).runtime()
    }

    pub fn translate_unique_id(&self, id: i64) -> i64 {
        if id == self.original_entity_id.unique() {
            self.entity_id.unique()
        } else if id == self.entity_id.unique() {
            self.original_entity_id.unique()
        } else {
            id
        }
    }

    pub fn set_transfer_callback(&mut self, callback: TransferCallback) {
        self.transfer_callback = Some(callback);
    }

    /// Takes the callback, leaving none behind.
    pub fn take_transfer_callback(&mut self) -> Option<TransferCallback> {
        self.transfer_callback.take()
    }

    pub fn transfer_callback(&self) -> Option<&TransferCallback> {
        self.transfer_callback.as_ref()
    }

    /// Merges changed rules into the active set.
    pub fn update_game_rules(&mut self, changed: &[GameRule]) {
        for rule in changed {
            match self.game_rules.iter_mut().find(|r| r.name == rule.name) {
                Some(existing) => existing.value = rule.value,
                None => self.game_rules.push(rule.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::server::GameRuleValue;

    #[test]
    fn player_ids_swap_and_others_pass_through() {
        let rewrite = RewriteData {
            entity_id: EntityId::new(1),
            original_entity_id: EntityId::new(77),
            ..Default::default()
        };
        assert_eq!(rewrite.translate_runtime_id(77), 1);
        assert_eq!(rewrite.translate_runtime_id(1), 77);
        assert_eq!(rewrite.translate_runtime_id(5), 5);
        assert_eq!(rewrite.translate_unique_id(77), 1);
    }

    #[test]
    fn restored_rewrite_maps_ids_to_previous_backend() {
        let mut rewrite = RewriteData {
            entity_id: EntityId::new(1),
            original_entity_id: EntityId::new(1),
            ..Default::default()
        };
        let previous = rewrite.backend_rewrite();
        rewrite.original_entity_id = EntityId::new(77);
        rewrite.dimension = 1;

        rewrite.restore_backend_rewrite(previous);
        assert_eq!(rewrite.translate_runtime_id(1), 1);
        assert_eq!(rewrite.dimension, 0);
    }

    #[test]
    fn changed_rules_replace_by_name() {
        let mut rewrite = RewriteData {
            game_rules: vec![GameRule {
                name: "showcoordinates".into(),
                value: GameRuleValue::Bool(false),
            }],
            ..Default::default()
        };
        rewrite.update_game_rules(&[
            GameRule {
                name: "showcoordinates".into(),
                value: GameRuleValue::Bool(true),
            },
            GameRule {
                name: "spawnradius".into(),
                value: GameRuleValue::Int(5),
            },
        ]);
        assert_eq!(rewrite.game_rules.len(), 2);
        assert_eq!(rewrite.game_rules[0].value, GameRuleValue::Bool(true));
    }
}
