//! Block palettes and the runtime-ID translation between them.

use crate::protocol::ProtocolVersion;
use ahash::AHashMap;
use anyhow::Context;
use bedrock_switch_proxy_macros::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

/// Block substituted for states the client's palette lacks.
const UNKNOWN_BLOCK: &str = "minecraft:info_update";

/// A block state identifier paired with one server's runtime ID for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct BlockPaletteEntry {
    pub identifier: String,
    #[encoding(varuint)]
    pub runtime_id: u32,
}

impl BlockPaletteEntry {
    pub fn new(identifier: impl Into<String>, runtime_id: u32) -> Self {
        Self {
            identifier: identifier.into(),
            runtime_id,
        }
    }
}

/// Translation of backend block runtime IDs into client runtime IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPaletteRewrite {
    map: AHashMap<u32, u32>,
}

impl BlockPaletteRewrite {
    /// IDs outside the backend's palette pass through unchanged.
    pub fn translate(&self, backend_id: u32) -> u32 {
        self.map.get(&backend_id).copied().unwrap_or(backend_id)
    }

    pub fn contains(&self, backend_id: u32) -> bool {
        self.map.contains_key(&backend_id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The block palette of one server.
#[derive(Debug, Clone, Default)]
pub struct BlockPalette {
    entries: Vec<BlockPaletteEntry>,
    by_identifier: AHashMap<String, u32>,
}

impl BlockPalette {
    pub fn new(entries: Vec<BlockPaletteEntry>) -> Self {
        let by_identifier = entries
            .iter()
            .map(|entry| (entry.identifier.clone(), entry.runtime_id))
            .collect();
        Self {
            entries,
            by_identifier,
        }
    }

    pub fn entries(&self) -> &[BlockPaletteEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn runtime_id(&self, identifier: &str) -> Option<u32> {
        self.by_identifier.get(identifier).copied()
    }

    /// Builds the translation from this palette into `target`.
    ///
    /// Every runtime ID of this palette gets an entry. States unknown to
    /// `target` map to its placeholder block, or to themselves if `target`
    /// has none.
    pub fn create_rewrite(&self, target: &BlockPalette) -> BlockPaletteRewrite {
        let fallback = target.runtime_id(UNKNOWN_BLOCK);
        let map = self
            .entries
            .iter()
            .map(|entry| {
                let translated = target
                    .runtime_id(&entry.identifier)
                    .or(fallback)
                    .unwrap_or(entry.runtime_id);
                (entry.runtime_id, translated)
            })
            .collect();
        BlockPaletteRewrite { map }
    }
}

/// Known block palettes, keyed by protocol version.
///
/// Used when a backend sends no palette of its own.
#[derive(Debug, Default)]
pub struct BlockPaletteRegistry {
    palettes: AHashMap<ProtocolVersion, Arc<BlockPalette>>,
}

impl BlockPaletteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, protocol: ProtocolVersion, palette: BlockPalette) {
        self.palettes.insert(protocol, Arc::new(palette));
    }

    pub fn get(&self, protocol: ProtocolVersion) -> Option<Arc<BlockPalette>> {
        self.palettes.get(&protocol).cloned()
    }

    /// Loads a palette from a JSON array of entries.
    pub fn load_json(&mut self, protocol: ProtocolVersion, path: &Path) -> anyhow::Result<()> {
        let data = fs_err::read_to_string(path)?;
        let entries: Vec<BlockPaletteEntry> = serde_json::from_str(&data)
            .with_context(|| format!("invalid block palette in {}", path.display()))?;
        tracing::debug!(%protocol, entries = entries.len(), "Loaded block palette");
        self.insert(protocol, BlockPalette::new(entries));
        Ok(())
    }

    /// Resolves the palette a backend announced in its start-game packet.
    pub fn resolve(&self, entries: &[BlockPaletteEntry], protocol: ProtocolVersion) -> Arc<BlockPalette> {
        if entries.is_empty() {
            if let Some(palette) = self.get(protocol) {
                return palette;
            }
        }
        Arc::new(BlockPalette::new(entries.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_palette() -> BlockPalette {
        BlockPalette::new(vec![
            BlockPaletteEntry::new("minecraft:air", 0),
            BlockPaletteEntry::new("minecraft:stone", 1),
            BlockPaletteEntry::new(UNKNOWN_BLOCK, 2),
        ])
    }

    #[test]
    fn rewrite_covers_every_backend_id() {
        let backend = BlockPalette::new(vec![
            BlockPaletteEntry::new("minecraft:stone", 10),
            BlockPaletteEntry::new("minecraft:air", 11),
            BlockPaletteEntry::new("custom:glowing_ore", 12),
        ]);
        let rewrite = backend.create_rewrite(&client_palette());

        assert_eq!(rewrite.len(), backend.entries().len());
        for entry in backend.entries() {
            assert!(rewrite.contains(entry.runtime_id));
        }
        assert_eq!(rewrite.translate(10), 1);
        assert_eq!(rewrite.translate(11), 0);
        assert_eq!(rewrite.translate(12), 2);
        assert_eq!(rewrite.translate(99), 99);
    }

    #[test]
    fn rebuilding_from_the_same_palette_is_idempotent() {
        let backend = BlockPalette::new(vec![
            BlockPaletteEntry::new("minecraft:stone", 4),
            BlockPaletteEntry::new("minecraft:dirt", 5),
        ]);
        let client = client_palette();
        assert_eq!(backend.create_rewrite(&client), backend.create_rewrite(&client));
    }

    #[test]
    fn missing_placeholder_falls_back_to_identity() {
        let backend = BlockPalette::new(vec![BlockPaletteEntry::new("minecraft:dirt", 7)]);
        let client = BlockPalette::new(vec![BlockPaletteEntry::new("minecraft:air", 0)]);
        assert_eq!(backend.create_rewrite(&client).translate(7), 7);
    }

    #[test]
    fn registry_backs_up_empty_palettes() {
        let mut registry = BlockPaletteRegistry::new();
        registry.insert(ProtocolVersion::MINECRAFT_PE_1_16_20, client_palette());

        let resolved = registry.resolve(&[], ProtocolVersion::MINECRAFT_PE_1_16_20);
        assert_eq!(resolved.runtime_id("minecraft:stone"), Some(1));

        let sent = [BlockPaletteEntry::new("minecraft:dirt", 3)];
        let resolved = registry.resolve(&sent, ProtocolVersion::MINECRAFT_PE_1_16_20);
        assert_eq!(resolved.runtime_id("minecraft:dirt"), Some(3));
    }
}
