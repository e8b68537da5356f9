use ahash::AHashMap;
use bedrock_switch_proxy_macros::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// An item identifier paired with one server's runtime ID for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct ItemEntry {
    pub identifier: String,
    pub runtime_id: i16,
    #[serde(default)]
    pub component_based: bool,
}

impl ItemEntry {
    pub fn new(identifier: impl Into<String>, runtime_id: i16) -> Self {
        Self {
            identifier: identifier.into(),
            runtime_id,
            component_based: false,
        }
    }
}

/// Translation of backend item runtime IDs into client runtime IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemRewrite {
    map: AHashMap<i32, i32>,
}

impl ItemRewrite {
    /// Maps each backend entry to the client entry with the same
    /// identifier. Items the client does not know are left as they are.
    pub fn new(backend: &[ItemEntry], client: &[ItemEntry]) -> Self {
        let client_ids: AHashMap<&str, i16> = client
            .iter()
            .map(|entry| (entry.identifier.as_str(), entry.runtime_id))
            .collect();
        let map = backend
            .iter()
            .filter_map(|entry| {
                let client_id = *client_ids.get(entry.identifier.as_str())?;
                (client_id != entry.runtime_id)
                    .then(|| (i32::from(entry.runtime_id), i32::from(client_id)))
            })
            .collect();
        Self { map }
    }

    pub fn translate(&self, backend_id: i32) -> i32 {
        self.map.get(&backend_id).copied().unwrap_or(backend_id)
    }

    pub fn is_identity(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_translate_by_identifier() {
        let client = [
            ItemEntry::new("minecraft:stick", 280),
            ItemEntry::new("minecraft:apple", 257),
        ];
        let backend = [
            ItemEntry::new("minecraft:apple", 300),
            ItemEntry::new("minecraft:stick", 280),
            ItemEntry::new("custom:wand", 1000),
        ];
        let rewrite = ItemRewrite::new(&backend, &client);
        assert_eq!(rewrite.translate(300), 257);
        assert_eq!(rewrite.translate(280), 280);
        assert_eq!(rewrite.translate(1000), 1000);
        assert!(ItemRewrite::new(&client, &client).is_identity());
    }
}
