use serde::{Deserialize, Serialize};

/// Wrapper for a Bedrock entity ID.
///
/// The wire carries a player's ID twice: as a signed "unique" ID and as an
/// unsigned "runtime" ID. Backends assign both the same value, and so does
/// the proxy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct EntityId(i64);

impl EntityId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn from_runtime(id: u64) -> Self {
        Self(bytemuck::cast(id))
    }

    pub fn unique(self) -> i64 {
        self.0
    }

    pub fn runtime(self) -> u64 {
        bytemuck::cast(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_and_unique_views_agree() {
        let id = EntityId::from_runtime(77);
        assert_eq!(id.unique(), 77);
        assert_eq!(EntityId::new(-1).runtime(), u64::MAX);
    }
}
