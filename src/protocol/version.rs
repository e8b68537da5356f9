use serde::{Deserialize, Serialize};
use std::fmt;

/// Bedrock network protocol version, as sent in the client's login request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(i32);

impl ProtocolVersion {
    pub const MINECRAFT_PE_1_14_60: Self = Self(390);
    pub const MINECRAFT_PE_1_16_0: Self = Self(407);
    pub const MINECRAFT_PE_1_16_20: Self = Self(408);
    pub const MINECRAFT_PE_1_16_100: Self = Self(419);
    pub const MINECRAFT_PE_1_16_200: Self = Self(422);
    pub const MINECRAFT_PE_1_17_0: Self = Self(440);
    pub const MINECRAFT_PE_1_18_0: Self = Self(475);
    pub const MINECRAFT_PE_1_19_0: Self = Self(527);
    pub const MINECRAFT_PE_1_20_0: Self = Self(589);

    pub const fn new(protocol: i32) -> Self {
        Self(protocol)
    }

    pub fn protocol(self) -> i32 {
        self.0
    }

    /// Whether start-game still carries a full block palette.
    ///
    /// Later versions replaced it with a list of custom block properties,
    /// leaving the palette to the client's built-in tables.
    pub fn has_block_palette(self) -> bool {
        self <= Self::MINECRAFT_PE_1_16_20
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_negotiation_ends_after_1_16_20() {
        assert!(ProtocolVersion::MINECRAFT_PE_1_16_0.has_block_palette());
        assert!(ProtocolVersion::MINECRAFT_PE_1_16_20.has_block_palette());
        assert!(!ProtocolVersion::MINECRAFT_PE_1_16_100.has_block_palette());
        assert!(!ProtocolVersion::new(712).has_block_palette());
    }
}
