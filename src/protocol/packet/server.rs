//! Packets sent by a server: received from backends, sent to game clients.

use crate::{
    position::{BlockPosition, Vec2, Vec3},
    protocol::{decoder, Decode, Decoder, Encode, Encoder, packet::UnknownPacket, DecodeError},
    rewrite::{block_palette::BlockPaletteEntry, item::ItemEntry},
};
use bedrock_switch_proxy_macros::{Decode, Encode, FromVariants};
use uuid::Uuid;

#[derive(Debug, Clone, Encode, Decode, FromVariants, strum::AsRefStr)]
#[encoding(discriminant = "header")]
pub enum Packet {
    #[encoding(id = 0x02)]
    PlayStatus(PlayStatus),
    #[encoding(id = 0x03)]
    ServerToClientHandshake(ServerToClientHandshake),
    #[encoding(id = 0x05)]
    Disconnect(Disconnect),
    #[encoding(id = 0x06)]
    ResourcePacksInfo(ResourcePacksInfo),
    #[encoding(id = 0x07)]
    ResourcePackStack(ResourcePackStack),
    #[encoding(id = 0x09)]
    Text(Text),
    #[encoding(id = 0x0b)]
    StartGame(Box<StartGame>),
    #[encoding(id = 0x0c)]
    AddPlayer(AddPlayer),
    #[encoding(id = 0x0d)]
    AddEntity(AddEntity),
    #[encoding(id = 0x0e)]
    RemoveEntity(RemoveEntity),
    #[encoding(id = 0x0f)]
    AddItemEntity(AddItemEntity),
    #[encoding(id = 0x13)]
    MovePlayer(MovePlayer),
    #[encoding(id = 0x15)]
    UpdateBlock(UpdateBlock),
    #[encoding(id = 0x19)]
    LevelEvent(LevelEvent),
    #[encoding(id = 0x1c)]
    MobEffect(MobEffect),
    #[encoding(id = 0x27)]
    SetEntityData(SetEntityData),
    #[encoding(id = 0x3c)]
    SetDifficulty(SetDifficulty),
    #[encoding(id = 0x3d)]
    ChangeDimension(ChangeDimension),
    #[encoding(id = 0x3e)]
    SetPlayerGameType(SetPlayerGameType),
    #[encoding(id = 0x3f)]
    PlayerList(PlayerList),
    #[encoding(id = 0x46)]
    ChunkRadiusUpdated(ChunkRadiusUpdated),
    #[encoding(id = 0x48)]
    GameRulesChanged(GameRulesChanged),
    #[encoding(id = 0x4a)]
    BossEvent(BossEvent),
    #[encoding(id = 0x6a)]
    RemoveObjective(RemoveObjective),
    #[encoding(id = 0x6b)]
    SetDisplayObjective(SetDisplayObjective),
    #[encoding(id = 0x79)]
    NetworkChunkPublisherUpdate(NetworkChunkPublisherUpdate),
    #[encoding(other)]
    Other(UnknownPacket),
}

impl From<StartGame> for Packet {
    fn from(packet: StartGame) -> Self {
        Packet::StartGame(Box::new(packet))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlayStatus {
    LoginSuccess,
    FailedClient,
    FailedServer,
    PlayerSpawn,
    FailedInvalidTenant,
    FailedVanillaEdu,
    FailedIncompatible,
    FailedServerFull,
}

impl PlayStatus {
    fn id(self) -> i32 {
        match self {
            PlayStatus::LoginSuccess => 0,
            PlayStatus::FailedClient => 1,
            PlayStatus::FailedServer => 2,
            PlayStatus::PlayerSpawn => 3,
            PlayStatus::FailedInvalidTenant => 4,
            PlayStatus::FailedVanillaEdu => 5,
            PlayStatus::FailedIncompatible => 6,
            PlayStatus::FailedServerFull => 7,
        }
    }
}

/// Play status is one of the few big-endian fields.
impl Decode for PlayStatus {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let status = match decoder.read_i32_be()? {
            0 => PlayStatus::LoginSuccess,
            1 => PlayStatus::FailedClient,
            2 => PlayStatus::FailedServer,
            3 => PlayStatus::PlayerSpawn,
            4 => PlayStatus::FailedInvalidTenant,
            5 => PlayStatus::FailedVanillaEdu,
            6 => PlayStatus::FailedIncompatible,
            7 => PlayStatus::FailedServerFull,
            x => {
                return Err(DecodeError::UnknownValue {
                    kind: "play status",
                    value: x.into(),
                })
            }
        };
        Ok(status)
    }
}

impl Encode for PlayStatus {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_be(self.id());
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ServerToClientHandshake {
    /// Signed token carrying the server's public key and the salt.
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub hide_disconnect_screen: bool,
    pub message: String,
}

impl Decode for Disconnect {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let hide_disconnect_screen = decoder.read_bool()?;
        let message = if hide_disconnect_screen {
            String::new()
        } else {
            decoder.read_string()?.to_owned()
        };
        Ok(Self {
            hide_disconnect_screen,
            message,
        })
    }
}

impl Encode for Disconnect {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_bool(self.hide_disconnect_screen);
        if !self.hide_disconnect_screen {
            encoder.write_string(&self.message);
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ResourcePacksInfo {
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

impl ResourcePacksInfo {
    /// No packs required, no scripting, no packs listed.
    pub fn empty() -> Self {
        Self {
            // must_accept, has_scripts, two u16-prefixed empty pack lists
            ignored_data: vec![0, 0, 0, 0, 0, 0],
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ResourcePackStack {
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

impl ResourcePackStack {
    pub fn empty() -> Self {
        Self {
            // must_accept, two varuint-prefixed empty stacks, empty game version, experiment count, flag
            ignored_data: vec![0, 0, 0, 0, 0, 0, 0, 0, 0],
        }
    }
}

/// A chat or system message.
///
/// Layout after the flag depends on the text type, so it stays opaque;
/// [`Text::raw`] builds the one variant the proxy sends itself.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Text {
    pub text_type: u8,
    pub needs_translation: bool,
    #[encoding(length_prefix = "inferred")]
    pub body: Vec<u8>,
}

impl Text {
    pub const TYPE_RAW: u8 = 0;
    pub const TYPE_CHAT: u8 = 1;

    /// A plain message with empty sender identifiers.
    pub fn raw(message: &str) -> Self {
        let mut body = Vec::new();
        let mut encoder = Encoder::new(&mut body);
        encoder.write_string(message);
        encoder.write_string(""); // xuid
        encoder.write_string(""); // platform chat id
        Self {
            text_type: Self::TYPE_RAW,
            needs_translation: false,
            body,
        }
    }

    /// Reads back the message of a raw text.
    pub fn raw_message(&self) -> Option<&str> {
        if self.text_type != Self::TYPE_RAW {
            return None;
        }
        Decoder::new(&self.body).read_string().ok()
    }
}

/// World bootstrap packet.
///
/// Only the leading fields the proxy consumes are decoded, in the order
/// it reads them; everything after the item table is kept opaque.
#[derive(Debug, Clone, Encode, Decode)]
pub struct StartGame {
    #[encoding(varlong)]
    pub unique_entity_id: i64,
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    #[encoding(varint)]
    pub player_game_type: i32,
    pub player_position: Vec3,
    pub rotation: Vec2,
    #[encoding(varint)]
    pub dimension: i32,
    #[encoding(varint)]
    pub difficulty: i32,
    #[encoding(length_prefix = "varuint")]
    pub game_rules: Vec<GameRule>,
    #[encoding(length_prefix = "varuint")]
    pub block_palette: Vec<BlockPaletteEntry>,
    #[encoding(length_prefix = "varuint")]
    pub block_properties: Vec<BlockProperty>,
    #[encoding(length_prefix = "varuint")]
    pub item_entries: Vec<ItemEntry>,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct GameRule {
    pub name: String,
    pub value: GameRuleValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
#[encoding(discriminant = "varuint")]
pub enum GameRuleValue {
    #[encoding(id = 1)]
    Bool(bool),
    #[encoding(id = 2)]
    Int(#[encoding(varuint)] u32),
    #[encoding(id = 3)]
    Float(f32),
}

/// A custom block definition; the property tree is kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct BlockProperty {
    pub name: String,
    #[encoding(length_prefix = "varuint")]
    pub properties: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct AddPlayer {
    pub uuid: Uuid,
    pub username: String,
    #[encoding(varlong)]
    pub unique_entity_id: i64,
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct AddEntity {
    #[encoding(varlong)]
    pub unique_entity_id: i64,
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct RemoveEntity {
    #[encoding(varlong)]
    pub unique_entity_id: i64,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct AddItemEntity {
    #[encoding(varlong)]
    pub unique_entity_id: i64,
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    /// Network id of the dropped item.
    #[encoding(varint)]
    pub item_id: i32,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct MovePlayer {
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct UpdateBlock {
    pub position: BlockPosition,
    #[encoding(varuint)]
    pub block_runtime_id: u32,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct LevelEvent {
    #[encoding(varint)]
    pub event_id: i32,
    pub position: Vec3,
    #[encoding(varint)]
    pub data: i32,
}

impl LevelEvent {
    pub const STOP_RAIN: i32 = 3003;
    pub const STOP_THUNDER: i32 = 3004;
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct MobEffect {
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    pub event: u8,
    #[encoding(varint)]
    pub effect_id: i32,
    #[encoding(varint)]
    pub amplifier: i32,
    pub show_particles: bool,
    #[encoding(varint)]
    pub duration: i32,
}

impl MobEffect {
    pub const EVENT_ADD: u8 = 1;
    pub const EVENT_MODIFY: u8 = 2;
    pub const EVENT_REMOVE: u8 = 3;
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct SetEntityData {
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct SetDifficulty {
    #[encoding(varuint)]
    pub difficulty: u32,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ChangeDimension {
    #[encoding(varint)]
    pub dimension: i32,
    pub position: Vec3,
    pub respawn: bool,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct SetPlayerGameType {
    #[encoding(varint)]
    pub game_type: i32,
}

/// Player list update.
///
/// Added entries carry skins and are kept opaque; removals
/// are decoded so the proxy can stop tracking those players.
#[derive(Debug, Clone, Encode, Decode)]
#[encoding(discriminant = "byte")]
pub enum PlayerList {
    #[encoding(id = 0)]
    Add {
        #[encoding(length_prefix = "inferred")]
        ignored_data: Vec<u8>,
    },
    #[encoding(id = 1)]
    Remove {
        #[encoding(length_prefix = "varuint")]
        uuids: Vec<Uuid>,
    },
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ChunkRadiusUpdated {
    #[encoding(varint)]
    pub radius: i32,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct GameRulesChanged {
    #[encoding(length_prefix = "varuint")]
    pub game_rules: Vec<GameRule>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct BossEvent {
    #[encoding(varlong)]
    pub boss_entity_id: i64,
    #[encoding(varuint)]
    pub event_type: u32,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

impl BossEvent {
    pub const SHOW: u32 = 0;
    pub const HIDE: u32 = 2;
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct RemoveObjective {
    pub objective_name: String,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct SetDisplayObjective {
    pub display_slot: String,
    pub objective_name: String,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct NetworkChunkPublisherUpdate {
    pub position: BlockPosition,
    #[encoding(varuint)]
    pub radius: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reencode(packet: &Packet) -> Packet {
        let mut buf = Vec::new();
        packet.encode(&mut Encoder::new(&mut buf));
        Packet::decode(&mut Decoder::new(&buf)).unwrap()
    }

    #[test]
    fn play_status_is_big_endian() {
        let mut buf = Vec::new();
        Packet::from(PlayStatus::FailedServerFull).encode(&mut Encoder::new(&mut buf));
        assert_eq!(buf, [0x02, 0, 0, 0, 7]);
    }

    #[test]
    fn hidden_disconnect_omits_message() {
        let packet = Packet::from(Disconnect {
            hide_disconnect_screen: true,
            message: String::new(),
        });
        let mut buf = Vec::new();
        packet.encode(&mut Encoder::new(&mut buf));
        assert_eq!(buf, [0x05, 0x01]);
    }

    #[test]
    fn sub_client_bits_are_ignored_in_header() {
        // ChunkRadiusUpdated (0x46) with sender sub-client id 1 in bits 10..12
        let header: u32 = 0x46 | (1 << 10);
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf);
        encoder.write_var_u32(header);
        encoder.write_var_i32(8);
        let packet = Packet::decode(&mut Decoder::new(&buf)).unwrap();
        assert!(matches!(
            packet,
            Packet::ChunkRadiusUpdated(ChunkRadiusUpdated { radius: 8 })
        ));
    }

    #[test]
    fn start_game_keeps_trailing_fields() {
        let start_game = StartGame {
            unique_entity_id: -5,
            runtime_entity_id: 5,
            player_game_type: 1,
            player_position: Vec3::new(0.5, 70.0, -3.0),
            rotation: Vec2::default(),
            dimension: 1,
            difficulty: 2,
            game_rules: vec![
                GameRule {
                    name: "dodaylightcycle".into(),
                    value: GameRuleValue::Bool(false),
                },
                GameRule {
                    name: "randomtickspeed".into(),
                    value: GameRuleValue::Int(3),
                },
            ],
            block_palette: vec![BlockPaletteEntry::new("minecraft:air", 0)],
            block_properties: Vec::new(),
            item_entries: vec![ItemEntry::new("minecraft:stick", 280)],
            ignored_data: vec![0xaa, 0xbb],
        };
        let Packet::StartGame(decoded) = reencode(&start_game.into()) else {
            panic!("expected start game");
        };
        assert_eq!(decoded.unique_entity_id, -5);
        assert_eq!(decoded.dimension, 1);
        assert_eq!(decoded.game_rules[1].value, GameRuleValue::Int(3));
        assert_eq!(decoded.item_entries[0].identifier, "minecraft:stick");
        assert_eq!(decoded.ignored_data, [0xaa, 0xbb]);
    }

    #[test]
    fn raw_text_message_is_readable() {
        let Packet::Text(text) = reencode(&Text::raw("hello").into()) else {
            panic!("expected text");
        };
        assert_eq!(text.raw_message(), Some("hello"));
    }
}
