//! Packets sent by a client: received from game clients, sent to backends.

use crate::{
    position::BlockPosition,
    protocol::{decoder, packet::UnknownPacket, Decode, Decoder, Encode, Encoder, ProtocolVersion},
};
use bedrock_switch_proxy_macros::{Decode, Encode, FromVariants};

pub use super::server::Text;

#[derive(Debug, Clone, Encode, Decode, FromVariants, strum::AsRefStr)]
#[encoding(discriminant = "header")]
pub enum Packet {
    #[encoding(id = 0x01)]
    Login(Login),
    #[encoding(id = 0x04)]
    ClientToServerHandshake(ClientToServerHandshake),
    #[encoding(id = 0x08)]
    ResourcePackClientResponse(ResourcePackClientResponse),
    #[encoding(id = 0x09)]
    Text(Text),
    #[encoding(id = 0x13)]
    MovePlayer(MovePlayer),
    #[encoding(id = 0x24)]
    PlayerAction(PlayerAction),
    #[encoding(id = 0x45)]
    RequestChunkRadius(RequestChunkRadius),
    #[encoding(id = 0x4d)]
    CommandRequest(CommandRequest),
    #[encoding(other)]
    Other(UnknownPacket),
}

/// Login request.
///
/// The protocol version is big-endian; the request itself is a
/// varuint-prefixed blob holding the identity chain and the client
/// data token, each prefixed with a little-endian i32 length.
#[derive(Debug, Clone)]
pub struct Login {
    pub protocol: ProtocolVersion,
    pub chain_data: String,
    pub client_data: String,
}

impl Decode for Login {
    fn decode(decoder: &mut Decoder) -> decoder::Result<Self> {
        let protocol = ProtocolVersion::new(decoder.read_i32_be()?);
        let length = usize::try_from(decoder.read_var_u32()?)?;
        let mut request = Decoder::new(decoder.consume_slice(length)?);
        let chain_data = request.read_long_string()?.to_owned();
        let client_data = request.read_long_string()?.to_owned();
        Ok(Self {
            protocol,
            chain_data,
            client_data,
        })
    }
}

impl Encode for Login {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i32_be(self.protocol.protocol());
        let mut request = Vec::new();
        let mut request_encoder = Encoder::new(&mut request);
        request_encoder.write_long_string(&self.chain_data);
        request_encoder.write_long_string(&self.client_data);
        encoder.write_var_u32(request.len().try_into().unwrap_or(u32::MAX));
        encoder.write_slice(&request);
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ClientToServerHandshake {}

#[derive(Debug, Clone, Encode, Decode)]
pub struct ResourcePackClientResponse {
    pub status: ResourcePackResponseStatus,
    #[encoding(length_prefix = "u16")]
    pub pack_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[encoding(discriminant = "byte")]
pub enum ResourcePackResponseStatus {
    #[encoding(id = 1)]
    Refused,
    #[encoding(id = 2)]
    SendPacks,
    #[encoding(id = 3)]
    HaveAllPacks,
    #[encoding(id = 4)]
    Completed,
}

impl ResourcePackClientResponse {
    pub fn new(status: ResourcePackResponseStatus) -> Self {
        Self {
            status,
            pack_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct MovePlayer {
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct PlayerAction {
    #[encoding(varulong)]
    pub runtime_entity_id: u64,
    #[encoding(varint)]
    pub action: i32,
    pub block_position: BlockPosition,
    #[encoding(varint)]
    pub face: i32,
}

impl PlayerAction {
    pub const DIMENSION_CHANGE_SUCCESS: i32 = 14;
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct RequestChunkRadius {
    #[encoding(varint)]
    pub radius: i32,
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct CommandRequest {
    /// Command line including the leading slash.
    pub command: String,
    #[encoding(length_prefix = "inferred")]
    pub ignored_data: Vec<u8>,
}
