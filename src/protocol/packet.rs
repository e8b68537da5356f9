//! Enumerates the packet types the proxy needs to understand.
//!
//! Full parsing of packets is _not_ implemented. Only the fields the proxy
//! consumes or rewrites are decoded; the remainder of a packet is kept as a
//! `Vec<u8>` of the rest of its bytes. Packets with an ID unknown to the proxy
//! decode into [`UnknownPacket`]. Both enable lossless forwarding.

use crate::protocol::{Decode, DecodeError, Decoder, DecodeOther, Encode, EncodeOther, Encoder};
use std::fmt::{self, Debug};

pub mod client;
pub mod server;

/// Type encoding for a side (client or server) of a link.
pub trait Side: Send + Sync + 'static + Copy + Clone {
    type SendPacket: Encode + Debug + AsRef<str> + Send + 'static;
    type RecvPacket: Decode + Debug + AsRef<str> + Send + 'static;
}

pub mod side {
    use super::*;

    /// The proxy acting as a server, i.e. toward a game client.
    #[derive(Debug, Copy, Clone)]
    pub struct Server;
    impl Side for Server {
        type SendPacket = server::Packet;
        type RecvPacket = client::Packet;
    }

    /// The proxy acting as a client, i.e. toward a backend.
    #[derive(Debug, Copy, Clone)]
    pub struct Client;
    impl Side for Client {
        type SendPacket = client::Packet;
        type RecvPacket = server::Packet;
    }
}

/// A packet passed through without interpretation.
#[derive(Clone, PartialEq, Eq)]
pub struct UnknownPacket {
    pub id: u32,
    pub payload: Vec<u8>,
}

impl Debug for UnknownPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnknownPacket")
            .field("id", &format_args!("{:#04x}", self.id))
            .field("len", &self.payload.len())
            .finish()
    }
}

impl DecodeOther for UnknownPacket {
    fn decode_other(id: i64, decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            id: u32::try_from(id)?,
            payload: decoder.consume_rest().to_vec(),
        })
    }
}

impl EncodeOther for UnknownPacket {
    fn other_id(&self) -> i64 {
        i64::from(self.id)
    }
}

impl Encode for UnknownPacket {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_slice(&self.payload);
    }
}
