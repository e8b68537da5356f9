//! Codec for Bedrock game-packet batches.
//!
//! A batch is the `0xFE` game-packet marker followed by a raw-deflate
//! stream of packets, each prefixed with its length as an unsigned varint.
//! Once encryption is enabled the compressed stream is encrypted as a whole.
//! One batch travels in exactly one transport frame.

use super::BUFFER_LIMIT;
use crate::protocol::{
    encryption::{EncryptionKey, EncryptionState},
    packet, Decode, Decoder, Encode, Encoder,
};
use anyhow::{bail, Context};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use std::{
    io::{Read, Write},
    marker::PhantomData,
};

/// Marker byte at the start of every batch.
const GAME_PACKET_ID: u8 = 0xfe;

/// Most batches are a handful of small packets; favour latency.
const COMPRESSION_LEVEL: Compression = Compression::fast();

/// Codec state for one side of a link.
pub struct BatchCodec<Side> {
    encryption_state: Option<EncryptionState>,
    _marker: PhantomData<Side>,
}

impl<Side> BatchCodec<Side>
where
    Side: packet::Side,
{
    pub fn new() -> Self {
        Self {
            encryption_state: None,
            _marker: PhantomData,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_state.is_some()
    }

    /// Encrypts all batches encoded or decoded after this call.
    pub fn enable_encryption(&mut self, key: EncryptionKey) -> anyhow::Result<()> {
        if self.encryption_state.is_some() {
            bail!("encryption is already enabled on this link");
        }
        self.encryption_state = Some(EncryptionState::new(key));
        Ok(())
    }

    /// Encodes packets into a single batch frame.
    pub fn encode_batch(&mut self, packets: &[Side::SendPacket]) -> anyhow::Result<Vec<u8>> {
        let mut plain_buf = Vec::new();
        let mut body = Vec::new();
        for packet in packets {
            body.clear();
            packet.encode(&mut Encoder::new(&mut body));
            let mut encoder = Encoder::new(&mut plain_buf);
            encoder.write_var_u32(u32::try_from(body.len())?);
            encoder.write_slice(&body);
        }

        let mut compressor = DeflateEncoder::new(Vec::new(), COMPRESSION_LEVEL);
        compressor.write_all(&plain_buf)?;
        let mut payload = compressor.finish()?;

        if let Some(encryption) = &mut self.encryption_state {
            encryption.encrypt(&mut payload);
        }

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(GAME_PACKET_ID);
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decodes every packet carried in one batch frame.
    ///
    /// An error invalidates the link: the cipher state may have advanced.
    pub fn decode_batch(&mut self, frame: &[u8]) -> anyhow::Result<Vec<Side::RecvPacket>> {
        let (&marker, payload) = frame.split_first().context("empty batch")?;
        if marker != GAME_PACKET_ID {
            bail!("unexpected batch marker {marker:#04x}");
        }

        let mut payload = payload.to_vec();
        if let Some(encryption) = &mut self.encryption_state {
            encryption.decrypt(&mut payload)?;
        }

        let mut plain_buf = Vec::new();
        DeflateDecoder::new(&payload[..])
            .take(BUFFER_LIMIT as u64)
            .read_to_end(&mut plain_buf)
            .context("failed to decompress batch")?;

        let mut packets = Vec::new();
        let mut decoder = Decoder::new(&plain_buf);
        while !decoder.is_finished() {
            let length = usize::try_from(decoder.read_var_u32()?)?;
            if length > BUFFER_LIMIT {
                bail!("packet length of {length} exceeds maximum allowed");
            }
            let body = decoder.consume_slice(length)?;
            packets.push(Side::RecvPacket::decode(&mut Decoder::new(body))?);
        }
        Ok(packets)
    }
}

impl<Side: packet::Side> Default for BatchCodec<Side> {
    fn default() -> Self {
        Self::new()
    }
}
