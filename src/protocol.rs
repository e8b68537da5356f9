//! Bedrock wire protocol: primitive codec, packets, batching and encryption.

pub mod batch;
mod decoder;
mod encoder;
pub mod encryption;
pub mod packet;
mod version;

pub use decoder::{Decode, DecodeError, Decoder};
pub use encoder::{Encode, Encoder};
pub use version::ProtocolVersion;

/// Limit to avoid out-of-memory DOS.
const BUFFER_LIMIT: usize = 2 * 1024 * 1024; // 2 MiB

/// Decodes the body of a packet whose ID is not known to an enum.
///
/// Implemented by the payload of `#[encoding(other)]` variants.
pub trait DecodeOther: Sized {
    fn decode_other(id: i64, decoder: &mut Decoder) -> Result<Self, DecodeError>;
}

/// Counterpart of [`DecodeOther`]: yields the discriminant to write
/// before the body is encoded.
pub trait EncodeOther {
    fn other_id(&self) -> i64;
}
