use crate::position::{BlockPosition, Vec2, Vec3};
use std::{convert::Infallible, num::TryFromIntError, str::Utf8Error};
use uuid::Uuid;

/// An error while decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("need at least {0} more bytes")]
    EndOfStream(usize),
    #[error("invalid boolean pattern {0} - expected either 0 or 1")]
    InvalidBool(u8),
    #[error("varint / varlong is too long")]
    VarIntTooLong,
    #[error("string exceeds max allowed length")]
    StringTooLong,
    #[error("unknown {kind} value {value}")]
    UnknownValue { kind: &'static str, value: i64 },
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    IntConversion(#[from] TryFromIntError),
    /// Special variant for derive macro integer conversions to work.
    /// Cannot occur.
    #[error(transparent)]
    Infallible(#[from] Infallible),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;

const MAX_STRING_LENGTH: usize = 1024 * 1024;

/// A raw decoder for a Bedrock bitstream.
///
/// Fixed-width integers are little-endian unless a method says otherwise.
#[derive(Debug)]
pub struct Decoder<'a> {
    buffer: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Creates a decoder from the buffer it will read from.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Gets the remaining buffer.
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Returns if there is no data left in the buffer.
    pub fn is_finished(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consumes `n` bytes from the buffer, returning them as a slice.
    pub fn consume_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        if n <= self.buffer.len() {
            let (data, buffer) = self.buffer.split_at(n);
            self.buffer = buffer;
            Ok(data)
        } else {
            Err(DecodeError::EndOfStream(n - self.buffer.len()))
        }
    }

    /// Consumes everything left in the buffer.
    pub fn consume_rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buffer)
    }

    /// Consumes `N` bytes into an array.
    pub fn consume<const N: usize>(&mut self) -> Result<[u8; N]> {
        let data = self.consume_slice(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(data);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.consume::<1>().map(|[x]| x)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.consume().map(i8::from_le_bytes)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.consume().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.consume().map(i16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.consume().map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.consume().map(i32::from_le_bytes)
    }

    /// Reads a big-endian signed int. Only a handful of
    /// login-phase fields use this byte order.
    pub fn read_i32_be(&mut self) -> Result<i32> {
        self.consume().map(i32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.consume().map(u64::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.consume().map(i64::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.consume().map(f32::from_le_bytes)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let x = self.read_u8()?;
        match x {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidBool(x)),
        }
    }

    /// Reads an unsigned 32-bit VarInt.
    pub fn read_var_u32(&mut self) -> Result<u32> {
        let value = self.read_var(5)?;
        Ok(value as u32)
    }

    /// Reads an unsigned 64-bit VarInt.
    pub fn read_var_u64(&mut self) -> Result<u64> {
        self.read_var(10)
    }

    /// Reads a zigzag-encoded signed 32-bit VarInt.
    pub fn read_var_i32(&mut self) -> Result<i32> {
        let raw = self.read_var_u32()?;
        Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
    }

    /// Reads a zigzag-encoded signed 64-bit VarInt.
    pub fn read_var_i64(&mut self) -> Result<i64> {
        let raw = self.read_var_u64()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    fn read_var(&mut self, max_bytes: u32) -> Result<u64> {
        let mut num_read = 0;
        let mut result = 0u64;

        loop {
            if num_read == max_bytes {
                return Err(DecodeError::VarIntTooLong);
            }
            let read = self.read_u8()?;
            result |= u64::from(read & 0b0111_1111) << (7 * num_read);

            num_read += 1;

            if read & 0b1000_0000 == 0 {
                break;
            }
        }
        Ok(result)
    }

    /// Reads a varuint-prefixed string from the stream.
    pub fn read_string(&mut self) -> Result<&'a str> {
        let length = usize::try_from(self.read_var_u32()?)?;

        if length > MAX_STRING_LENGTH {
            return Err(DecodeError::StringTooLong);
        }

        let bytes = std::str::from_utf8(self.consume_slice(length)?)?;
        Ok(bytes)
    }

    /// Reads a string prefixed with a little-endian i32 length,
    /// as used inside the login request.
    pub fn read_long_string(&mut self) -> Result<&'a str> {
        let length = usize::try_from(self.read_i32()?)?;
        if length > MAX_STRING_LENGTH {
            return Err(DecodeError::StringTooLong);
        }
        let bytes = std::str::from_utf8(self.consume_slice(length)?)?;
        Ok(bytes)
    }
}

/// A type that can be read from a [`Decoder`].
pub trait Decode: Sized {
    fn decode(decoder: &mut Decoder) -> Result<Self>;
}

impl Decode for u8 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u8()
    }
}

impl Decode for i8 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i8()
    }
}

impl Decode for u16 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u16()
    }
}

impl Decode for i16 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i16()
    }
}

impl Decode for u32 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u32()
    }
}

impl Decode for i32 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i32()
    }
}

impl Decode for u64 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_u64()
    }
}

impl Decode for i64 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_i64()
    }
}

impl Decode for f32 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_f32()
    }
}

impl Decode for bool {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_bool()
    }
}

impl Decode for String {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        decoder.read_string().map(str::to_owned)
    }
}

/// UUIDs are written as two little-endian u64 halves,
/// most significant half first.
impl Decode for Uuid {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        let most = decoder.read_u64()?;
        let least = decoder.read_u64()?;
        Ok(Uuid::from_u64_pair(most, least))
    }
}

impl Decode for Vec3 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        Ok(Vec3 {
            x: decoder.read_f32()?,
            y: decoder.read_f32()?,
            z: decoder.read_f32()?,
        })
    }
}

impl Decode for Vec2 {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        Ok(Vec2 {
            x: decoder.read_f32()?,
            y: decoder.read_f32()?,
        })
    }
}

impl Decode for BlockPosition {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        Ok(BlockPosition {
            x: decoder.read_var_i32()?,
            y: decoder.read_var_u32()? as i32,
            z: decoder.read_var_i32()?,
        })
    }
}

impl Decode for () {
    fn decode(_decoder: &mut Decoder) -> Result<Self> {
        Ok(())
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode(decoder: &mut Decoder) -> Result<Self> {
        T::decode(decoder).map(Box::new)
    }
}
