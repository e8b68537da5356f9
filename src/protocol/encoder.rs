use crate::position::{BlockPosition, Vec2, Vec3};
use uuid::Uuid;

/// A raw encoder for a Bedrock bitstream.
#[derive(Debug)]
pub struct Encoder<'a> {
    buffer: &'a mut Vec<u8>,
}

impl<'a> Encoder<'a> {
    /// Creates an encoder that will append to the provided
    /// byte buffer.
    ///
    /// Any existing contents of `buffer` are left untouched.
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        Self { buffer }
    }

    pub fn write_u8(&mut self, x: u8) {
        self.buffer.push(x);
    }

    pub fn write_i8(&mut self, x: i8) {
        self.write_u8(bytemuck::cast(x));
    }

    pub fn write_u16(&mut self, x: u16) {
        self.buffer.extend(x.to_le_bytes());
    }

    pub fn write_i16(&mut self, x: i16) {
        self.buffer.extend(x.to_le_bytes());
    }

    pub fn write_u32(&mut self, x: u32) {
        self.buffer.extend(x.to_le_bytes());
    }

    pub fn write_i32(&mut self, x: i32) {
        self.buffer.extend(x.to_le_bytes());
    }

    /// Writes a big-endian signed int.
    pub fn write_i32_be(&mut self, x: i32) {
        self.buffer.extend(x.to_be_bytes());
    }

    pub fn write_u64(&mut self, x: u64) {
        self.buffer.extend(x.to_le_bytes());
    }

    pub fn write_i64(&mut self, x: i64) {
        self.buffer.extend(x.to_le_bytes());
    }

    pub fn write_f32(&mut self, x: f32) {
        self.buffer.extend(x.to_le_bytes());
    }

    pub fn write_bool(&mut self, x: bool) {
        self.write_u8(if x { 0x01 } else { 0x00 });
    }

    /// Writes a series of bytes to the stream. Does not write
    /// any sort of length prefix.
    pub fn write_slice(&mut self, slice: &[u8]) {
        self.buffer.extend_from_slice(slice);
    }

    /// Writes an unsigned 32-bit VarInt. Returns the number of bytes written.
    pub fn write_var_u32(&mut self, x: u32) -> usize {
        self.write_var(u64::from(x))
    }

    /// Writes an unsigned 64-bit VarInt. Returns the number of bytes written.
    pub fn write_var_u64(&mut self, x: u64) -> usize {
        self.write_var(x)
    }

    /// Writes a zigzag-encoded signed 32-bit VarInt.
    pub fn write_var_i32(&mut self, x: i32) -> usize {
        let zigzag: u32 = bytemuck::cast((x << 1) ^ (x >> 31));
        self.write_var_u32(zigzag)
    }

    /// Writes a zigzag-encoded signed 64-bit VarInt.
    pub fn write_var_i64(&mut self, x: i64) -> usize {
        let zigzag: u64 = bytemuck::cast((x << 1) ^ (x >> 63));
        self.write_var_u64(zigzag)
    }

    fn write_var(&mut self, mut x: u64) -> usize {
        let mut bytes_written = 0;
        loop {
            let mut temp = (x & 0b0111_1111) as u8;
            x >>= 7;
            if x != 0 {
                temp |= 0b1000_0000;
            }

            self.buffer.push(temp);
            bytes_written += 1;

            if x == 0 {
                break bytes_written;
            }
        }
    }

    /// Writes a varuint-prefixed string to the stream.
    pub fn write_string(&mut self, x: &str) {
        self.write_var_u32(x.len().try_into().unwrap_or(u32::MAX));
        self.buffer.extend_from_slice(x.as_bytes());
    }

    /// Writes a string prefixed with its little-endian i32 length.
    pub fn write_long_string(&mut self, x: &str) {
        self.write_i32(x.len().try_into().unwrap_or(i32::MAX));
        self.buffer.extend_from_slice(x.as_bytes());
    }
}

/// A type that can be written to an [`Encoder`].
pub trait Encode {
    fn encode(&self, encoder: &mut Encoder);
}

impl Encode for u8 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_u8(*self);
    }
}

impl Encode for i8 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i8(*self);
    }
}

impl Encode for u16 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_u16(*self);
    }
}

impl Encode for i16 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i16(*self);
    }
}

impl Encode for u32 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_u32(*self);
    }
}

impl Encode for i32 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i32(*self);
    }
}

impl Encode for u64 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_u64(*self);
    }
}

impl Encode for i64 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_i64(*self);
    }
}

impl Encode for f32 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_f32(*self);
    }
}

impl Encode for bool {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_bool(*self);
    }
}

impl Encode for String {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_string(self);
    }
}

impl Encode for Uuid {
    fn encode(&self, encoder: &mut Encoder) {
        let (most, least) = self.as_u64_pair();
        encoder.write_u64(most);
        encoder.write_u64(least);
    }
}

impl Encode for Vec3 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_f32(self.x);
        encoder.write_f32(self.y);
        encoder.write_f32(self.z);
    }
}

impl Encode for Vec2 {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_f32(self.x);
        encoder.write_f32(self.y);
    }
}

impl Encode for BlockPosition {
    fn encode(&self, encoder: &mut Encoder) {
        encoder.write_var_i32(self.x);
        encoder.write_var_u32(bytemuck::cast(self.y));
        encoder.write_var_i32(self.z);
    }
}

impl Encode for () {
    fn encode(&self, _encoder: &mut Encoder) {}
}

impl<T: Encode> Encode for Box<T> {
    fn encode(&self, encoder: &mut Encoder) {
        (**self).encode(encoder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Decoder;

    #[test]
    fn zigzag_varints_match_the_wire_format() {
        let mut buf = Vec::new();
        let mut encoder = Encoder::new(&mut buf);
        encoder.write_var_i32(1);
        encoder.write_var_i32(-1);
        encoder.write_var_i32(2);
        assert_eq!(buf, [0x02, 0x01, 0x04]);

        let mut decoder = Decoder::new(&buf);
        assert_eq!(decoder.read_var_i32().unwrap(), 1);
        assert_eq!(decoder.read_var_i32().unwrap(), -1);
        assert_eq!(decoder.read_var_i32().unwrap(), 2);
        assert!(decoder.is_finished());
    }

    #[test]
    fn wide_varlongs_survive_the_codec() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).write_var_i64(i64::MIN);
        Encoder::new(&mut buf).write_var_u64(u64::MAX);

        let mut decoder = Decoder::new(&buf);
        assert_eq!(decoder.read_var_i64().unwrap(), i64::MIN);
        assert_eq!(decoder.read_var_u64().unwrap(), u64::MAX);
    }

    #[test]
    fn truncated_string_is_an_end_of_stream() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).write_string("minecraft:stone");
        buf.truncate(6);
        let err = Decoder::new(&buf).read_string().unwrap_err();
        assert!(matches!(err, crate::protocol::DecodeError::EndOfStream(_)));
    }
}
