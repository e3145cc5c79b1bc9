use serde::{Deserialize, Serialize};

use crate::buffer::{NetBuffer, NetReader};
use crate::error::BufferError;

/// A type with a canonical wire encoding, usable inside a `NetworkVariable`.
pub trait NetValue: Clone + PartialEq + Send + 'static {
    fn write(&self, buf: &mut NetBuffer) -> Result<(), BufferError>;
    fn read(reader: &mut NetReader<'_>) -> Result<Self, BufferError>;

    /// Equality used for change detection.
    fn same(&self, other: &Self) -> bool {
        self == other
    }
}

impl NetValue for i32 {
    fn write(&self, buf: &mut NetBuffer) -> Result<(), BufferError> {
        buf.write_i32(*self)
    }

    fn read(reader: &mut NetReader<'_>) -> Result<Self, BufferError> {
        reader.read_i32()
    }
}

impl NetValue for f32 {
    fn write(&self, buf: &mut NetBuffer) -> Result<(), BufferError> {
        buf.write_f32(*self)
    }

    fn read(reader: &mut NetReader<'_>) -> Result<Self, BufferError> {
        reader.read_f32()
    }

    // Bitwise, so NaN matches NaN and 0.0 differs from -0.0.
    fn same(&self, other: &Self) -> bool {
        canonical_bits(*self) == canonical_bits(*other)
    }
}

fn canonical_bits(value: f32) -> u32 {
    if value.is_nan() {
        f32::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl NetValue for bool {
    fn write(&self, buf: &mut NetBuffer) -> Result<(), BufferError> {
        buf.write_bool(*self)
    }

    fn read(reader: &mut NetReader<'_>) -> Result<Self, BufferError> {
        reader.read_bool()
    }
}

impl NetValue for String {
    fn write(&self, buf: &mut NetBuffer) -> Result<(), BufferError> {
        buf.write_string(self)
    }

    fn read(reader: &mut NetReader<'_>) -> Result<Self, BufferError> {
        reader.read_string()
    }
}

/// 8-bit RGBA color, sent as a packed RGBA8888 int.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const GRAY: Color = Color::rgb(127, 127, 127);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn to_rgba8888(self) -> i32 {
        i32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    pub fn from_rgba8888(packed: i32) -> Self {
        let [r, g, b, a] = packed.to_be_bytes();
        Self { r, g, b, a }
    }
}

impl NetValue for Color {
    fn write(&self, buf: &mut NetBuffer) -> Result<(), BufferError> {
        buf.write_i32(self.to_rgba8888())
    }

    fn read(reader: &mut NetReader<'_>) -> Result<Self, BufferError> {
        reader.read_i32().map(Color::from_rgba8888)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: NetValue + std::fmt::Debug>(value: T) {
        let mut buf = NetBuffer::new();
        value.write(&mut buf).unwrap();
        let bytes = buf.to_byte_array();
        let mut reader = NetReader::new(&bytes);
        assert_eq!(T::read(&mut reader).unwrap(), value);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_supported_types_roundtrip() {
        roundtrip(i32::MIN);
        roundtrip(-0.25f32);
        roundtrip(false);
        roundtrip(String::from("hull breach"));
        roundtrip(Color::new(12, 34, 56, 78));
    }

    #[test]
    fn test_color_packing_order() {
        assert_eq!(Color::RED.to_rgba8888(), 0xFF0000FFu32 as i32);
        assert_eq!(Color::from_rgba8888(0x00FF00FF), Color::GREEN);
    }
}
