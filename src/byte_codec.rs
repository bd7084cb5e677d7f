//! Endian-fixed primitive codec over a byte sink/source.
//!
//! All integers are big-endian two's complement. Floats use IEEE-754
//! binary32/binary64. Strings are UTF-8 with a 32-bit big-endian byte-length
//! prefix. `char` is encoded as a two-byte UTF-16 code unit (see DESIGN.md
//! for the lossy-surrogate edge case this implies for Rust's 4-byte `char`).

use crate::error::{bail, error, Result};
use std::io::{Read, Write};

/// The only shape the engine requires of an output stream.
pub trait ByteSink {
    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()>;
    fn flush(&mut self) -> std::io::Result<()>;
}

/// The only shape the engine requires of an input stream.
pub trait ByteSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()>;
}

impl<W: Write + ?Sized> ByteSink for W {
    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_all(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Write::flush(self)
    }
}

impl<R: Read + ?Sized> ByteSource for R {
    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.read_exact(buf)
    }
}

macro_rules! fixed_width {
    ($($write:ident / $read:ident : $t:ty),* $(,)?) => {$(
        pub fn $write(sink: &mut dyn ByteSink, n: $t) -> Result<()> {
            sink.write_bytes(&n.to_be_bytes()).map_err(Into::into)
        }

        pub fn $read(source: &mut dyn ByteSource) -> Result<$t> {
            let mut buf = [0u8; std::mem::size_of::<$t>()];
            source.read_bytes(&mut buf)?;
            Ok(<$t>::from_be_bytes(buf))
        }
    )*};
}

fixed_width!(
    write_u8 / read_u8: u8,
    write_i8 / read_i8: i8,
    write_u16 / read_u16: u16,
    write_i16 / read_i16: i16,
    write_i32 / read_i32: i32,
    write_i64 / read_i64: i64,
    write_f32 / read_f32: f32,
    write_f64 / read_f64: f64,
);

pub fn write_bool(sink: &mut dyn ByteSink, b: bool) -> Result<()> {
    sink.write_bytes(&[b as u8]).map_err(Into::into)
}

pub fn read_bool(source: &mut dyn ByteSource) -> Result<bool> {
    let mut buf = [0u8];
    source.read_bytes(&mut buf)?;
    match buf[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => bail!(TypeMismatch, None, "{} is not a valid bool", other),
    }
}

/// `char` is encoded as a two-byte UTF-16 code unit. Characters outside the
/// basic multilingual plane (which Rust's `char` can represent but a single
/// UTF-16 code unit cannot) are rejected at encode time rather than silently
/// truncated.
pub fn write_char(sink: &mut dyn ByteSink, c: char) -> Result<()> {
    let mut units = [0u16; 2];
    let encoded = c.encode_utf16(&mut units);
    if encoded.len() != 1 {
        bail!(
            TypeMismatch,
            None,
            "char {:?} does not fit in a single UTF-16 code unit",
            c,
        );
    }
    write_u16(sink, encoded[0])
}

pub fn read_char(source: &mut dyn ByteSource) -> Result<char> {
    let unit = read_u16(source)?;
    char::decode_utf16(std::iter::once(unit))
        .next()
        .unwrap()
        .map_err(|_| crate::error::Error::new(crate::error::ErrorKind::TypeMismatch, format!("{:#06x} is not a valid UTF-16 code unit", unit), None))
}

pub fn write_len(sink: &mut dyn ByteSink, len: usize) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| crate::error::Error::new(crate::error::ErrorKind::TypeMismatch, format!("length {} does not fit in a 32-bit signed length prefix", len), None))?;
    write_i32(sink, len)
}

pub fn read_len(source: &mut dyn ByteSource) -> Result<usize> {
    let len = read_i32(source)?;
    usize::try_from(len)
        .map_err(|_| crate::error::Error::new(crate::error::ErrorKind::TypeMismatch, format!("negative length prefix {}", len), None))
}

pub fn write_str(sink: &mut dyn ByteSink, s: &str) -> Result<()> {
    write_len(sink, s.len())?;
    sink.write_bytes(s.as_bytes()).map_err(Into::into)
}

pub fn read_str(source: &mut dyn ByteSource) -> Result<String> {
    let len = read_len(source)?;
    let mut buf = vec![0u8; len];
    source.read_bytes(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| crate::error::Error::new(crate::error::ErrorKind::TypeMismatch, "non-UTF8 string bytes".to_string(), None))
}

pub fn write_bytes(sink: &mut dyn ByteSink, b: &[u8]) -> Result<()> {
    write_len(sink, b.len())?;
    sink.write_bytes(b).map_err(Into::into)
}

pub fn read_byte_string(source: &mut dyn ByteSource) -> Result<Vec<u8>> {
    let len = read_len(source)?;
    let mut buf = vec![0u8; len];
    source.read_bytes(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fixed_width() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -12345).unwrap();
        let mut slice = buf.as_slice();
        assert_eq!(read_i32(&mut slice).unwrap(), -12345);
    }

    #[test]
    fn string_uses_be_len_prefix() {
        let mut buf = Vec::new();
        write_str(&mut buf, "hi").unwrap();
        assert_eq!(buf, vec![0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn char_round_trips() {
        let mut buf = Vec::new();
        write_char(&mut buf, 'X').unwrap();
        let mut slice = buf.as_slice();
        assert_eq!(read_char(&mut slice).unwrap(), 'X');
    }
}
