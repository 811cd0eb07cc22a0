//! Length-prefixed fields and fixed-width scalars.
//!
//! Every variable-length value on the wire is a *field*: a 4-byte
//! **little-endian** `u32` length followed by that many bytes. Scalars are
//! written raw.
//!
//! ```text
//! field:  +----------------+-----------------+
//!         | Length (4B LE) | Payload         |
//!         +----------------+-----------------+
//! u8:     1 byte
//! bool:   1 byte, 0 or 1
//! f64:    8 bytes, LE IEEE-754
//! ```
//!
//! Reads either fully succeed or fail with a terminal [`FrameError`]. Nothing
//! here buffers, retries or flushes; the session flushes once per response.

use std::io::{ErrorKind, Read, Write};

use thiserror::Error;

/// Largest field payload accepted by [`read_field`] (64 MiB).
pub const MAX_FIELD_SIZE: usize = 64 * 1024 * 1024;

/// Terminal failures of the frame codec.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended where a byte was expected.
    #[error("unexpected EOF")]
    Eof,

    #[error("unexpected EOF reading field length")]
    EofReadingLength,

    #[error("unexpected EOF reading field value")]
    EofReadingValue,

    #[error("field of {size} bytes exceeds maximum {max}")]
    FieldTooLarge { size: usize, max: usize },

    #[error("field is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the peer simply went away, as opposed to sending garbage.
    pub fn is_eof(&self) -> bool {
        match self {
            Self::Eof | Self::EofReadingLength | Self::EofReadingValue => true,
            Self::Io(e) => is_disconnect_kind(e.kind()),
            _ => false,
        }
    }
}

/// IO error kinds that mean the peer closed or dropped the connection.
pub(crate) const fn is_disconnect_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

fn read_exact_or(reader: &mut impl Read, buf: &mut [u8], eof: FrameError) -> Result<(), FrameError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(eof),
        Err(e) => Err(FrameError::Io(e)),
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Read exactly one byte.
pub fn read_byte(reader: &mut impl Read) -> Result<u8, FrameError> {
    let mut buf = [0u8; 1];
    read_exact_or(reader, &mut buf, FrameError::Eof)?;
    Ok(buf[0])
}

pub fn write_byte(writer: &mut impl Write, value: u8) -> Result<(), FrameError> {
    writer.write_all(&[value])?;
    Ok(())
}

pub fn read_u32(reader: &mut impl Read) -> Result<u32, FrameError> {
    let mut buf = [0u8; 4];
    read_exact_or(reader, &mut buf, FrameError::Eof)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn write_u32(writer: &mut impl Write, value: u32) -> Result<(), FrameError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_f64(reader: &mut impl Read) -> Result<f64, FrameError> {
    let mut buf = [0u8; 8];
    read_exact_or(reader, &mut buf, FrameError::Eof)?;
    Ok(f64::from_le_bytes(buf))
}

pub fn write_f64(writer: &mut impl Write, value: f64) -> Result<(), FrameError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Read a bool byte. Anything other than 0 or 1 is rejected.
pub fn read_bool(reader: &mut impl Read) -> Result<bool, FrameError> {
    match read_byte(reader)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(FrameError::InvalidBool(other)),
    }
}

pub fn write_bool(writer: &mut impl Write, value: bool) -> Result<(), FrameError> {
    write_byte(writer, u8::from(value))
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Read a length-prefixed field.
///
/// The declared length is checked against [`MAX_FIELD_SIZE`] before the
/// payload buffer is allocated.
pub fn read_field(reader: &mut impl Read) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    read_exact_or(reader, &mut len_buf, FrameError::EofReadingLength)?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FIELD_SIZE {
        return Err(FrameError::FieldTooLarge {
            size: len,
            max: MAX_FIELD_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    read_exact_or(reader, &mut payload, FrameError::EofReadingValue)?;
    Ok(payload)
}

/// Write a length-prefixed field.
pub fn write_field(writer: &mut impl Write, data: &[u8]) -> Result<(), FrameError> {
    if data.len() > MAX_FIELD_SIZE {
        return Err(FrameError::FieldTooLarge {
            size: data.len(),
            max: MAX_FIELD_SIZE,
        });
    }
    let len = u32::try_from(data.len()).map_err(|_| FrameError::FieldTooLarge {
        size: data.len(),
        max: MAX_FIELD_SIZE,
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(data)?;
    Ok(())
}

/// Read a field holding UTF-8 text.
pub fn read_field_str(reader: &mut impl Read) -> Result<String, FrameError> {
    String::from_utf8(read_field(reader)?).map_err(|_| FrameError::InvalidUtf8)
}

pub fn write_field_str(writer: &mut impl Write, text: &str) -> Result<(), FrameError> {
    write_field(writer, text.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn length_prefix_is_little_endian() {
        let mut buf = Vec::new();
        write_field(&mut buf, b"abc").unwrap();
        assert_eq!(buf, [3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn empty_field_roundtrip() {
        let mut buf = Vec::new();
        write_field_str(&mut buf, "").unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
        assert_eq!(read_field_str(&mut Cursor::new(buf)).unwrap(), "");
    }

    #[test]
    fn eof_before_length() {
        let err = read_field(&mut Cursor::new(vec![1, 0])).unwrap_err();
        assert!(matches!(err, FrameError::EofReadingLength));
        assert!(err.is_eof());
    }

    #[test]
    fn eof_inside_value() {
        let err = read_field(&mut Cursor::new(vec![4, 0, 0, 0, 1, 2])).unwrap_err();
        assert!(matches!(err, FrameError::EofReadingValue));
    }

    #[test]
    fn eof_reading_byte() {
        let err = read_byte(&mut Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, FrameError::Eof));
    }

    #[test]
    fn oversized_length_is_rejected_before_reading() {
        let fake_len = (u32::try_from(MAX_FIELD_SIZE).unwrap() + 1).to_le_bytes();
        let err = read_field(&mut Cursor::new(fake_len.to_vec())).unwrap_err();
        assert!(matches!(err, FrameError::FieldTooLarge { .. }));
        assert!(!err.is_eof());
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut buf = Vec::new();
        write_field(&mut buf, &[0xff, 0xfe]).unwrap();
        let err = read_field_str(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8));
    }

    #[test]
    fn bool_bytes() {
        let mut buf = Vec::new();
        write_bool(&mut buf, true).unwrap();
        write_bool(&mut buf, false).unwrap();
        buf.push(2);
        let mut cursor = Cursor::new(buf);
        assert!(read_bool(&mut cursor).unwrap());
        assert!(!read_bool(&mut cursor).unwrap());
        assert!(matches!(
            read_bool(&mut cursor).unwrap_err(),
            FrameError::InvalidBool(2)
        ));
    }

    #[test]
    fn f64_is_little_endian() {
        let mut buf = Vec::new();
        write_f64(&mut buf, 1.0).unwrap();
        assert_eq!(buf, 1.0f64.to_le_bytes());
        assert!((read_f64(&mut Cursor::new(buf)).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn multiple_fields_in_sequence() {
        let mut buf = Vec::new();
        write_field_str(&mut buf, "reset").unwrap();
        write_u32(&mut buf, 7).unwrap();
        write_field_str(&mut buf, "step").unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_field_str(&mut cursor).unwrap(), "reset");
        assert_eq!(read_u32(&mut cursor).unwrap(), 7);
        assert_eq!(read_field_str(&mut cursor).unwrap(), "step");
        assert!(read_byte(&mut cursor).unwrap_err().is_eof());
    }

    proptest! {
        #[test]
        fn field_roundtrip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let mut buf = Vec::new();
            write_field(&mut buf, &data).unwrap();
            prop_assert_eq!(buf.len(), data.len() + 4);
            let mut cursor = Cursor::new(buf);
            prop_assert_eq!(read_field(&mut cursor).unwrap(), data);
        }

        #[test]
        fn str_field_roundtrip(text in ".*") {
            let mut buf = Vec::new();
            write_field_str(&mut buf, &text).unwrap();
            prop_assert_eq!(read_field_str(&mut Cursor::new(buf)).unwrap(), text);
        }

        #[test]
        fn f64_roundtrip_is_bit_exact(value in any::<f64>()) {
            let mut buf = Vec::new();
            write_f64(&mut buf, value).unwrap();
            let back = read_f64(&mut Cursor::new(buf)).unwrap();
            prop_assert_eq!(back.to_bits(), value.to_bits());
        }
    }
}
