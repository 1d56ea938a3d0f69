//! Symmetric binary cursor used by packet marshal contracts.
//!
//! A packet describes its own encoding once: `marshal` takes `&mut`
//! references to each field and an abstract [`Wire`] cursor, so the same
//! body reads fields when the cursor is a [`WireReader`] and writes them
//! when it is a [`WireWriter`]. All numerics are little-endian; strings and
//! byte blobs carry a 4-byte little-endian length prefix.

use bytes::{BufMut, BytesMut};

/// Errors produced while reading or writing packet fields.
#[derive(Debug, PartialEq, Eq)]
pub enum WireError {
    /// The cursor ran out of bytes mid-field.
    UnexpectedEof {
        /// Bytes the field needed.
        needed: usize,
        /// Bytes left in the cursor.
        remaining: usize,
    },
    /// A string field held invalid UTF-8.
    InvalidUtf8,
    /// A string or byte blob was too large for its length prefix.
    Oversize(usize),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof { needed, remaining } => {
                write!(f, "needed {needed} bytes, {remaining} remaining")
            }
            Self::InvalidUtf8 => f.write_str("string field is not valid UTF-8"),
            Self::Oversize(len) => write!(f, "field of {len} bytes exceeds length prefix"),
        }
    }
}

impl std::error::Error for WireError {}

/// Abstract cursor a packet marshals its fields against.
pub trait Wire {
    /// Marshal a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy the field.
    fn u32(&mut self, v: &mut u32) -> Result<(), WireError>;

    /// Marshal a little-endian `u64`.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy the field.
    fn u64(&mut self, v: &mut u64) -> Result<(), WireError>;

    /// Marshal a little-endian `i32`.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy the field.
    fn i32(&mut self, v: &mut i32) -> Result<(), WireError>;

    /// Marshal a little-endian IEEE-754 `f32`.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy the field.
    fn f32(&mut self, v: &mut f32) -> Result<(), WireError>;

    /// Marshal a single-byte boolean (zero is false, anything else true).
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy the field.
    fn bool(&mut self, v: &mut bool) -> Result<(), WireError>;

    /// Marshal a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy the field or the
    /// bytes are not valid UTF-8.
    fn string(&mut self, v: &mut String) -> Result<(), WireError>;

    /// Marshal a length-prefixed byte blob.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy the field.
    fn bytes(&mut self, v: &mut Vec<u8>) -> Result<(), WireError>;

    /// Marshal three little-endian `f32` components.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy the field.
    fn vec3(&mut self, v: &mut [f32; 3]) -> Result<(), WireError> {
        for component in v {
            self.f32(component)?;
        }
        Ok(())
    }
}

/// Decoding cursor over a byte slice.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader positioned at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self { Self { buf, pos: 0 } }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < needed {
            return Err(WireError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn length_prefixed(&mut self) -> Result<&'a [u8], WireError> {
        let mut len = 0u32;
        self.u32(&mut len)?;
        self.take(len as usize)
    }
}

impl Wire for WireReader<'_> {
    fn u32(&mut self, v: &mut u32) -> Result<(), WireError> {
        let bytes = self.take(4)?;
        *v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(())
    }

    fn u64(&mut self, v: &mut u64) -> Result<(), WireError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        *v = u64::from_le_bytes(raw);
        Ok(())
    }

    fn i32(&mut self, v: &mut i32) -> Result<(), WireError> {
        let bytes = self.take(4)?;
        *v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(())
    }

    fn f32(&mut self, v: &mut f32) -> Result<(), WireError> {
        let mut bits = 0u32;
        self.u32(&mut bits)?;
        *v = f32::from_bits(bits);
        Ok(())
    }

    fn bool(&mut self, v: &mut bool) -> Result<(), WireError> {
        let bytes = self.take(1)?;
        *v = bytes[0] != 0;
        Ok(())
    }

    fn string(&mut self, v: &mut String) -> Result<(), WireError> {
        let bytes = self.length_prefixed()?;
        *v = std::str::from_utf8(bytes)
            .map_err(|_| WireError::InvalidUtf8)?
            .to_owned();
        Ok(())
    }

    fn bytes(&mut self, v: &mut Vec<u8>) -> Result<(), WireError> {
        let bytes = self.length_prefixed()?;
        *v = bytes.to_vec();
        Ok(())
    }
}

/// Encoding cursor appending to a [`BytesMut`].
pub struct WireWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> WireWriter<'a> {
    /// Create a writer appending to `buf`.
    pub fn new(buf: &'a mut BytesMut) -> Self { Self { buf } }

    fn prefix(&mut self, len: usize) -> Result<(), WireError> {
        let mut len = u32::try_from(len).map_err(|_| WireError::Oversize(len))?;
        self.u32(&mut len)
    }
}

impl Wire for WireWriter<'_> {
    fn u32(&mut self, v: &mut u32) -> Result<(), WireError> {
        self.buf.put_u32_le(*v);
        Ok(())
    }

    fn u64(&mut self, v: &mut u64) -> Result<(), WireError> {
        self.buf.put_u64_le(*v);
        Ok(())
    }

    fn i32(&mut self, v: &mut i32) -> Result<(), WireError> {
        self.buf.put_i32_le(*v);
        Ok(())
    }

    fn f32(&mut self, v: &mut f32) -> Result<(), WireError> {
        self.buf.put_u32_le(v.to_bits());
        Ok(())
    }

    fn bool(&mut self, v: &mut bool) -> Result<(), WireError> {
        self.buf.put_u8(u8::from(*v));
        Ok(())
    }

    fn string(&mut self, v: &mut String) -> Result<(), WireError> {
        self.prefix(v.len())?;
        self.buf.extend_from_slice(v.as_bytes());
        Ok(())
    }

    fn bytes(&mut self, v: &mut Vec<u8>) -> Result<(), WireError> {
        self.prefix(v.len())?;
        self.buf.extend_from_slice(v);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip_through_both_cursors() {
        let mut buf = BytesMut::new();
        let mut writer = WireWriter::new(&mut buf);

        let mut a = 0xdead_beef_u32;
        let mut b = -42_i32;
        let mut c = 1.5_f32;
        let mut d = true;
        let mut e = String::from("token");
        let mut g = vec![1u8, 2, 3];
        let mut h = [0.0_f32, -1.0, 2.5];
        writer.u32(&mut a).unwrap();
        writer.i32(&mut b).unwrap();
        writer.f32(&mut c).unwrap();
        writer.bool(&mut d).unwrap();
        writer.string(&mut e).unwrap();
        writer.bytes(&mut g).unwrap();
        writer.vec3(&mut h).unwrap();

        let mut reader = WireReader::new(&buf);
        let (mut a2, mut b2, mut c2, mut d2) = (0u32, 0i32, 0f32, false);
        let mut e2 = String::new();
        let mut g2 = Vec::new();
        let mut h2 = [0.0_f32; 3];
        reader.u32(&mut a2).unwrap();
        reader.i32(&mut b2).unwrap();
        reader.f32(&mut c2).unwrap();
        reader.bool(&mut d2).unwrap();
        reader.string(&mut e2).unwrap();
        reader.bytes(&mut g2).unwrap();
        reader.vec3(&mut h2).unwrap();

        assert_eq!((a2, b2, c2, d2), (a, b, c, d));
        assert_eq!(e2, "token");
        assert_eq!(g2, vec![1, 2, 3]);
        assert_eq!(h2, h);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn short_reads_fail_with_eof() {
        let mut reader = WireReader::new(&[1, 2]);
        let mut v = 0u32;
        assert_eq!(
            reader.u32(&mut v),
            Err(WireError::UnexpectedEof {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn truncated_string_fails_with_eof() {
        let mut buf = BytesMut::new();
        let mut len = 10u32;
        WireWriter::new(&mut buf).u32(&mut len).unwrap();
        buf.extend_from_slice(b"abc");

        let mut reader = WireReader::new(&buf);
        let mut s = String::new();
        assert!(matches!(
            reader.string(&mut s),
            Err(WireError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut buf = BytesMut::new();
        let mut raw = vec![0xff, 0xfe];
        WireWriter::new(&mut buf).bytes(&mut raw).unwrap();

        let mut reader = WireReader::new(&buf);
        let mut s = String::new();
        assert_eq!(reader.string(&mut s), Err(WireError::InvalidUtf8));
    }
}
