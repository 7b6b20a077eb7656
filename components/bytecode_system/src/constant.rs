//! Constant pool entries

use crate::error::DecodeError;

/// A compile-time constant referenced by `LoadConst`
///
/// Strings are stored in the unit's string table and referenced by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// A number
    Number(f64),
    /// A string-table entry
    String(u32),
}

impl Constant {
    /// Appends the serialized constant to `bytes`.
    pub fn write_to(&self, bytes: &mut Vec<u8>) {
        match *self {
            Constant::Undefined => bytes.push(0),
            Constant::Null => bytes.push(1),
            Constant::Boolean(b) => {
                bytes.push(2);
                bytes.push(b as u8);
            }
            Constant::Number(n) => {
                bytes.push(3);
                bytes.extend_from_slice(&n.to_le_bytes());
            }
            Constant::String(index) => {
                bytes.push(4);
                bytes.extend_from_slice(&index.to_le_bytes());
            }
        }
    }

    /// Reads a constant from the front of `bytes`, returning it and the
    /// number of bytes consumed.
    pub fn read_from(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let short = || DecodeError::InvalidImage("truncated constant".to_string());
        let tag = *bytes.first().ok_or_else(short)?;
        match tag {
            0 => Ok((Constant::Undefined, 1)),
            1 => Ok((Constant::Null, 1)),
            2 => {
                let b = *bytes.get(1).ok_or_else(short)?;
                Ok((Constant::Boolean(b != 0), 2))
            }
            3 => {
                let raw: [u8; 8] = bytes
                    .get(1..9)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(short)?;
                Ok((Constant::Number(f64::from_le_bytes(raw)), 9))
            }
            4 => {
                let raw: [u8; 4] = bytes
                    .get(1..5)
                    .and_then(|s| s.try_into().ok())
                    .ok_or_else(short)?;
                Ok((Constant::String(u32::from_le_bytes(raw)), 5))
            }
            _ => Err(DecodeError::InvalidImage(format!(
                "unknown constant tag {}",
                tag
            ))),
        }
    }
}
