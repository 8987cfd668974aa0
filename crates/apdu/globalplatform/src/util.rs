//! Length-value encoding helpers

use crate::error::{Error, Result};

/// Encode data with a BER length prefix: short form below 0x80, `81 xx` up
/// to 255 bytes, `82 xx xx` up to 65535 bytes.
pub fn lv_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() + 3);
    match data.len() {
        len @ 0..0x80 => out.push(len as u8),
        len @ 0x80..0x100 => {
            out.push(0x81);
            out.push(len as u8);
        }
        len @ 0x100..0x1_0000 => {
            out.push(0x82);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => return Err(Error::LvTooLong(len)),
    }
    out.extend_from_slice(data);
    Ok(out)
}

/// Encode a single-byte tag followed by the LV encoding of the value.
pub fn tlv_bytes(tag: u8, value: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![tag];
    out.extend(lv_bytes(value)?);
    Ok(out)
}
