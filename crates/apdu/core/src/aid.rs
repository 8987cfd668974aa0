//! Application identifiers

use std::fmt;

use bytes::Bytes;

use crate::error::CodecError;

/// Application identifier, 5 to 16 bytes. Equality is byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Aid(Bytes);

impl Aid {
    /// Create an AID, validating the length.
    pub fn new(value: impl Into<Bytes>) -> Result<Self, CodecError> {
        let value = value.into();
        if value.len() < 5 || value.len() > 16 {
            return Err(CodecError::BadAidLength(value.len()));
        }
        Ok(Self(value))
    }

    /// Parse an AID from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s).map_err(|_| CodecError::InvalidHex)?;
        Self::new(bytes)
    }

    /// The registered application provider identifier (first 5 bytes).
    pub fn rid(&self) -> &[u8] {
        &self.0[..5]
    }

    /// Raw bytes of the AID.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Aid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Aid {
    type Error = CodecError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::new(Bytes::copy_from_slice(value))
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_aid_length_bounds() {
        assert!(Aid::new(hex!("A000000003").to_vec()).is_ok());
        assert!(Aid::new(hex!("A0000000030000000000000000000000").to_vec()).is_ok());
        assert!(matches!(
            Aid::new(hex!("A0000000").to_vec()),
            Err(CodecError::BadAidLength(4))
        ));
        assert!(matches!(
            Aid::new(vec![0u8; 17]),
            Err(CodecError::BadAidLength(17))
        ));
    }

    #[test]
    fn test_aid_rid_and_equality() {
        let a = Aid::from_hex("a000000151000000").unwrap();
        let b = Aid::new(hex!("A000000151000000").to_vec()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rid(), &hex!("A000000151"));
        assert_eq!(a.to_string(), "a000000151000000");
    }
}
