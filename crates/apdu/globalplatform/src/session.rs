//! SCP02 key material and session-key derivation
//!
//! Static key sets are indexed by the card's key version; session keys are
//! derived per handshake from the card's sequence counter and destroyed when
//! the secure channel is reset.

use std::collections::BTreeMap;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{self, Key16, MacBlock};
use crate::error::Result;

/// Derivation constant for the session ENC key
const DERIVATION_ENC: [u8; 2] = [0x01, 0x82];
/// Derivation constant for the session MAC key
const DERIVATION_MAC: [u8; 2] = [0x01, 0x01];
/// Derivation constant for the session DEK key
const DERIVATION_DEK: [u8; 2] = [0x01, 0x81];

/// Key version assumed when the card does not mandate a specific one
pub const DEFAULT_KEY_VERSION: u8 = 0xFF;

/// The GlobalPlatform test key (40 41 .. 4F)
pub const DEFAULT_TEST_KEY: Key16 = [
    0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E,
    0x4F,
];

/// A static ENC/MAC/DEK key set shared with the card.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySet {
    enc: Key16,
    mac: Key16,
    dek: Key16,
}

impl KeySet {
    /// Create a key set from its three components.
    pub const fn new(enc: Key16, mac: Key16, dek: Key16) -> Self {
        Self { enc, mac, dek }
    }

    /// Create a key set where all three keys are the same.
    pub const fn from_single_key(key: Key16) -> Self {
        Self {
            enc: key,
            mac: key,
            dek: key,
        }
    }

    /// The static encryption key.
    pub const fn enc(&self) -> &Key16 {
        &self.enc
    }

    /// The static MAC key.
    pub const fn mac(&self) -> &Key16 {
        &self.mac
    }

    /// The static data encryption key.
    pub const fn dek(&self) -> &Key16 {
        &self.dek
    }
}

impl Default for KeySet {
    fn default() -> Self {
        Self::from_single_key(DEFAULT_TEST_KEY)
    }
}

/// The default static key sets: the GlobalPlatform test key under the
/// default key version.
pub fn default_keysets() -> BTreeMap<u8, KeySet> {
    BTreeMap::from([(DEFAULT_KEY_VERSION, KeySet::default())])
}

/// Session keys derived for one secure channel session.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    enc: Key16,
    mac: Key16,
    dek: Key16,
}

impl SessionKeys {
    /// Derive the ENC, MAC and DEK session keys from a static key set and
    /// the card's sequence counter.
    ///
    /// Each key is the 3DES-CBC encryption of
    /// `constant ‖ sequence counter ‖ 12 zero bytes` under the matching
    /// static key, with a per-key derivation constant.
    pub fn derive(keys: &KeySet, sequence_counter: &[u8; 2]) -> Result<Self> {
        Ok(Self {
            enc: derive_session_key(keys.enc(), &DERIVATION_ENC, sequence_counter)?,
            mac: derive_session_key(keys.mac(), &DERIVATION_MAC, sequence_counter)?,
            dek: derive_session_key(keys.dek(), &DERIVATION_DEK, sequence_counter)?,
        })
    }

    /// The session encryption key.
    pub const fn enc(&self) -> &Key16 {
        &self.enc
    }

    /// The session MAC key.
    pub const fn mac(&self) -> &Key16 {
        &self.mac
    }

    /// The session data encryption key.
    pub const fn dek(&self) -> &Key16 {
        &self.dek
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(enc: Key16, mac: Key16, dek: Key16) -> Self {
        Self { enc, mac, dek }
    }
}

fn derive_session_key(static_key: &Key16, constant: &[u8; 2], seq: &[u8; 2]) -> Result<Key16> {
    let mut input = [0u8; 16];
    input[..2].copy_from_slice(constant);
    input[2..4].copy_from_slice(seq);

    let derived = crypto::tdes_cbc_encrypt(static_key, &[0u8; 8], &input)?;
    let mut key = [0u8; 16];
    key.copy_from_slice(&derived);
    Ok(key)
}

/// The cryptogram the card must present:
/// retail MAC of `host challenge ‖ sequence counter ‖ card challenge` under
/// the session ENC key.
pub fn card_cryptogram(
    enc: &Key16,
    sequence_counter: &[u8; 2],
    card_challenge: &[u8; 6],
    host_challenge: &[u8; 8],
) -> Result<MacBlock> {
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(host_challenge);
    data.extend_from_slice(sequence_counter);
    data.extend_from_slice(card_challenge);
    crypto::tdes_mac_padded(enc, &data)
}

/// The cryptogram the host presents in EXTERNAL AUTHENTICATE:
/// retail MAC of `sequence counter ‖ card challenge ‖ host challenge` under
/// the session ENC key.
pub fn host_cryptogram(
    enc: &Key16,
    sequence_counter: &[u8; 2],
    card_challenge: &[u8; 6],
    host_challenge: &[u8; 8],
) -> Result<MacBlock> {
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(sequence_counter);
    data.extend_from_slice(card_challenge);
    data.extend_from_slice(host_challenge);
    crypto::tdes_mac_padded(enc, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_derive_session_key() {
        let derived = derive_session_key(&DEFAULT_TEST_KEY, &DERIVATION_ENC, &hex!("0065")).unwrap();
        assert_eq!(derived, hex!("85e72aaf47874218a202bf5ef891dd21"));
    }

    #[test]
    fn test_derivation_is_reproducible() {
        let keys = KeySet::default();
        let seq = hex!("000d");
        let a = SessionKeys::derive(&keys, &seq).unwrap();
        let b = SessionKeys::derive(&keys, &seq).unwrap();
        assert_eq!(a.enc(), b.enc());
        assert_eq!(a.mac(), b.mac());
        assert_eq!(a.dek(), b.dek());
        // distinct constants give distinct keys
        assert_ne!(a.enc(), a.mac());
        assert_ne!(a.enc(), a.dek());
    }

    #[test]
    fn test_card_cryptogram_vector() {
        let enc = hex!("16b5867ff50be7239c2bf1245b83a362");
        let cryptogram = card_cryptogram(
            &enc,
            &hex!("0072"),
            &hex!("84f64a7d6465"),
            &hex!("32da078d7aac1cff"),
        )
        .unwrap();
        assert_eq!(cryptogram, hex!("05c4bb8a86014e22"));
    }

    #[test]
    fn test_host_cryptogram_differs_from_card() {
        let enc = hex!("16b5867ff50be7239c2bf1245b83a362");
        let seq = hex!("0072");
        let card_ch = hex!("84f64a7d6465");
        let host_ch = hex!("32da078d7aac1cff");
        let card = card_cryptogram(&enc, &seq, &card_ch, &host_ch).unwrap();
        let host = host_cryptogram(&enc, &seq, &card_ch, &host_ch).unwrap();
        assert_ne!(card, host);
    }
}
