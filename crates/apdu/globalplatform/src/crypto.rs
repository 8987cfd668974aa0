//! Cryptographic primitives for the SCP02 secure channel
//!
//! DES and triple-DES in ECB and CBC modes, ISO 9797-1 padding method 2 and
//! the retail MAC variants SCP02 builds its command integrity on. All
//! primitives operate on the double-length (16-byte) keys GlobalPlatform
//! cards carry; they are widened to the 24-byte EDE3 form internally.

use cbc_mac::{CbcMac, Mac};
use cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    consts::U8,
    generic_array::GenericArray,
};
use des::{Des, TdesEde3};

use crate::error::{Error, Result};

/// DES block size in bytes
pub const BLOCK_SIZE: usize = 8;

/// A double-length (16-byte) DES key as used by SCP02
pub type Key16 = [u8; 16];
/// An 8-byte MAC, ICV or cryptogram block
pub type MacBlock = [u8; 8];

type Block = GenericArray<u8, U8>;

/// Widen a 16-byte 2-key 3DES key to the 24-byte EDE3 form by repeating the
/// first component.
fn widen_key(key: &Key16) -> [u8; 24] {
    let mut out = [0u8; 24];
    out[..16].copy_from_slice(key);
    out[16..].copy_from_slice(&key[..8]);
    out
}

fn to_blocks(data: &[u8]) -> Result<Vec<Block>> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Crypto("data is not block aligned"));
    }
    Ok(data.chunks(BLOCK_SIZE).map(Block::clone_from_slice).collect())
}

/// Append ISO 9797-1 method 2 padding: a 0x80 marker, then zero fill up to
/// the next block boundary.
pub fn pad_9797_2(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    padded.push(0x80);
    padded.resize(padded.len().next_multiple_of(BLOCK_SIZE), 0x00);
    padded
}

/// Remove ISO 9797-1 method 2 padding.
///
/// Scans from the end, skipping zero fill; the first non-zero byte must be
/// the 0x80 marker, anything else is a padding-format error.
pub fn unpad_9797_2(data: &[u8]) -> Result<Vec<u8>> {
    for (i, &byte) in data.iter().enumerate().rev() {
        match byte {
            0x00 => continue,
            0x80 => return Ok(data[..i].to_vec()),
            _ => break,
        }
    }
    Err(Error::Padding)
}

/// Triple-DES CBC encryption of block-aligned data.
pub fn tdes_cbc_encrypt(key: &Key16, iv: &MacBlock, data: &[u8]) -> Result<Vec<u8>> {
    let mut blocks = to_blocks(data)?;
    let key = widen_key(key);
    let mut encryptor =
        cbc::Encryptor::<TdesEde3>::new(GenericArray::from_slice(&key), GenericArray::from_slice(iv));
    encryptor.encrypt_blocks_mut(&mut blocks);
    Ok(blocks.into_iter().flatten().collect())
}

/// Triple-DES CBC decryption of block-aligned data.
pub fn tdes_cbc_decrypt(key: &Key16, iv: &MacBlock, data: &[u8]) -> Result<Vec<u8>> {
    let mut blocks = to_blocks(data)?;
    let key = widen_key(key);
    let mut decryptor =
        cbc::Decryptor::<TdesEde3>::new(GenericArray::from_slice(&key), GenericArray::from_slice(iv));
    decryptor.decrypt_blocks_mut(&mut blocks);
    Ok(blocks.into_iter().flatten().collect())
}

/// Triple-DES ECB encryption of block-aligned data.
pub fn tdes_ecb_encrypt(key: &Key16, data: &[u8]) -> Result<Vec<u8>> {
    let mut blocks = to_blocks(data)?;
    let key = widen_key(key);
    let cipher = TdesEde3::new(GenericArray::from_slice(&key));
    for block in &mut blocks {
        cipher.encrypt_block(block);
    }
    Ok(blocks.into_iter().flatten().collect())
}

/// Triple-DES ECB decryption of block-aligned data.
pub fn tdes_ecb_decrypt(key: &Key16, data: &[u8]) -> Result<Vec<u8>> {
    let mut blocks = to_blocks(data)?;
    let key = widen_key(key);
    let cipher = TdesEde3::new(GenericArray::from_slice(&key));
    for block in &mut blocks {
        cipher.decrypt_block(block);
    }
    Ok(blocks.into_iter().flatten().collect())
}

/// MAC of block-aligned data: the last block of its 3DES-CBC encryption.
pub fn tdes_mac(key: &Key16, iv: &MacBlock, data: &[u8]) -> Result<MacBlock> {
    let encrypted = tdes_cbc_encrypt(key, iv, data)?;
    let mut mac = [0u8; BLOCK_SIZE];
    mac.copy_from_slice(&encrypted[encrypted.len() - BLOCK_SIZE..]);
    Ok(mac)
}

/// MAC of arbitrary data under a zero IV with method 2 padding applied.
/// This is the computation behind the SCP02 card and host cryptograms.
pub fn tdes_mac_padded(key: &Key16, data: &[u8]) -> Result<MacBlock> {
    tdes_mac(key, &[0u8; BLOCK_SIZE], &pad_9797_2(data))
}

/// ISO 9797-1 MAC algorithm 3 ("retail MAC") with method 2 padding.
///
/// All padded blocks but the last are chained with single DES under the
/// first key component; the final block is encrypted with full 3DES.
pub fn retail_mac_alg3(key: &Key16, iv: &MacBlock, data: &[u8]) -> Result<MacBlock> {
    let padded = pad_9797_2(data);

    let mut chain = *iv;
    if padded.len() > BLOCK_SIZE {
        let des = Des::new(GenericArray::from_slice(&key[..8]));
        for chunk in padded[..padded.len() - BLOCK_SIZE].chunks(BLOCK_SIZE) {
            let mut block = Block::clone_from_slice(chunk);
            for (b, c) in block.iter_mut().zip(chain.iter()) {
                *b ^= *c;
            }
            des.encrypt_block(&mut block);
            chain.copy_from_slice(&block);
        }
    }

    tdes_mac(key, &chain, &padded[padded.len() - BLOCK_SIZE..])
}

/// Encrypt a chaining ICV under the first component of the MAC key.
pub fn encrypt_icv(mac_key: &Key16, icv: &MacBlock) -> MacBlock {
    let mut mac = <CbcMac<Des> as Mac>::new(GenericArray::from_slice(&mac_key[..8]));
    mac.update(icv);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_pad_unpad_identity() {
        // identity for every distance from the block boundary
        for len in 0..=24 {
            let data: Vec<u8> = (0..len as u8).collect();
            let padded = pad_9797_2(&data);
            assert_eq!(padded.len() % BLOCK_SIZE, 0);
            assert!(padded.len() > data.len());
            assert_eq!(unpad_9797_2(&padded).unwrap(), data);
        }
    }

    #[test]
    fn test_unpad_rejects_bad_padding() {
        // 0x42 is neither zero fill nor the marker
        assert!(matches!(
            unpad_9797_2(&hex!("0102030405060742")),
            Err(Error::Padding)
        ));
        // all-zero block never reaches a marker
        assert!(matches!(
            unpad_9797_2(&[0u8; 8]),
            Err(Error::Padding)
        ));
    }

    #[test]
    fn test_tdes_ecb_roundtrip() {
        let key = hex!("404142434445464748494a4b4c4d4e4f");
        let data = hex!("00112233445566778899aabbccddeeff");
        let encrypted = tdes_ecb_encrypt(&key, &data).unwrap();
        assert_ne!(encrypted, data);
        assert_eq!(tdes_ecb_decrypt(&key, &encrypted).unwrap(), data);
    }

    #[test]
    fn test_tdes_cbc_roundtrip() {
        let key = hex!("404142434445464748494a4b4c4d4e4f");
        let iv = hex!("0001020304050607");
        let data = hex!("00112233445566778899aabbccddeeff");
        let encrypted = tdes_cbc_encrypt(&key, &iv, &data).unwrap();
        assert_eq!(tdes_cbc_decrypt(&key, &iv, &encrypted).unwrap(), data);
    }

    #[test]
    fn test_unaligned_data_rejected() {
        let key = hex!("404142434445464748494a4b4c4d4e4f");
        assert!(tdes_ecb_encrypt(&key, &hex!("010203")).is_err());
        assert!(tdes_cbc_encrypt(&key, &[0u8; 8], &[]).is_err());
    }

    #[test]
    fn test_retail_mac_alg3() {
        // EXTERNAL AUTHENTICATE header and cryptogram under a session MAC key
        let key = hex!("5b02e75ad63190aece0622936f11abab");
        let data = hex!("8482010010810b098a8fbb88da");
        let mac = retail_mac_alg3(&key, &[0u8; 8], &data).unwrap();
        assert_eq!(mac, hex!("5271d7174a5a166a"));
    }

    #[test]
    fn test_cryptogram_mac() {
        let enc_key = hex!("16b5867ff50be7239c2bf1245b83a362");
        // host challenge || sequence counter || card challenge
        let data = hex!("32da078d7aac1cff 0072 84f64a7d6465");
        let mac = tdes_mac_padded(&enc_key, &data).unwrap();
        assert_eq!(mac, hex!("05c4bb8a86014e22"));
    }
}
