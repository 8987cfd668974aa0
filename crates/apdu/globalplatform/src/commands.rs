//! GlobalPlatform command builders
//!
//! Each builder assembles one command APDU; protection is applied separately
//! by the secure channel wrap.

use bytes::{BufMut, BytesMut};

use jcbench_apdu_core::{Aid, CommandApdu};

use crate::constants::{cla, delete_p2, ins, install_p1, load_p1, select_p1, tags};
use crate::error::Result;
use crate::util::{lv_bytes, tlv_bytes};

/// Fixed privilege and parameter tail of INSTALL [for install and make
/// selectable]: no privileges, default C9 parameters, no token.
const INSTALL_TAIL: [u8; 6] = [0x01, 0x00, 0x02, 0xC9, 0x00, 0x00];

/// SELECT by name. An empty AID selects the default application.
pub fn select(aid: &[u8]) -> Result<CommandApdu> {
    Ok(CommandApdu::new(cla::ISO7816, ins::SELECT, select_p1::BY_NAME, 0x00)
        .with_le_byte(0x00)
        .with_data(aid.to_vec())?)
}

/// INITIALIZE UPDATE carrying the 8-byte host challenge.
pub fn initialize_update(host_challenge: &[u8; 8]) -> Result<CommandApdu> {
    Ok(
        CommandApdu::new(cla::GP, ins::INITIALIZE_UPDATE, 0x00, 0x00)
            .with_data(host_challenge.to_vec())?,
    )
}

/// EXTERNAL AUTHENTICATE; P1 carries the requested secure level.
pub fn external_authenticate(level_p1: u8, host_cryptogram: &[u8; 8]) -> Result<CommandApdu> {
    Ok(
        CommandApdu::new(cla::MAC, ins::EXTERNAL_AUTHENTICATE, level_p1, 0x00)
            .with_data(host_cryptogram.to_vec())?,
    )
}

/// INSTALL [for load]: length-prefixed package AID followed by empty
/// security domain, hash and parameter fields.
pub fn install_for_load(package_aid: &Aid) -> Result<CommandApdu> {
    let mut data = BytesMut::new();
    data.put_slice(&lv_bytes(package_aid.as_bytes())?);
    data.put_slice(&[0x00; 4]);
    Ok(
        CommandApdu::new(cla::GP, ins::INSTALL, install_p1::FOR_LOAD, 0x00)
            .with_data(data.freeze())?,
    )
}

/// INSTALL [for install and make selectable] with the fixed privilege and
/// parameter tail.
pub fn install_for_install(
    package_aid: &Aid,
    applet_aid: &Aid,
    instance_aid: &Aid,
) -> Result<CommandApdu> {
    let mut data = BytesMut::new();
    data.put_slice(&lv_bytes(package_aid.as_bytes())?);
    data.put_slice(&lv_bytes(applet_aid.as_bytes())?);
    data.put_slice(&lv_bytes(instance_aid.as_bytes())?);
    data.put_slice(&INSTALL_TAIL);
    Ok(CommandApdu::new(
        cla::GP,
        ins::INSTALL,
        install_p1::FOR_INSTALL_AND_MAKE_SELECTABLE,
        0x00,
    )
    .with_data(data.freeze())?)
}

/// One LOAD command; P1 marks the final block, P2 is the block index.
pub fn load_block(last: bool, index: u8, block: &[u8]) -> Result<CommandApdu> {
    let p1 = if last {
        load_p1::LAST_BLOCK
    } else {
        load_p1::MORE_BLOCKS
    };
    Ok(CommandApdu::new(cla::GP, ins::LOAD, p1, index).with_data(block.to_vec())?)
}

/// DELETE an object and everything related to it; the AID travels as a TLV.
pub fn delete_related(aid: &[u8]) -> Result<CommandApdu> {
    Ok(
        CommandApdu::new(cla::GP, ins::DELETE, 0x00, delete_p2::OBJECT_AND_RELATED)
            .with_data(tlv_bytes(tags::DELETE_AID, aid)?)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn aid(bytes: &[u8]) -> Aid {
        Aid::try_from(bytes).unwrap()
    }

    #[test]
    fn test_select() {
        let cmd = select(&hex!("A000000151000000")).unwrap();
        assert_eq!(cmd.to_bytes().as_ref(), hex!("00A4040008A00000015100000000"));

        // empty AID selects the default application
        let cmd = select(&[]).unwrap();
        assert_eq!(cmd.to_bytes().as_ref(), hex!("00A4040000"));
    }

    #[test]
    fn test_initialize_update() {
        let cmd = initialize_update(&hex!("1122334455667788")).unwrap();
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80500000081122334455667788"));
    }

    #[test]
    fn test_external_authenticate() {
        let cmd = external_authenticate(0x01, &hex!("810b098a8fbb88da")).unwrap();
        assert_eq!(cmd.to_bytes().as_ref(), hex!("84820100 08 810b098a8fbb88da"));
    }

    #[test]
    fn test_install_for_load() {
        let cmd = install_for_load(&aid(&hex!("A0000006270501"))).unwrap();
        assert_eq!(
            cmd.to_bytes().as_ref(),
            hex!("80E60200 0C 07 A0000006270501 00 00 00 00")
        );
    }

    #[test]
    fn test_install_for_install() {
        let pkg = aid(&hex!("A0000006270501"));
        let app = aid(&hex!("A000000627050101"));
        let cmd = install_for_install(&pkg, &app, &app).unwrap();
        assert_eq!(
            cmd.to_bytes().as_ref(),
            hex!("80E60C00 20 07A0000006270501 08A000000627050101 08A000000627050101 0100 02C900 00")
        );
    }

    #[test]
    fn test_load_block() {
        let cmd = load_block(false, 0, &hex!("C481AA")).unwrap();
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80E80000 03 C481AA"));

        let cmd = load_block(true, 3, &hex!("DEADBEEF")).unwrap();
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80E88003 04 DEADBEEF"));
    }

    #[test]
    fn test_delete_related() {
        let cmd = delete_related(&hex!("A0000006270501")).unwrap();
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80E40080 09 4F07A0000006270501"));
    }
}
