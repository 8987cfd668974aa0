//! Security Domain operations
//!
//! High-level SELECT / LOAD / INSTALL / DELETE sequences against a card's
//! Security Domain. Operations that require authorization lazily establish
//! the SCP02 secure channel and abort on the first unexpected status word.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, info};

use jcbench_apdu_core::{Aid, ChainingTransport, Channel, CommandApdu, ResetKind, ResponseApdu};

use crate::cap::{CapFile, Component};
use crate::commands;
use crate::constants::{LOAD_BLOCK_SIZE, tags};
use crate::error::{Error, Result};
use crate::secure_channel::{Scp02, SecureLevel};
use crate::session::{KeySet, default_keysets};
use crate::util::tlv_bytes;

/// A Security Domain reached through a chaining transport.
///
/// The domain owns the secure channel state; a failed handshake leaves it
/// unestablished so the next operation retries from scratch.
#[derive(Debug)]
pub struct SecurityDomain<'a, C: Channel> {
    transport: &'a mut ChainingTransport<C>,
    aid: Bytes,
    keysets: BTreeMap<u8, KeySet>,
    level: SecureLevel,
    secure: Option<Scp02>,
}

impl<'a, C: Channel> SecurityDomain<'a, C> {
    /// Domain addressed through the card's default selected application,
    /// protected with C-MAC under the default key sets.
    pub fn new(transport: &'a mut ChainingTransport<C>) -> Self {
        Self {
            transport,
            aid: Bytes::new(),
            keysets: default_keysets(),
            level: SecureLevel::CMac,
            secure: None,
        }
    }

    /// Address a specific Security Domain AID.
    pub fn with_aid(mut self, aid: &Aid) -> Self {
        self.aid = Bytes::copy_from_slice(aid.as_bytes());
        self
    }

    /// Replace the static key sets used for the handshake.
    pub fn with_keysets(mut self, keysets: BTreeMap<u8, KeySet>) -> Self {
        self.keysets = keysets;
        self
    }

    /// Request a different secure level for the next `prepare`.
    pub fn with_level(mut self, level: SecureLevel) -> Self {
        self.level = level;
        self
    }

    /// SELECT an application. The raw response is returned for the caller
    /// to inspect; an error status is not an error here.
    pub fn select(&mut self, aid: &[u8]) -> Result<ResponseApdu> {
        let cmd = commands::select(aid)?;
        Ok(self.transport.transmit(&cmd)?)
    }

    /// Drop the secure channel and optionally reset the card.
    pub fn reset(&mut self, reset_card: bool) -> Result<()> {
        self.secure = None;
        if reset_card {
            self.transport.reset(None, ResetKind::Cold)?;
        }
        Ok(())
    }

    /// Establish a fresh secure channel: select the domain, then run the
    /// SCP02 handshake. Any failure leaves the domain unestablished.
    pub fn prepare(&mut self) -> Result<()> {
        let mut secure = Scp02::new(self.level, self.keysets.clone())?;

        let aid = self.aid.clone();
        let response = self.select(&aid)?;
        if !response.is_success() {
            return Err(Error::Status {
                operation: "select",
                status: response.status(),
            });
        }

        secure.establish(self.transport)?;
        self.secure = Some(secure);
        debug!(aid = %hex::encode(&self.aid), "security domain prepared");
        Ok(())
    }

    /// Load a CAP archive's package onto the card.
    ///
    /// One INSTALL [for load] command followed by the chunked load file data
    /// block; aborts on the first unexpected status.
    pub fn load_cap(&mut self, cap: &CapFile) -> Result<()> {
        self.ensure_prepared()?;
        let apdus = build_load_commands(cap)?;
        info!(
            package = %cap.package_aid(),
            blocks = apdus.len() - 1,
            "loading package"
        );
        for apdu in &apdus {
            self.send_wrapped(apdu, "load")?;
        }
        Ok(())
    }

    /// Install an applet from a loaded package and make it selectable. The
    /// instance AID defaults to the applet AID.
    pub fn install_applet(
        &mut self,
        package_aid: &Aid,
        applet_aid: &Aid,
        instance_aid: Option<&Aid>,
    ) -> Result<()> {
        self.ensure_prepared()?;
        let instance = instance_aid.unwrap_or(applet_aid);
        info!(package = %package_aid, applet = %applet_aid, "installing applet");
        let cmd = commands::install_for_install(package_aid, applet_aid, instance)?;
        self.send_wrapped(&cmd, "install").map(drop)
    }

    /// Delete a package or application and everything related to it.
    pub fn remove(&mut self, aid: &[u8]) -> Result<()> {
        self.ensure_prepared()?;
        info!(aid = %hex::encode(aid), "removing");
        let cmd = commands::delete_related(aid)?;
        self.send_wrapped(&cmd, "remove").map(drop)
    }

    fn ensure_prepared(&mut self) -> Result<()> {
        if self.secure.is_none() {
            self.prepare()?;
        }
        Ok(())
    }

    fn send_wrapped(
        &mut self,
        command: &CommandApdu,
        operation: &'static str,
    ) -> Result<ResponseApdu> {
        let secure = self.secure.as_mut().ok_or(Error::NotAuthenticated)?;
        let wrapped = secure.wrap(command)?;
        let response = self.transport.transmit(&wrapped)?;
        let response = secure.unwrap(response)?;
        if !response.is_success() {
            return Err(Error::Status {
                operation,
                status: response.status(),
            });
        }
        Ok(response)
    }
}

/// Build the INSTALL [for load] command followed by one LOAD command per
/// block of the tagged load file data.
pub fn build_load_commands(cap: &CapFile) -> Result<Vec<CommandApdu>> {
    let mut cap_data = Vec::new();
    for kind in Component::LOAD_ORDER {
        cap_data.extend_from_slice(cap.component(kind));
    }
    let load_data = tlv_bytes(tags::LOAD_FILE_DATA_BLOCK, &cap_data)?;

    let mut apdus = vec![commands::install_for_load(cap.package_aid())?];
    let blocks: Vec<&[u8]> = load_data.chunks(LOAD_BLOCK_SIZE).collect();
    let count = blocks.len();
    for (i, block) in blocks.into_iter().enumerate() {
        apdus.push(commands::load_block(i + 1 == count, (i & 0xFF) as u8, block)?);
    }
    Ok(apdus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hex_literal::hex;

    use jcbench_apdu_core::{ChannelError, Protocol, ProtocolPreference};

    use crate::cap::tests::fixture_archive;

    type ChannelResult<T> = std::result::Result<T, ChannelError>;

    /// Channel that answers success to everything, including a consistent
    /// SCP02 handshake for the fixed test host challenge.
    #[derive(Debug, Default)]
    struct YesCardChannel {
        commands: Vec<Vec<u8>>,
    }

    impl Channel for YesCardChannel {
        fn open(&mut self, _preference: ProtocolPreference) -> ChannelResult<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        fn close(&mut self) -> ChannelResult<()> {
            Ok(())
        }

        fn reset(
            &mut self,
            _preference: Option<ProtocolPreference>,
            _kind: ResetKind,
        ) -> ChannelResult<()> {
            Ok(())
        }

        fn protocol(&self) -> ChannelResult<Protocol> {
            Ok(Protocol::T1)
        }

        fn atr(&self) -> ChannelResult<bytes::Bytes> {
            Ok(bytes::Bytes::from_static(&hex!("3B00")))
        }

        fn transmit_raw(
            &mut self,
            command: &[u8],
        ) -> ChannelResult<(bytes::Bytes, Duration)> {
            self.commands.push(command.to_vec());
            Ok((
                bytes::Bytes::from_static(&hex!("9000")),
                Duration::from_millis(1),
            ))
        }
    }

    #[test]
    fn test_load_command_chunking() {
        let cap = CapFile::from_reader(fixture_archive()).unwrap();
        let apdus = build_load_commands(&cap).unwrap();

        // total load data = TLV header + concatenated components
        let payload_len: usize = Component::LOAD_ORDER
            .iter()
            .map(|&kind| cap.component(kind).len())
            .sum();
        let tlv_len = tlv_bytes(tags::LOAD_FILE_DATA_BLOCK, &vec![0u8; payload_len])
            .unwrap()
            .len();
        let expected_blocks = tlv_len.div_ceil(LOAD_BLOCK_SIZE);

        assert_eq!(apdus.len(), 1 + expected_blocks);

        // the first command is INSTALL [for load]
        assert_eq!(apdus[0].ins(), 0xE6);
        assert_eq!(apdus[0].p1(), 0x02);

        // only the final LOAD block carries P1 = 0x80, P2 counts blocks
        for (i, apdu) in apdus[1..].iter().enumerate() {
            assert_eq!(apdu.ins(), 0xE8);
            let expected_p1 = if i + 1 == expected_blocks { 0x80 } else { 0x00 };
            assert_eq!(apdu.p1(), expected_p1);
            assert_eq!(apdu.p2(), i as u8);
        }
    }

    #[test]
    fn test_select_returns_raw_response() {
        let mut transport = ChainingTransport::new(YesCardChannel::default());
        let mut domain = SecurityDomain::new(&mut transport);

        let response = domain.select(&hex!("A000000151000000")).unwrap();
        assert!(response.is_success());
        assert_eq!(
            transport.channel().commands[0],
            hex!("00A4040008A00000015100000000")
        );
    }

    #[test]
    fn test_operations_require_prepared_channel() {
        // the mock card answers 9000 to INITIALIZE UPDATE, which is not a
        // valid handshake response, so lazy preparation must fail and the
        // operation must propagate a handshake error
        let mut transport = ChainingTransport::new(YesCardChannel::default());
        let mut domain = SecurityDomain::new(&mut transport);

        let result = domain.remove(&hex!("A0000006270501"));
        assert!(matches!(result, Err(Error::AuthenticationFailed(_))));
    }
}
