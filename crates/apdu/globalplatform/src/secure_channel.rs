//! SCP02 secure channel, variant "i=55"
//!
//! Implements the mutual-authentication handshake and the C-MAC command
//! wrap. The channel walks Uninitialized -> KeysDerived -> Authenticated;
//! any handshake failure drops all session state back to Uninitialized so a
//! later attempt starts from scratch.

use std::collections::BTreeMap;
use std::fmt;

use bytes::{BufMut, BytesMut};
use rand::RngCore;
use tracing::{debug, trace};

use jcbench_apdu_core::{ChainingTransport, Channel, CommandApdu, ResponseApdu};

use crate::commands;
use crate::constants::{cla, scp};
use crate::crypto::{self, MacBlock};
use crate::error::{Error, Result};
use crate::session::{self, KeySet, SessionKeys, default_keysets};

/// Per-command protection negotiated during EXTERNAL AUTHENTICATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecureLevel {
    /// No command protection
    None,
    /// MAC on every outgoing command
    #[default]
    CMac,
    /// Encrypt-then-MAC; recognized but not implemented
    CEncMac,
}

impl SecureLevel {
    /// The P1 encoding of this level in EXTERNAL AUTHENTICATE.
    pub const fn p1(self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::CMac => 0x01,
            Self::CEncMac => 0x03,
        }
    }
}

/// Secure channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    KeysDerived,
    Authenticated,
}

/// Parsed INITIALIZE UPDATE response payload.
#[derive(Debug, Clone)]
pub struct InitUpdateResponse {
    /// Key diversification data
    pub key_diversification: [u8; 10],
    /// Key version the card wants to authenticate under
    pub key_version: u8,
    /// Secure channel protocol version
    pub scp_version: u8,
    /// Session sequence counter
    pub sequence_counter: [u8; 2],
    /// Card challenge
    pub card_challenge: [u8; 6],
    /// Cryptogram presented by the card
    pub card_cryptogram: [u8; 8],
}

impl InitUpdateResponse {
    /// Parse and validate the fixed 28-byte response layout.
    pub fn parse(response: &ResponseApdu) -> Result<Self> {
        if !response.is_success() {
            return Err(Error::AuthenticationFailed("INITIALIZE UPDATE refused"));
        }
        let data = response.data();
        if data.len() != 28 {
            return Err(Error::AuthenticationFailed(
                "INITIALIZE UPDATE response must carry 28 bytes",
            ));
        }
        // lengths are checked above, the conversions cannot fail
        Ok(Self {
            key_diversification: data[0..10].try_into().unwrap(),
            key_version: data[10],
            scp_version: data[11],
            sequence_counter: data[12..14].try_into().unwrap(),
            card_challenge: data[14..20].try_into().unwrap(),
            card_cryptogram: data[20..28].try_into().unwrap(),
        })
    }
}

struct SessionState {
    keys: SessionKeys,
    chain_mac: MacBlock,
}

/// SCP02 "i=55" secure channel state.
pub struct Scp02 {
    keysets: BTreeMap<u8, KeySet>,
    level: SecureLevel,
    state: State,
    session: Option<SessionState>,
}

impl fmt::Debug for Scp02 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scp02")
            .field("level", &self.level)
            .field("state", &self.state)
            .finish()
    }
}

impl Scp02 {
    /// Create a channel for the requested level and static key sets.
    ///
    /// The encrypt-and-MAC level is rejected here rather than silently
    /// downgraded; there is no normative encryption order to guess.
    pub fn new(level: SecureLevel, keysets: BTreeMap<u8, KeySet>) -> Result<Self> {
        if level == SecureLevel::CEncMac {
            return Err(Error::UnsupportedSecureLevel(level.p1()));
        }
        Ok(Self {
            keysets,
            level,
            state: State::Uninitialized,
            session: None,
        })
    }

    /// Channel with the default test key set and C-MAC protection.
    pub fn with_defaults() -> Self {
        Self {
            keysets: default_keysets(),
            level: SecureLevel::CMac,
            state: State::Uninitialized,
            session: None,
        }
    }

    /// Negotiated secure level.
    pub const fn level(&self) -> SecureLevel {
        self.level
    }

    /// Whether mutual authentication has completed.
    pub fn is_authenticated(&self) -> bool {
        self.state == State::Authenticated
    }

    /// Drop all session state, returning to Uninitialized.
    pub fn reset(&mut self) {
        self.session = None;
        self.state = State::Uninitialized;
    }

    /// Run the mutual-authentication handshake over the transport with a
    /// fresh random host challenge.
    pub fn establish<C: Channel>(&mut self, transport: &mut ChainingTransport<C>) -> Result<()> {
        let mut host_challenge = [0u8; 8];
        rand::rng().fill_bytes(&mut host_challenge);
        self.establish_with_challenge(transport, host_challenge)
    }

    /// Handshake with a caller-supplied host challenge, for reproducible
    /// exchanges.
    pub fn establish_with_challenge<C: Channel>(
        &mut self,
        transport: &mut ChainingTransport<C>,
        host_challenge: [u8; 8],
    ) -> Result<()> {
        self.reset();
        let result = self.handshake(transport, host_challenge);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn handshake<C: Channel>(
        &mut self,
        transport: &mut ChainingTransport<C>,
        host_challenge: [u8; 8],
    ) -> Result<()> {
        let init = commands::initialize_update(&host_challenge)?;
        let response = transport.transmit(&init)?;
        let parsed = InitUpdateResponse::parse(&response)?;

        if parsed.scp_version != scp::SCP02 {
            return Err(Error::UnsupportedScpVersion(parsed.scp_version));
        }
        let keyset = self
            .keysets
            .get(&parsed.key_version)
            .ok_or(Error::UndefinedKeyVersion(parsed.key_version))?;

        let keys = SessionKeys::derive(keyset, &parsed.sequence_counter)?;
        self.state = State::KeysDerived;
        debug!(
            key_version = format_args!("{:#04x}", parsed.key_version),
            sequence = %hex::encode(parsed.sequence_counter),
            "session keys derived"
        );

        let expected = session::card_cryptogram(
            keys.enc(),
            &parsed.sequence_counter,
            &parsed.card_challenge,
            &host_challenge,
        )?;
        if expected != parsed.card_cryptogram {
            return Err(Error::CryptogramMismatch);
        }

        let host_cryptogram = session::host_cryptogram(
            keys.enc(),
            &parsed.sequence_counter,
            &parsed.card_challenge,
            &host_challenge,
        )?;
        self.session = Some(SessionState {
            keys,
            chain_mac: [0u8; 8],
        });

        let auth = commands::external_authenticate(self.level.p1(), &host_cryptogram)?;
        let auth = self.add_mac(&auth, true)?;
        let response = transport.transmit(&auth)?;
        if !response.is_success() {
            return Err(Error::AuthenticationFailed("EXTERNAL AUTHENTICATE refused"));
        }

        self.state = State::Authenticated;
        debug!(level = ?self.level, "secure channel established");
        Ok(())
    }

    /// Apply the negotiated protection to an outgoing command.
    pub fn wrap(&mut self, command: &CommandApdu) -> Result<CommandApdu> {
        if !self.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        match self.level {
            SecureLevel::None => Ok(command.clone()),
            SecureLevel::CMac => self.add_mac(command, false),
            SecureLevel::CEncMac => Err(Error::UnsupportedSecureLevel(self.level.p1())),
        }
    }

    /// SCP02 "i=55" provides no response protection; unwrap returns the
    /// response unchanged.
    pub fn unwrap(&self, response: ResponseApdu) -> Result<ResponseApdu> {
        if !self.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        Ok(response)
    }

    /// Encrypt data under the session DEK (3DES-ECB).
    pub fn encrypt_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        crypto::tdes_ecb_encrypt(self.session()?.keys.dek(), data)
    }

    /// Decrypt data under the session DEK (3DES-ECB).
    pub fn decrypt_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        crypto::tdes_ecb_decrypt(self.session()?.keys.dek(), data)
    }

    fn session(&self) -> Result<&SessionState> {
        if self.state != State::Authenticated {
            return Err(Error::NotAuthenticated);
        }
        self.session.as_ref().ok_or(Error::NotAuthenticated)
    }

    /// Append a C-MAC to a command.
    ///
    /// The chaining ICV is the single-DES encryption of the previous MAC;
    /// the authentication command itself uses a zero ICV. The MAC is
    /// computed over the serialized command with its Lc already raised by
    /// the MAC length and Le removed.
    fn add_mac(&mut self, command: &CommandApdu, is_auth: bool) -> Result<CommandApdu> {
        let session = self.session.as_mut().ok_or(Error::NotAuthenticated)?;

        let icv = if is_auth {
            [0u8; 8]
        } else {
            crypto::encrypt_icv(session.keys.mac(), &session.chain_mac)
        };

        if command.data().len() + 8 > 255 {
            return Err(Error::DataTooLong(command.data().len()));
        }

        // placeholder MAC bytes make the length field match the final size
        let mut padded = BytesMut::with_capacity(command.data().len() + 8);
        padded.put_slice(command.data());
        padded.put_slice(&[0u8; 8]);

        let prepared = command
            .clone()
            .with_cla(command.cla() | cla::SECURE_MESSAGING)
            .with_data(padded.freeze())?
            .with_le(0);

        let bytes = prepared.to_bytes();
        let mac = crypto::retail_mac_alg3(session.keys.mac(), &icv, &bytes[..bytes.len() - 8])?;
        trace!(mac = %hex::encode(mac), "command MAC computed");
        session.chain_mac = mac;

        let mut data = BytesMut::with_capacity(command.data().len() + 8);
        data.put_slice(command.data());
        data.put_slice(&mac);
        Ok(prepared.with_data(data.freeze())?)
    }
}
