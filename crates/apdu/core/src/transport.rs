//! The Channel capability and the response-chaining transport
//!
//! A [`Channel`] is the external transport capability providing raw byte
//! exchange with a card reader; protocol and measurement logic never address
//! hardware directly. [`ChainingTransport`] wraps a channel and hides the
//! T=0 GET RESPONSE (61 xx) and wrong-length retry (6C xx) exchanges.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::command::CommandApdu;
use crate::error::ChannelError;
use crate::response::ResponseApdu;

/// Negotiated transmission protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Character-oriented T=0
    T0,
    /// Block-oriented T=1
    T1,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::T0 => f.write_str("T=0"),
            Self::T1 => f.write_str("T=1"),
        }
    }
}

/// Protocol requested when opening or resetting a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolPreference {
    /// Require T=0
    T0,
    /// Require T=1
    T1,
    /// Let the reader negotiate either protocol
    #[default]
    Any,
}

/// Kind of card reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    /// Power-cycle the card
    Cold,
    /// Reset without removing power
    Warm,
}

/// Raw byte exchange with a card reader.
///
/// The channel is a single serial resource; no two exchanges ever overlap.
/// Timeout policy is the implementation's responsibility.
pub trait Channel {
    /// Connect to the card, negotiating a protocol.
    fn open(&mut self, preference: ProtocolPreference) -> Result<(), ChannelError>;

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Disconnect from the card.
    fn close(&mut self) -> Result<(), ChannelError>;

    /// Reset the card, optionally renegotiating the protocol.
    fn reset(
        &mut self,
        preference: Option<ProtocolPreference>,
        kind: ResetKind,
    ) -> Result<(), ChannelError>;

    /// The protocol negotiated at open or reset time.
    fn protocol(&self) -> Result<Protocol, ChannelError>;

    /// Answer To Reset of the card.
    fn atr(&self) -> Result<Bytes, ChannelError>;

    /// Send raw command bytes and return the response bytes together with
    /// the elapsed time of the physical exchange.
    fn transmit_raw(&mut self, command: &[u8]) -> Result<(Bytes, Duration), ChannelError>;
}

/// Transport wrapper that transparently completes T=0 response chaining.
///
/// For T=0 the loop inspects SW1 after every exchange: 61 xx triggers a
/// GET RESPONSE with Le = SW2, 6C xx resends the command with Le corrected
/// to SW2. Data and elapsed time accumulate across every round trip. For
/// T=1 commands pass through unchanged.
#[derive(Debug)]
pub struct ChainingTransport<C> {
    channel: C,
}

impl<C: Channel> ChainingTransport<C> {
    /// Wrap a raw channel.
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Access the underlying channel.
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutable access to the underlying channel.
    pub const fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Unwrap, returning the underlying channel.
    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Open the underlying channel.
    pub fn open(&mut self, preference: ProtocolPreference) -> Result<(), ChannelError> {
        self.channel.open(preference)
    }

    /// Whether the underlying channel is open.
    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Close the underlying channel.
    pub fn close(&mut self) -> Result<(), ChannelError> {
        self.channel.close()
    }

    /// Reset the card.
    pub fn reset(
        &mut self,
        preference: Option<ProtocolPreference>,
        kind: ResetKind,
    ) -> Result<(), ChannelError> {
        self.channel.reset(preference, kind)
    }

    /// The negotiated protocol.
    pub fn protocol(&self) -> Result<Protocol, ChannelError> {
        self.channel.protocol()
    }

    /// Answer To Reset of the card.
    pub fn atr(&self) -> Result<Bytes, ChannelError> {
        self.channel.atr()
    }

    /// Transmit a command, completing any T=0 response chaining.
    pub fn transmit(&mut self, command: &CommandApdu) -> Result<ResponseApdu, ChannelError> {
        if self.channel.protocol()? != Protocol::T0 {
            let (bytes, elapsed) = self.channel.transmit_raw(&command.to_bytes())?;
            return Ok(ResponseApdu::new(bytes, elapsed)?);
        }

        let mut current = command.clone();
        let mut collected = BytesMut::new();
        let mut total = Duration::ZERO;
        loop {
            let (bytes, elapsed) = self.channel.transmit_raw(&current.to_bytes())?;
            let response = ResponseApdu::new(bytes, elapsed)?;
            match response.sw1() {
                0x61 => {
                    trace!(remaining = response.sw2(), "issuing GET RESPONSE");
                    collected.put_slice(response.data());
                    total += response.elapsed();
                    current =
                        CommandApdu::new(0x00, 0xC0, 0x00, 0x00).with_le_byte(response.sw2());
                }
                0x6C => {
                    trace!(le = response.sw2(), "retrying with corrected Le");
                    collected.put_slice(response.data());
                    total += response.elapsed();
                    current = current.with_le_byte(response.sw2());
                }
                _ => {
                    if collected.is_empty() {
                        return Ok(response);
                    }
                    total += response.elapsed();
                    collected.put_slice(response.as_bytes());
                    return Ok(ResponseApdu::new(collected.freeze(), total)?);
                }
            }
        }
    }
}
