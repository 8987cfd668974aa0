//! PC/SC channel implementation for jcbench
//!
//! Binds the `Channel` capability of `jcbench-apdu-core` to PC/SC smart
//! card readers through the `pcsc` crate. This is the only place the
//! process touches reader hardware; one channel is selected at startup and
//! handed to the measurement engine as an opaque capability.

use std::ffi::CString;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use pcsc::{Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State};
use tracing::{debug, info};

use jcbench_apdu_core::{Channel, ChannelError, Protocol, ProtocolPreference, ResetKind};

fn device_error(error: pcsc::Error) -> ChannelError {
    ChannelError::Device(error.to_string())
}

const fn requested_protocols(preference: ProtocolPreference) -> Protocols {
    match preference {
        ProtocolPreference::T0 => Protocols::T0,
        ProtocolPreference::T1 => Protocols::T1,
        ProtocolPreference::Any => Protocols::ANY,
    }
}

fn active_protocol(card: &Card) -> Result<Protocol, ChannelError> {
    let status = card.status2_owned().map_err(device_error)?;
    match status.protocol2() {
        Some(pcsc::Protocol::T0) => Ok(Protocol::T0),
        Some(pcsc::Protocol::T1) => Ok(Protocol::T1),
        _ => Err(ChannelError::UnsupportedProtocol(
            "card negotiated neither T=0 nor T=1".into(),
        )),
    }
}

/// List the PC/SC readers visible to the system and whether each currently
/// holds a card.
pub fn list_readers() -> Result<Vec<(String, bool)>, ChannelError> {
    let context = Context::establish(Scope::User).map_err(device_error)?;
    let names = context.list_readers_owned().map_err(device_error)?;

    let mut states: Vec<ReaderState> = names
        .iter()
        .map(|name| ReaderState::new(name.clone(), State::UNAWARE))
        .collect();
    context
        .get_status_change(Duration::ZERO, &mut states)
        .map_err(device_error)?;

    Ok(states
        .iter()
        .map(|state| {
            (
                state.name().to_string_lossy().into_owned(),
                state.event_state().contains(State::PRESENT),
            )
        })
        .collect())
}

/// A PC/SC smart card reader as a [`Channel`].
pub struct PcscChannel {
    reader: Option<CString>,
    share_mode: ShareMode,
    context: Option<Context>,
    card: Option<Card>,
    protocol: Option<Protocol>,
}

impl fmt::Debug for PcscChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscChannel")
            .field("reader", &self.reader)
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl PcscChannel {
    /// Channel that picks a reader at open time: the first one holding a
    /// card, or the first reader at all.
    pub const fn autodetect() -> Self {
        Self {
            reader: None,
            share_mode: ShareMode::Exclusive,
            context: None,
            card: None,
            protocol: None,
        }
    }

    /// Channel bound to a specific reader name.
    pub fn named(name: &str) -> Result<Self, ChannelError> {
        let reader = CString::new(name)
            .map_err(|_| ChannelError::Device("reader name contains a NUL byte".into()))?;
        Ok(Self {
            reader: Some(reader),
            ..Self::autodetect()
        })
    }

    /// Connect in shared instead of exclusive mode.
    pub const fn shared(mut self) -> Self {
        self.share_mode = ShareMode::Shared;
        self
    }

    fn resolve_reader(&self, context: &Context) -> Result<CString, ChannelError> {
        if let Some(reader) = &self.reader {
            return Ok(reader.clone());
        }

        let names = context.list_readers_owned().map_err(device_error)?;
        let first = names
            .first()
            .cloned()
            .ok_or_else(|| ChannelError::Device("no PC/SC reader found".into()))?;

        let mut states: Vec<ReaderState> = names
            .iter()
            .map(|name| ReaderState::new(name.clone(), State::UNAWARE))
            .collect();
        if context
            .get_status_change(Duration::ZERO, &mut states)
            .is_ok()
        {
            for state in &states {
                if state.event_state().contains(State::PRESENT) {
                    return Ok(state.name().to_owned());
                }
            }
        }
        Ok(first)
    }

    fn card(&self) -> Result<&Card, ChannelError> {
        self.card.as_ref().ok_or(ChannelError::NotOpen)
    }
}

impl Channel for PcscChannel {
    fn open(&mut self, preference: ProtocolPreference) -> Result<(), ChannelError> {
        if self.is_open() {
            return Err(ChannelError::AlreadyOpen);
        }

        let context = Context::establish(Scope::User).map_err(device_error)?;
        let reader = self.resolve_reader(&context)?;

        let card = context
            .connect(&reader, self.share_mode, requested_protocols(preference))
            .map_err(device_error)?;
        let protocol = active_protocol(&card)?;

        info!(
            reader = %reader.to_string_lossy(),
            %protocol,
            "reader open"
        );

        self.reader = Some(reader);
        self.context = Some(context);
        self.card = Some(card);
        self.protocol = Some(protocol);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.card.is_some()
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        if let Some(card) = self.card.take() {
            card.disconnect(Disposition::UnpowerCard)
                .map_err(|(_, error)| device_error(error))?;
            info!("reader closed");
        }
        self.context = None;
        self.protocol = None;
        Ok(())
    }

    fn reset(
        &mut self,
        preference: Option<ProtocolPreference>,
        kind: ResetKind,
    ) -> Result<(), ChannelError> {
        let current = self.protocol;
        let card = self.card.as_mut().ok_or(ChannelError::NotOpen)?;

        let protocols = preference.map_or_else(
            || match current {
                Some(Protocol::T0) => Protocols::T0,
                Some(Protocol::T1) => Protocols::T1,
                None => Protocols::ANY,
            },
            requested_protocols,
        );
        let disposition = match kind {
            ResetKind::Cold => Disposition::UnpowerCard,
            ResetKind::Warm => Disposition::ResetCard,
        };

        card.reconnect(self.share_mode, protocols, disposition)
            .map_err(device_error)?;
        let protocol = active_protocol(card)?;
        info!(%protocol, ?kind, "card reset");
        self.protocol = Some(protocol);
        Ok(())
    }

    fn protocol(&self) -> Result<Protocol, ChannelError> {
        self.protocol.ok_or(ChannelError::NotOpen)
    }

    fn atr(&self) -> Result<Bytes, ChannelError> {
        let status = self.card()?.status2_owned().map_err(device_error)?;
        Ok(Bytes::copy_from_slice(status.atr()))
    }

    fn transmit_raw(&mut self, command: &[u8]) -> Result<(Bytes, Duration), ChannelError> {
        let card = self.card.as_ref().ok_or(ChannelError::NotOpen)?;

        debug!(command = %hex::encode(command), "send");

        let mut buffer = vec![0u8; pcsc::MAX_BUFFER_SIZE_EXTENDED];
        let start = Instant::now();
        let received = card
            .transmit(command, &mut buffer)
            .map_err(|error| ChannelError::Transmit(error.to_string()))?;
        let elapsed = start.elapsed();

        debug!(
            response = %hex::encode(received),
            elapsed_us = elapsed.as_micros() as u64,
            "recv"
        );
        Ok((Bytes::copy_from_slice(received), elapsed))
    }
}
