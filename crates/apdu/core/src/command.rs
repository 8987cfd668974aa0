//! APDU command definitions
//!
//! Command APDUs are modelled as immutable values: every builder method
//! consumes the value and returns a new one with the derived length fields
//! recomputed, so a command can never be observed in a partially-consistent
//! state. Parsing classifies raw bytes into one of the seven ISO 7816-4
//! cases purely from length and content.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// ISO/IEC 7816-4 command case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApduCase {
    /// Header only
    Case1,
    /// Header plus a short Le
    Case2,
    /// Header plus short Lc and data
    Case3,
    /// Header plus short Lc, data and short Le
    Case4,
    /// Extended Le, no data
    Case2E,
    /// Extended Lc and data, no Le
    Case3E,
    /// Extended Lc, data and extended Le
    Case4E,
}

/// Encoded width of the Lc field. The length value itself is always derived
/// from the data field, so only the form is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LcForm {
    Absent,
    Short,
    Extended,
}

/// Raw bytes of the Le field. A short Le of 0x00 requests 256 bytes; the raw
/// encoding is preserved rather than the logical value so that exchanges
/// such as a 6Cxx retry re-emit exactly the byte the card asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeForm {
    Absent,
    Short(u8),
    Extended([u8; 2]),
}

/// Command APDU value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    lc: LcForm,
    data: Bytes,
    le: LeForm,
}

impl CommandApdu {
    /// Create a case-1 command (header only).
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            lc: LcForm::Absent,
            data: Bytes::new(),
            le: LeForm::Absent,
        }
    }

    /// Parse a command APDU from raw bytes.
    ///
    /// Classification follows the ISO 7816-4 case table, in priority order:
    /// case 1 (4 bytes), case 2 (5 bytes), case 3/4 (short Lc), case 2E
    /// (7 bytes with a zero marker), case 3E/4E (extended Lc). Any other
    /// length is rejected.
    pub fn parse(apdu: &[u8]) -> Result<Self, CodecError> {
        let len = apdu.len();
        if len < 4 {
            return Err(CodecError::CommandTooShort(len));
        }

        let base = Self::new(apdu[0], apdu[1], apdu[2], apdu[3]);
        if len == 4 {
            return Ok(base);
        }

        let p3 = apdu[4] as usize;
        if len == 5 {
            return Ok(Self {
                le: LeForm::Short(apdu[4]),
                ..base
            });
        }
        if p3 != 0 && p3 + 5 == len {
            return Ok(Self {
                lc: LcForm::Short,
                data: Bytes::copy_from_slice(&apdu[5..]),
                ..base
            });
        }
        if p3 != 0 && p3 + 6 == len {
            return Ok(Self {
                lc: LcForm::Short,
                data: Bytes::copy_from_slice(&apdu[5..len - 1]),
                le: LeForm::Short(apdu[len - 1]),
                ..base
            });
        }
        if p3 == 0 && len == 7 {
            return Ok(Self {
                le: LeForm::Extended([apdu[5], apdu[6]]),
                ..base
            });
        }
        if p3 == 0 && len > 7 {
            let ext = ((apdu[5] as usize) << 8) | apdu[6] as usize;
            if ext + 7 == len {
                return Ok(Self {
                    lc: LcForm::Extended,
                    data: Bytes::copy_from_slice(&apdu[7..]),
                    ..base
                });
            }
            if len > 9 && ext + 9 == len {
                return Ok(Self {
                    lc: LcForm::Extended,
                    data: Bytes::copy_from_slice(&apdu[7..len - 2]),
                    le: LeForm::Extended([apdu[len - 2], apdu[len - 1]]),
                    ..base
                });
            }
        }

        Err(CodecError::MalformedCommand(len))
    }

    /// Parse a command APDU from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s).map_err(|_| CodecError::InvalidHex)?;
        Self::parse(&bytes)
    }

    /// Class byte.
    pub const fn cla(&self) -> u8 {
        self.cla
    }

    /// Instruction byte.
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    /// First parameter byte.
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter byte.
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Data field.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the class byte.
    pub fn with_cla(mut self, cla: u8) -> Self {
        self.cla = cla;
        self
    }

    /// Replace the first parameter byte.
    pub fn with_p1(mut self, p1: u8) -> Self {
        self.p1 = p1;
        self
    }

    /// Replace the second parameter byte.
    pub fn with_p2(mut self, p2: u8) -> Self {
        self.p2 = p2;
        self
    }

    /// Replace the data field, recomputing Lc.
    ///
    /// Empty data removes Lc. Data keeps the short form unless Le is already
    /// two bytes wide or the data is longer than 255 bytes, in which case Lc
    /// takes the 3-byte extended form and a short Le is widened to keep the
    /// encoding consistent.
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Result<Self, CodecError> {
        let data = data.into();
        if data.len() > 0xFFFF {
            return Err(CodecError::DataTooLong(data.len()));
        }

        if data.is_empty() {
            self.lc = LcForm::Absent;
        } else if matches!(self.le, LeForm::Extended(_)) || data.len() > 255 {
            self.lc = LcForm::Extended;
            if let LeForm::Short(le) = self.le {
                self.le = LeForm::Extended([0x00, le]);
            }
        } else {
            self.lc = LcForm::Short;
        }
        self.data = data;
        Ok(self)
    }

    /// Replace the expected length.
    ///
    /// A value of 0 removes Le; 1..=256 use the short form (256 encodes as
    /// 0x00); larger values use the extended form.
    pub fn with_le(self, le: u16) -> Self {
        let form = match le {
            0 => LeForm::Absent,
            1..=256 => LeForm::Short((le & 0xFF) as u8),
            _ => LeForm::Extended(le.to_be_bytes()),
        };
        self.set_le_form(form)
    }

    /// Set a short Le from a raw byte (0x00 requests 256 bytes).
    pub fn with_le_byte(self, le: u8) -> Self {
        self.set_le_form(LeForm::Short(le))
    }

    /// Apply a new Le form, widening Lc or Le where the two must agree:
    /// widening Le forces a short Lc to the extended form; a short Le
    /// combined with an extended Lc is widened instead of shrinking Lc.
    fn set_le_form(mut self, form: LeForm) -> Self {
        match (form, self.lc) {
            (LeForm::Extended(_), LcForm::Short) => {
                self.lc = LcForm::Extended;
                self.le = form;
            }
            (LeForm::Short(le), LcForm::Extended) => {
                self.le = LeForm::Extended([0x00, le]);
            }
            _ => self.le = form,
        }
        self
    }

    /// Whether any length field uses the extended encoding.
    pub const fn is_extended(&self) -> bool {
        matches!(self.lc, LcForm::Extended) || matches!(self.le, LeForm::Extended(_))
    }

    /// The ISO 7816-4 case of this command.
    pub fn case(&self) -> ApduCase {
        let lc = !matches!(self.lc, LcForm::Absent);
        let le = !matches!(self.le, LeForm::Absent);
        if self.is_extended() {
            match (lc, le) {
                (false, true) => ApduCase::Case2E,
                (true, false) => ApduCase::Case3E,
                (true, true) => ApduCase::Case4E,
                (false, false) => unreachable!("extended apdu without lc or le"),
            }
        } else {
            match (lc, le) {
                (false, false) => ApduCase::Case1,
                (false, true) => ApduCase::Case2,
                (true, false) => ApduCase::Case3,
                (true, true) => ApduCase::Case4,
            }
        }
    }

    /// Serialize to raw bytes.
    ///
    /// With no Lc and a 2-byte Le the fifth byte is emitted as 0x00 to mark
    /// the extended encoding, regardless of how the value was built.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(9 + self.data.len());
        buf.put_u8(self.cla);
        buf.put_u8(self.ins);
        buf.put_u8(self.p1);
        buf.put_u8(self.p2);

        if matches!(self.lc, LcForm::Absent) {
            if let LeForm::Extended(le) = self.le {
                buf.put_u8(0x00);
                buf.put_slice(&le);
                return buf.freeze();
            }
        }

        match self.lc {
            LcForm::Absent => {}
            LcForm::Short => buf.put_u8(self.data.len() as u8),
            LcForm::Extended => {
                buf.put_u8(0x00);
                buf.put_u16(self.data.len() as u16);
            }
        }
        buf.put_slice(&self.data);

        match self.le {
            LeForm::Absent => {}
            LeForm::Short(le) => buf.put_u8(le),
            LeForm::Extended(le) => buf.put_slice(&le),
        }
        buf.freeze()
    }
}

impl fmt::Display for CommandApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}
