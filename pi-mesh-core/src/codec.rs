//! Wire codec
//!
//! Four newline-terminated textual packet kinds travel between faces:
//!
//! ```text
//! d<whole>.<frac>                                    distribute a target accuracy
//! r<id:hex>,<time>,<version>,<round>,<whole>.<frac>,<value>   report a result
//! t                                                  bind terminal, start table output
//! x                                                  reboot the mesh
//! ```
//!
//! Decoding is strict: any missing, extra or non-numeric field is rejected
//! before a single byte of node state is touched. Encoding is total.

use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::{Millis, NodeId};

/// Target or achieved accuracy as it travels on the wire
///
/// The fractional part is an integer that reads back as a decimal fraction,
/// so `frac = 5` and `frac = 50` both mean `.5`. Leading zeros do not survive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accuracy {
    /// Integer part of the percentage
    pub whole: u32,
    /// Fractional digits of the percentage
    pub frac: u32,
}

impl Accuracy {
    /// Create a new accuracy from its two wire parts
    pub const fn new(whole: u32, frac: u32) -> Self {
        Self { whole, frac }
    }

    /// Percentage value
    pub fn percent(&self) -> f32 {
        let mut decimal = self.frac as f32;
        while decimal >= 1.0 {
            decimal /= 10.0;
        }
        self.whole as f32 + decimal
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.whole, self.frac)
    }
}

/// Request to start (or override) a calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribute {
    /// Requested target accuracy
    pub accuracy: Accuracy,
}

/// A node's partial result, tagged with the calculation it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPacket {
    /// Reporting board
    pub node: NodeId,
    /// Reporter's clock when the packet was minted; dedup key with `node`
    pub time: Millis,
    /// Calculation version
    pub version: u32,
    /// Round within the version; 0 means "no data yet"
    pub round: u32,
    /// Target accuracy of the calculation
    pub accuracy: Accuracy,
    /// Inside-count for the round; 0 means "no result yet"
    pub value: u32,
}

impl fmt::Display for ResultPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{:x},{},{},{},{},{}",
            self.node.get(),
            self.time,
            self.version,
            self.round,
            self.accuracy,
            self.value
        )
    }
}

/// Every packet a node understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    /// `d` - start a calculation
    Distribute(Distribute),
    /// `r` - partial result
    Result(ResultPacket),
    /// `t` - bind terminal face and print the table periodically
    Table,
    /// `x` - reboot every board
    Reboot,
}

impl Packet {
    /// Packet kind byte
    pub const fn kind(&self) -> u8 {
        match self {
            Packet::Distribute(_) => b'd',
            Packet::Result(_) => b'r',
            Packet::Table => b't',
            Packet::Reboot => b'x',
        }
    }

    /// Encode to a newline-terminated frame
    pub fn encode(&self) -> Vec<u8> {
        alloc::format!("{}\n", self).into_bytes()
    }

    /// Decode a single frame; one trailing `\n` (or `\r\n`) is tolerated
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let frame = strip_newline(frame);
        let (&kind, body) = frame.split_first().ok_or(CodecError::Empty)?;
        let mut cursor = Cursor::new(body);

        let packet = match kind {
            b'd' => {
                let accuracy = cursor.accuracy("accuracy")?;
                Packet::Distribute(Distribute { accuracy })
            }
            b'r' => {
                let node = NodeId(cursor.hex("id")?);
                cursor.expect(b',', "time")?;
                let time = cursor.decimal("time")?;
                cursor.expect(b',', "version")?;
                let version = cursor.decimal("version")?;
                cursor.expect(b',', "round")?;
                let round = cursor.decimal("round")?;
                cursor.expect(b',', "accuracy")?;
                let accuracy = cursor.accuracy("accuracy")?;
                cursor.expect(b',', "value")?;
                let value = cursor.decimal("value")?;
                Packet::Result(ResultPacket {
                    node,
                    time,
                    version,
                    round,
                    accuracy,
                    value,
                })
            }
            b't' => Packet::Table,
            b'x' => Packet::Reboot,
            other => return Err(CodecError::UnknownKind(other)),
        };

        cursor.finish()?;
        Ok(packet)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Distribute(d) => write!(f, "d{}", d.accuracy),
            Packet::Result(r) => r.fmt(f),
            Packet::Table => write!(f, "t"),
            Packet::Reboot => write!(f, "x"),
        }
    }
}

fn strip_newline(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(b"\n").unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}

struct Cursor<'a> {
    rest: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(rest: &'a [u8]) -> Self {
        Self { rest }
    }

    fn expect(&mut self, byte: u8, field: &'static str) -> Result<(), CodecError> {
        match self.rest.split_first() {
            Some((&b, rest)) if b == byte => {
                self.rest = rest;
                Ok(())
            }
            _ => Err(CodecError::MissingField(field)),
        }
    }

    fn digits(&mut self, radix: u32, field: &'static str) -> Result<u32, CodecError> {
        let len = self
            .rest
            .iter()
            .take_while(|b| (**b as char).is_digit(radix))
            .count();
        if len == 0 {
            return Err(if self.rest.is_empty() {
                CodecError::MissingField(field)
            } else {
                CodecError::InvalidNumber(field)
            });
        }

        let (digits, rest) = self.rest.split_at(len);
        let mut value: u32 = 0;
        for &b in digits {
            let digit = (b as char).to_digit(radix).ok_or(CodecError::InvalidNumber(field))?;
            value = value
                .checked_mul(radix)
                .and_then(|v| v.checked_add(digit))
                .ok_or(CodecError::InvalidNumber(field))?;
        }
        self.rest = rest;
        Ok(value)
    }

    fn decimal(&mut self, field: &'static str) -> Result<u32, CodecError> {
        self.digits(10, field)
    }

    fn hex(&mut self, field: &'static str) -> Result<u32, CodecError> {
        self.digits(16, field)
    }

    fn accuracy(&mut self, field: &'static str) -> Result<Accuracy, CodecError> {
        let whole = self.decimal(field)?;
        self.expect(b'.', field)?;
        let frac = self.decimal(field)?;
        Ok(Accuracy { whole, frac })
    }

    fn finish(&self) -> Result<(), CodecError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes(self.rest.len()))
        }
    }
}

/// Reasons a frame fails to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Frame carried no bytes
    Empty,
    /// First byte is not a known packet kind
    UnknownKind(u8),
    /// A field or separator is missing
    MissingField(&'static str),
    /// A field is not a number or does not fit in 32 bits
    InvalidNumber(&'static str),
    /// Bytes left over after the last field
    TrailingBytes(usize),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Empty => write!(f, "empty frame"),
            CodecError::UnknownKind(k) => write!(f, "unknown packet kind 0x{:02x}", k),
            CodecError::MissingField(field) => write!(f, "missing field: {}", field),
            CodecError::InvalidNumber(field) => write!(f, "invalid number in field: {}", field),
            CodecError::TrailingBytes(n) => write!(f, "{} trailing bytes after last field", n),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CodecError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> ResultPacket {
        ResultPacket {
            node: NodeId(0x1f2e),
            time: 123_456,
            version: 3,
            round: 7,
            accuracy: Accuracy::new(95, 0),
            value: 785,
        }
    }

    #[test]
    fn result_wire_layout_matches_field_order() {
        let bytes = Packet::Result(sample_result()).encode();
        assert_eq!(bytes, b"r1f2e,123456,3,7,95.0,785\n".to_vec());
    }

    #[test]
    fn decode_result_reads_version_before_round() {
        let packet = Packet::decode(b"rab,5000,9,2,99.5,781\n").unwrap();
        let Packet::Result(r) = packet else {
            panic!("expected result packet, got {:?}", packet);
        };
        assert_eq!(r.node, NodeId(0xab));
        assert_eq!(r.time, 5000);
        assert_eq!(r.version, 9);
        assert_eq!(r.round, 2);
        assert_eq!(r.accuracy, Accuracy::new(99, 5));
        assert_eq!(r.value, 781);
    }

    #[test]
    fn encode_then_decode_preserves_result() {
        let packet = Packet::Result(sample_result());
        assert_eq!(Packet::decode(&packet.encode()), Ok(packet));
    }

    #[test]
    fn decode_distribute() {
        assert_eq!(
            Packet::decode(b"d95.00\n"),
            Ok(Packet::Distribute(Distribute {
                accuracy: Accuracy::new(95, 0)
            }))
        );
    }

    #[test]
    fn decode_commands_and_carriage_return() {
        assert_eq!(Packet::decode(b"t\n"), Ok(Packet::Table));
        assert_eq!(Packet::decode(b"x\r\n"), Ok(Packet::Reboot));
        assert_eq!(Packet::decode(b"x"), Ok(Packet::Reboot));
    }

    #[test]
    fn decode_rejects_missing_fields() {
        assert_eq!(
            Packet::decode(b"rab,5000,9,2,99.5\n"),
            Err(CodecError::MissingField("value"))
        );
        assert_eq!(Packet::decode(b"d95\n"), Err(CodecError::MissingField("accuracy")));
    }

    #[test]
    fn decode_rejects_extra_fields() {
        assert_eq!(
            Packet::decode(b"rab,5000,9,2,99.5,781,4\n"),
            Err(CodecError::TrailingBytes(2))
        );
        assert_eq!(Packet::decode(b"tt\n"), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn decode_rejects_non_numeric_and_overflow() {
        assert_eq!(
            Packet::decode(b"rab,50x0,9,2,99.5,781\n"),
            Err(CodecError::MissingField("version"))
        );
        assert_eq!(
            Packet::decode(b"rzz,5000,9,2,99.5,781\n"),
            Err(CodecError::InvalidNumber("id"))
        );
        assert_eq!(
            Packet::decode(b"rab,99999999999,9,2,99.5,781\n"),
            Err(CodecError::InvalidNumber("time"))
        );
    }

    #[test]
    fn decode_rejects_unknown_and_empty() {
        assert_eq!(Packet::decode(b"q\n"), Err(CodecError::UnknownKind(b'q')));
        assert_eq!(Packet::decode(b"\n"), Err(CodecError::Empty));
    }

    #[test]
    fn accuracy_percent_reads_fraction_digits_as_decimal() {
        assert_eq!(Accuracy::new(95, 0).percent(), 95.0);
        assert!((Accuracy::new(99, 5).percent() - 99.5).abs() < 1e-4);
        assert!((Accuracy::new(99, 25).percent() - 99.25).abs() < 1e-4);
        assert!((Accuracy::new(50, 50).percent() - 50.5).abs() < 1e-4);
    }
}
