//! Frame encoding and decoding
//!
//! # Wire Format
//! Requests and responses share one delimited ASCII layout:
//!
//! ```text
//! <01S,;00E0\r\n
//! >01S,0,0,12629320,89723519413,3200,246572000,31500,1,412700,7767;0C6B\r
//! ^ ^ ^^              ^                                             ^   ^
//! | | ||              payload (comma separated)                     |   terminator
//! | | |field separator                                 checksum (4 hex digits)
//! | | command code
//! | address (2 hex digits)
//! marker: '<' request, '>' response
//! ```
//!
//! The checksum covers everything between the marker and the `;`. Requests end with `\r\n`, the
//! meter ends its responses with a bare `\r`. Decoding accepts either, or no terminator at all.
//!
//! Nothing in here performs I/O. The session feeds complete frames in and gets typed values out.

use std::{ fmt, marker::PhantomData };
use crate::{
    checksum::Checksum,
    error::FrameError,
};

/// The command letter following the address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode
{
    /// Query the accumulated and instantaneous measurements
    ///
    /// Command: `S`
    Status,
    /// Reset the meter's accumulators
    ///
    /// Command: `E`
    Erase,
}

impl CommandCode
{
    pub fn letter(&self) -> char
    {
        match self {
            Self::Status => 'S',
            Self::Erase => 'E',
        }
    }

    fn from_byte(byte: u8) -> Option<Self>
    {
        match byte {
            b'S' => Some(Self::Status),
            b'E' => Some(Self::Erase),
            _ => None,
        }
    }
}

impl fmt::Display for CommandCode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Status => f.write_str("status"),
            Self::Erase => f.write_str("erase"),
        }
    }
}

/// Which way a frame travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker
{
    /// Host to meter, `<`
    Request,
    /// Meter to host, `>`
    Response,
}

impl Marker
{
    pub fn symbol(&self) -> char
    {
        match self {
            Self::Request => '<',
            Self::Response => '>',
        }
    }

    /// The line ending each side puts after its frames
    pub fn terminator(&self) -> &'static str
    {
        match self {
            Self::Request => "\r\n",
            Self::Response => "\r",
        }
    }

    fn from_byte(byte: u8) -> Option<Self>
    {
        match byte {
            b'<' => Some(Self::Request),
            b'>' => Some(Self::Response),
            _ => None,
        }
    }
}

/// A request the host can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command
{
    Status { address: u8 },
    Erase { address: u8 },
}

impl Command
{
    pub fn address(&self) -> u8
    {
        match self {
            Self::Status { address } => *address,
            Self::Erase { address } => *address,
        }
    }

    pub fn code(&self) -> CommandCode
    {
        match self {
            Self::Status { .. } => CommandCode::Status,
            Self::Erase { .. } => CommandCode::Erase,
        }
    }
}

/// One frame, minus its checksum and terminator
///
/// A decoded frame has already had its checksum verified. The payload is left as raw text fields;
/// turning them into quantities is the job of [`crate::reading`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame
{
    pub marker: Marker,
    pub address: u8,
    pub code: CommandCode,
    pub payload: Vec<String>,
}

impl Frame
{
    /// The request frame for a command. Requests carry no payload.
    pub fn request(cmd: &Command) -> Self
    {
        Self {
            marker: Marker::Request,
            address: cmd.address(),
            code: cmd.code(),
            payload: Vec::new(),
        }
    }

    /// A response frame as the meter would send it
    ///
    /// Fields are written verbatim, so they must not contain `,` or `;`.
    pub fn response(address: u8, code: CommandCode, payload: Vec<String>) -> Self
    {
        Self {
            marker: Marker::Response,
            address: address,
            code: code,
            payload: payload,
        }
    }

    /// The checksummed span: address, command code, separator and payload
    fn span(&self) -> String
    {
        format!("{:02X}{},{}", self.address, self.code.letter(), self.payload.join(","))
    }

    pub fn checksum<C: Checksum>(&self) -> u16
    {
        C::compute(self.span().as_bytes())
    }

    /// Displays the complete frame, checksum and terminator included
    pub fn display<C: Checksum>(&self) -> FrameDisplay<'_, C>
    {
        FrameDisplay {
            frame: self,
            _checksum: PhantomData,
        }
    }

    pub fn to_bytes<C: Checksum>(&self) -> Vec<u8>
    {
        self.display::<C>().to_string().into_bytes()
    }
}

/// Serializes a frame with the checksum algorithm `C`
pub struct FrameDisplay<'f, C>
{
    frame: &'f Frame,
    // the algorithm is picked at compile time and has no state of its own
    _checksum: PhantomData<C>,
}

impl <'f, C> fmt::Display for FrameDisplay<'f, C>
    where C: Checksum
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let span = self.frame.span();
        write!(
            f,
            "{}{};{:04X}{}",
            self.frame.marker.symbol(),
            span,
            C::compute(span.as_bytes()),
            self.frame.marker.terminator(),
        )
    }
}

/// Encodes a command into the exact bytes to put on the line
pub fn encode<C: Checksum>(cmd: &Command) -> Vec<u8>
{
    Frame::request(cmd).to_bytes::<C>()
}

/// Decodes one frame
///
/// The checksum is verified before the span is picked apart, so damage anywhere inside it
/// (address and command code included) reports [`FrameError::ChecksumMismatch`] rather than a
/// structural error.
pub fn decode<C: Checksum>(bytes: &[u8]) -> Result<Frame, FrameError>
{
    let bytes = strip_terminator(bytes);
    let (marker, rest) = match bytes.split_first() {
        Some((first, rest)) => (
            Marker::from_byte(*first).ok_or(FrameError::Malformed("missing start marker"))?,
            rest,
        ),
        None => return Err(FrameError::Malformed("empty frame")),
    };

    let delimiter = rest
        .iter()
        .rposition(|byte| *byte == b';')
        .ok_or(FrameError::Malformed("missing checksum delimiter"))?;
    let span = &rest[..delimiter];
    let claimed = parse_hex_field(&rest[delimiter + 1..], 4)
        .ok_or(FrameError::Malformed("checksum is not 4 hex digits"))?;

    if !C::verify(span, claimed) {
        return Err(FrameError::ChecksumMismatch {
            claimed: claimed,
            computed: C::compute(span),
        });
    }

    parse_span(marker, span)
}

fn strip_terminator(bytes: &[u8]) -> &[u8]
{
    let mut end = bytes.len();

    if end > 0 && bytes[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && bytes[end - 1] == b'\r' {
        end -= 1;
    }

    &bytes[..end]
}

/// Parses exactly `width` hex digits
///
/// `from_str_radix` alone would also accept a leading `+`, hence the digit check.
fn parse_hex_field(field: &[u8], width: usize) -> Option<u16>
{
    if field.len() != width || !field.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }

    // all hex digits, so this is ASCII
    let text = std::str::from_utf8(field).ok()?;
    u16::from_str_radix(text, 16).ok()
}

fn parse_span(marker: Marker, span: &[u8]) -> Result<Frame, FrameError>
{
    if span.len() < 4 {
        return Err(FrameError::Malformed("frame too short"));
    }

    let address = parse_hex_field(&span[0..2], 2)
        .ok_or(FrameError::Malformed("address is not 2 hex digits"))?;
    let code = CommandCode::from_byte(span[2])
        .ok_or(FrameError::Malformed("unknown command code"))?;

    if span[3] != b',' {
        return Err(FrameError::Malformed("missing field separator after command code"));
    }

    let payload = std::str::from_utf8(&span[4..])
        .ok()
        .filter(|text| text.is_ascii())
        .ok_or(FrameError::Malformed("payload is not ASCII"))?;

    let payload = if payload.is_empty() {
        Vec::new()
    }
    else {
        payload.split(',').map(String::from).collect()
    };

    Ok(Frame {
        marker: marker,
        address: address as u8,
        code: code,
        payload: payload,
    })
}

#[cfg(test)]
mod tests
{
    use super::{ decode, encode, Command, CommandCode, Frame, Marker };
    use crate::{ checksum::Sum16, error::FrameError };

    const CAPTURED_STATUS: &[u8] = b">01S,0,0,12629320,89723519413,3200,246572000,31500,1,412700,7767;0C6B\r";

    #[test]
    fn serialize_status_request()
    {
        assert_eq!(encode::<Sum16>(&Command::Status { address: 1 }), b"<01S,;00E0\r\n");
    }

    #[test]
    fn serialize_erase_request()
    {
        assert_eq!(encode::<Sum16>(&Command::Erase { address: 1 }), b"<01E,;00D2\r\n");
    }

    #[test]
    fn address_is_two_uppercase_hex_digits()
    {
        assert_eq!(encode::<Sum16>(&Command::Status { address: 10 }), b"<0AS,;00F0\r\n");
        assert_eq!(encode::<Sum16>(&Command::Status { address: 254 }), b"<FES,;010A\r\n");
    }

    #[test]
    fn decode_captured_status()
    {
        let frame = decode::<Sum16>(CAPTURED_STATUS).unwrap();

        assert_eq!(frame.marker, Marker::Response);
        assert_eq!(frame.checksum::<Sum16>(), 0x0C6B);
        assert_eq!(frame.address, 1);
        assert_eq!(frame.code, CommandCode::Status);
        assert_eq!(
            frame.payload,
            vec!["0", "0", "12629320", "89723519413", "3200", "246572000", "31500", "1", "412700", "7767"],
        );
    }

    #[test]
    fn terminator_is_optional()
    {
        let bare = &CAPTURED_STATUS[..CAPTURED_STATUS.len() - 1];
        let mut crlf = bare.to_vec();
        crlf.extend_from_slice(b"\r\n");

        let expected = decode::<Sum16>(CAPTURED_STATUS).unwrap();
        assert_eq!(decode::<Sum16>(bare).unwrap(), expected);
        assert_eq!(decode::<Sum16>(&crlf).unwrap(), expected);
    }

    #[test]
    fn request_round_trips()
    {
        for cmd in [Command::Status { address: 1 }, Command::Erase { address: 0x3C }] {
            let frame = decode::<Sum16>(&encode::<Sum16>(&cmd)).unwrap();
            assert_eq!(frame.marker, Marker::Request);
            assert_eq!(frame.address, cmd.address());
            assert_eq!(frame.code, cmd.code());
            assert!(frame.payload.is_empty());
        }
    }

    #[test]
    fn response_round_trips()
    {
        let frame = Frame::response(7, CommandCode::Erase, vec![]);
        let bytes = frame.to_bytes::<Sum16>();

        assert_eq!(bytes, b">07E,;00D8\r");
        assert_eq!(decode::<Sum16>(&bytes).unwrap(), frame);
    }

    #[test]
    fn any_damage_inside_span_is_a_checksum_mismatch()
    {
        // span runs from after the marker up to the `;`
        let delimiter = CAPTURED_STATUS.iter().rposition(|byte| *byte == b';').unwrap();

        for index in 1..delimiter {
            let mut damaged = CAPTURED_STATUS.to_vec();
            damaged[index] ^= 0x01;

            match decode::<Sum16>(&damaged) {
                Err(FrameError::ChecksumMismatch { claimed, .. }) => assert_eq!(claimed, 0x0C6B),
                other => panic!("byte {} flipped but decode returned {:?}", index, other),
            }
        }
    }

    #[test]
    fn wrong_marker_is_malformed()
    {
        assert_eq!(
            decode::<Sum16>(b"#01S,;00E0\r"),
            Err(FrameError::Malformed("missing start marker")),
        );
        assert_eq!(decode::<Sum16>(b"\r\n"), Err(FrameError::Malformed("empty frame")));
    }

    #[test]
    fn missing_checksum_is_malformed()
    {
        assert_eq!(
            decode::<Sum16>(b">01S,0,0\r"),
            Err(FrameError::Malformed("missing checksum delimiter")),
        );
        assert_eq!(
            decode::<Sum16>(b">01S,;E0\r"),
            Err(FrameError::Malformed("checksum is not 4 hex digits")),
        );
        assert_eq!(
            decode::<Sum16>(b">01S,;+0E0\r"),
            Err(FrameError::Malformed("checksum is not 4 hex digits")),
        );
    }

    #[test]
    fn checksum_valid_but_structurally_broken()
    {
        // each of these carries the correct sum for its span
        assert_eq!(decode::<Sum16>(b">01;0061\r"), Err(FrameError::Malformed("frame too short")));
        assert_eq!(
            decode::<Sum16>(b">0GS,;00F6\r"),
            Err(FrameError::Malformed("address is not 2 hex digits")),
        );
        assert_eq!(decode::<Sum16>(b">01Q,;00DE\r"), Err(FrameError::Malformed("unknown command code")));
        assert_eq!(
            decode::<Sum16>(b">01SX;010C\r"),
            Err(FrameError::Malformed("missing field separator after command code")),
        );
    }

    #[test]
    fn lowercase_checksum_digits_are_accepted()
    {
        let frame = decode::<Sum16>(b">01S,0,0,12629320,89723519413,3200,246572000,31500,1,412700,7767;0c6b\r").unwrap();
        assert_eq!(frame.payload.len(), 10);
    }
}
