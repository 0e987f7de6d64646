//! Error types for frame decoding and request sessions

use std::{ io, time::Duration };
use thiserror::Error;
use crate::frame::CommandCode;

/// A frame that could not be turned into a valid response
///
/// The variants separate "the bytes were damaged on the line" (`ChecksumMismatch`) from "the bytes
/// arrived intact but do not make sense" (everything else).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError
{
    /// Structural parse failure: a missing delimiter, a wrong marker, or a non-numeric field
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    /// The checksum carried by the frame disagrees with the one computed over its contents
    #[error("checksum mismatch: frame carries {claimed:04X}, computed {computed:04X}")]
    ChecksumMismatch { claimed: u16, computed: u16 },
    /// The status payload does not have the expected number of sub-fields
    #[error("expected {expected} payload fields, found {found}")]
    ArityMismatch { expected: usize, found: usize },
    /// A sub-field was numeric but outside what the quantity allows
    #[error("field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    /// The response came from a different device than the one addressed
    #[error("response from address {found:02X}, expected {expected:02X}")]
    AddressMismatch { expected: u8, found: u8 },
    /// The response answers a different command than the one sent
    #[error("expected a {expected} response, found {found}")]
    UnexpectedCommand { expected: CommandCode, found: CommandCode },
}

impl FrameError
{
    pub fn is_checksum_mismatch(&self) -> bool
    {
        match self {
            Self::ChecksumMismatch { .. } => true,
            _ => false,
        }
    }
}

/// An error describing a failed request/response exchange
#[derive(Debug, Error)]
pub enum SessionError
{
    /// No complete response frame arrived within the configured window
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// The underlying stream failed or closed
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    /// The device replied but the reply was corrupt or nonsensical
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),
    /// The address is reserved and no device will answer it
    #[error("device address {0} is outside 1..=254")]
    InvalidAddress(u8),
}

impl SessionError
{
    /// Whether repeating the exchange could plausibly succeed
    ///
    /// Only a silent device or a damaged frame qualify. A well-formed reply carrying bad data will
    /// come back the same way.
    pub fn is_retryable(&self) -> bool
    {
        match self {
            Self::Timeout(_) => true,
            Self::Protocol(frame_err) => frame_err.is_checksum_mismatch(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::{ FrameError, SessionError };
    use crate::frame::CommandCode;
    use std::{ io, time::Duration };

    #[test]
    fn retryable_errors()
    {
        assert!(SessionError::Timeout(Duration::from_secs(2)).is_retryable());
        assert!(SessionError::from(FrameError::ChecksumMismatch { claimed: 1, computed: 2 }).is_retryable());
        assert!(!SessionError::from(FrameError::Malformed("missing start marker")).is_retryable());
        assert!(!SessionError::from(FrameError::ArityMismatch { expected: 10, found: 9 }).is_retryable());
        assert!(!SessionError::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_retryable());
        assert!(!SessionError::InvalidAddress(0).is_retryable());
    }

    #[test]
    fn messages_name_the_problem()
    {
        let err = FrameError::ChecksumMismatch { claimed: 0x0C6B, computed: 0x0C6A };
        assert_eq!(err.to_string(), "checksum mismatch: frame carries 0C6B, computed 0C6A");

        let err = FrameError::UnexpectedCommand { expected: CommandCode::Status, found: CommandCode::Erase };
        assert_eq!(err.to_string(), "expected a status response, found erase");

        let err = SessionError::from(FrameError::AddressMismatch { expected: 1, found: 0x1A });
        assert_eq!(err.to_string(), "protocol error: response from address 1A, expected 01");
    }
}
