//! Frame checksum strategies
//!
//! Every frame carries a 16-bit checksum rendered as four uppercase hex digits. It covers the bytes
//! between the start marker and the `;` delimiter: the address, the command code and the payload.
//! The codec and the session only ever reach the algorithm through [`Checksum`], so a different
//! firmware revision with a different algorithm needs a new implementor and nothing else.

/// A checksum algorithm over the checksummed span of a frame
pub trait Checksum
{
    /// Computes the checksum of `span`
    fn compute(span: &[u8]) -> u16;

    /// Returns whether `claimed` is the checksum of `span`
    fn verify(span: &[u8], claimed: u16) -> bool
    {
        Self::compute(span) == claimed
    }
}

/// Modulo-65536 sum of the span's bytes
///
/// This is what the PM10AHDS firmware uses. `01S,` sums to `0x00E0`, which is the checksum on the
/// status request every capture shows.
#[derive(Debug, Clone, Copy)]
pub struct Sum16 {}

impl Checksum for Sum16
{
    fn compute(span: &[u8]) -> u16
    {
        span.iter().fold(0u16, |sum, byte| sum.wrapping_add(*byte as u16))
    }
}

#[cfg(test)]
mod tests
{
    use super::{ Checksum, Sum16 };

    #[test]
    fn status_request_checksum()
    {
        assert_eq!(Sum16::compute(b"01S,"), 0x00E0);
    }

    #[test]
    fn erase_request_checksum()
    {
        assert_eq!(Sum16::compute(b"01E,"), 0x00D2);
    }

    #[test]
    fn captured_status_response_checksums()
    {
        assert_eq!(Sum16::compute(b"01S,0,0,12629320,89723519413,3200,246572000,31500,1,412700,7767"), 0x0C6B);
        assert_eq!(Sum16::compute(b"01S,0,0,12627447,89716830841,3200,244535000,32400,1,404360,7927"), 0x0C74);
    }

    #[test]
    fn sum_wraps_at_16_bits()
    {
        let span = [0xFFu8; 258];
        assert_eq!(Sum16::compute(&span), ((0xFFu32 * 258) % 65536) as u16);
    }

    #[test]
    fn verify_rejects_wrong_claim()
    {
        assert!(Sum16::verify(b"01S,", 0x00E0));
        assert!(!Sum16::verify(b"01S,", 0x00E1));
    }

    #[test]
    fn empty_span_is_zero()
    {
        assert_eq!(Sum16::compute(b""), 0);
    }
}
