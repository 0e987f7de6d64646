//! Request/response exchanges with one meter port
//!
//! # Exchange
//! Every request follows the same path: encode, write, read until a line ending or the timeout,
//! decode, validate. The meter has no request IDs, so a response is matched to a request only by
//! being the next frame on the line. Each request method takes `&mut self` and runs to completion
//! before returning, which makes a second request while one is outstanding impossible.
//!
//! # Retry
//! With retries enabled (the default) a request that times out or whose reply fails its checksum
//! is sent exactly once more. If the second attempt fails too, the first error is returned.
//!
//! # Cancel Safety
//! **The request methods are not cancel safe**, i.e. they should not be raced inside a
//! `tokio::select!`. Cancelling after the write but before the read leaves the meter's reply on the
//! line. Before every write the session drains whatever input has already arrived, but bytes still
//! in flight at that moment could be taken as the answer to the new request. Let the configured
//! timeout do the cancelling instead.

use std::{ io, marker::PhantomData, time::Duration };
use tokio::io::{ AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt };
use tracing::{ debug, error, instrument, warn };
use crate::{
    checksum::{ Checksum, Sum16 },
    config::SessionConfig,
    error::{ FrameError, SessionError },
    frame::{ self, Command, CommandCode, Frame, Marker },
    reading::{ self, EraseAck, StatusReading },
};

/// Longest line kept while looking for its terminator
///
/// A full status frame is well under 100 bytes.
const MAX_FRAME_LEN: usize = 256;

fn is_line_ending(byte: u8) -> bool
{
    byte == b'\r' || byte == b'\n'
}

/// A handle to one meter port
///
/// Creating the I/O stream is not handled here so that any transport works: a local serial port
/// from [`crate::config::open_port`], a TCP serial bridge, or an in-memory stream in tests.
///
/// `C` selects the checksum algorithm and defaults to the one the PM10AHDS uses.
pub struct Session<T, C = Sum16>
{
    io_handle: T,
    config: SessionConfig,
    // Reused between requests for its allocation only. It is cleared before every attempt.
    read_buf: Vec<u8>,
    _checksum: PhantomData<C>,
}

impl <T> Session<T, Sum16>
    where T: AsyncRead + AsyncWrite + Unpin + Send
{
    /// Construct a new session with the default timeout and retry settings
    pub fn with(io_handle: T) -> Self
    {
        Self::with_config(io_handle, SessionConfig::default())
    }

    pub fn with_config(io_handle: T, config: SessionConfig) -> Self
    {
        Self::with_checksum(io_handle, config)
    }
}

impl <T, C> Session<T, C>
    where T: AsyncRead + AsyncWrite + Unpin + Send,
          C: Checksum
{
    /// Construct a session which checksums frames with `C`
    ///
    /// ```ignore
    /// let session = Session::<_, MyChecksum>::with_checksum(port, SessionConfig::default());
    /// ```
    pub fn with_checksum(io_handle: T, config: SessionConfig) -> Self
    {
        Self {
            io_handle: io_handle,
            config: config,
            read_buf: Vec::with_capacity(128),
            _checksum: PhantomData,
        }
    }

    pub fn config(&self) -> &SessionConfig
    {
        &self.config
    }

    /// Gives back the I/O stream
    pub fn into_inner(self) -> T
    {
        self.io_handle
    }

    /// Drops the first `n` bytes from the read buffer
    ///
    /// Drops all bytes if `n >= self.read_buf.len()`
    fn drop_first(&mut self, n: usize)
    {
        if n >= self.read_buf.len() {
            self.read_buf.clear();
        }
        else {
            self.read_buf.drain(..n);
        }
    }

    /// Returns the index of the first `CR` or `LF` in the read buffer, starting the search at
    /// `start_hint`
    fn find_line_ending(&self, start_hint: usize) -> Option<usize>
    {
        self.read_buf
            .iter()
            .skip(start_hint)
            .position(|byte| is_line_ending(*byte))
            .map(|offset| start_hint + offset)
    }

    /// Reads and throws away whatever the transport can hand over without waiting
    ///
    /// A reply that arrives after its attempt timed out, or the second of two replies to a retried
    /// request, is otherwise taken as the answer to the next request.
    async fn discard_pending(&mut self) -> Result<(), SessionError>
    {
        let mut temp_buf = [0u8; 64];
        let mut discarded = 0;

        loop {
            match tokio::time::timeout(Duration::ZERO, self.io_handle.read(&mut temp_buf[..])).await {
                // end of stream is reported by the read that follows the request
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(bytes_read)) => discarded += bytes_read,
                Ok(Err(err)) => return Err(err.into()),
            }
        }

        if discarded > 0 {
            debug!(bytes = discarded, "discarded stale input");
        }

        Ok(())
    }

    /// Reads one frame into the read buffer and returns its length, not counting the line ending
    ///
    /// Line endings before the frame are skipped. They are the tail of a previous `\r\n`. A line
    /// longer than [`MAX_FRAME_LEN`] is dropped up to its line ending and reading carries on, so
    /// only the caller's timeout ends a stream that never terminates a frame.
    async fn read_frame(&mut self) -> Result<usize, SessionError>
    {
        let mut scanned = 0;
        let mut overlong = false;

        loop {
            if overlong {
                match self.find_line_ending(0) {
                    Some(end_index) => {
                        self.drop_first(end_index);
                        overlong = false;
                    },
                    None => self.read_buf.clear(),
                }
                scanned = 0;
            }

            let leading = self.read_buf.iter().take_while(|byte| is_line_ending(**byte)).count();

            if leading > 0 {
                self.drop_first(leading);
                scanned = 0;
            }

            if let Some(end_index) = self.find_line_ending(scanned) {
                if end_index <= MAX_FRAME_LEN {
                    return Ok(end_index);
                }

                warn!(bytes = end_index, "skipping a line too long to be a frame");
                self.drop_first(end_index);
                scanned = 0;
                continue;
            }

            scanned = self.read_buf.len();

            if scanned > MAX_FRAME_LEN {
                warn!(bytes = scanned, "no line ending in sight, skipping the rest of the line");
                self.read_buf.clear();
                scanned = 0;
                overlong = true;
            }

            let mut temp_buf = [0u8; 64];
            let bytes_read = self.io_handle.read(&mut temp_buf[..]).await?;

            if bytes_read == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "port closed while awaiting a response").into());
            }

            self.read_buf.extend_from_slice(&temp_buf[..bytes_read]);
        }
    }

    /// Sends the command once and returns the checksum-verified response frame
    async fn exchange(&mut self, cmd: &Command) -> Result<Frame, SessionError>
    {
        self.read_buf.clear();
        self.discard_pending().await?;

        let request = frame::encode::<C>(cmd);
        let printable = String::from_utf8_lossy(&request);
        debug!(request = %printable.escape_debug(), "sending request");

        self.io_handle.write_all(&request).await?;
        self.io_handle.flush().await?;

        let timeout = self.config.response_timeout();
        let frame_len = match tokio::time::timeout(timeout, self.read_frame()).await {
            Ok(read_result) => read_result?,
            Err(_elapsed) => return Err(SessionError::Timeout(timeout)),
        };

        let response = &self.read_buf[..frame_len];
        let printable = String::from_utf8_lossy(response);
        debug!(response = %printable.escape_debug(), "received response");

        let frame = frame::decode::<C>(response)?;

        if frame.marker != Marker::Response {
            return Err(FrameError::Malformed("expected a response marker").into());
        }

        if frame.address != cmd.address() {
            return Err(FrameError::AddressMismatch {
                expected: cmd.address(),
                found: frame.address,
            }
            .into());
        }

        Ok(frame)
    }

    /// Executes the given command, retrying once if the failure might be transient
    async fn exec_cmd(&mut self, cmd: Command) -> Result<Frame, SessionError>
    {
        match self.exchange(&cmd).await {
            Err(err) if err.is_retryable() && self.config.retry_enabled() => {
                warn!(error = %err, "retrying request");

                self.exchange(&cmd).await.map_err(|retry_err| {
                    error!(error = %retry_err, "retry failed");
                    err
                })
            },
            Err(err) => {
                error!(error = %err, "request failed");
                Err(err)
            },
            Ok(frame) => Ok(frame),
        }
    }

    /// Queries the meter's accumulated and instantaneous measurements
    #[instrument(level = "debug", skip(self))]
    pub async fn request_status(&mut self, address: u8) -> Result<StatusReading, SessionError>
    {
        let cmd = Command::Status { address: checked_address(address)? };
        let frame = self.exec_cmd(cmd).await?;

        if frame.code != CommandCode::Status {
            error!(found = %frame.code, "response does not answer a status request");
            return Err(FrameError::UnexpectedCommand {
                expected: CommandCode::Status,
                found: frame.code,
            }
            .into());
        }

        reading::decode_status(&frame.payload).map_err(|err| {
            error!(error = %err, "status payload rejected");
            err.into()
        })
    }

    /// Resets the meter's accumulators
    ///
    /// A reply that passes validation but does not echo the erase yields an acknowledgement with
    /// `completed() == false`.
    #[instrument(level = "debug", skip(self))]
    pub async fn request_erase(&mut self, address: u8) -> Result<EraseAck, SessionError>
    {
        let cmd = Command::Erase { address: checked_address(address)? };
        let frame = self.exec_cmd(cmd).await?;
        let ack = EraseAck::from_frame(&frame);

        if !ack.completed() {
            warn!(found = %frame.code, "unexpected response to erase request");
        }

        Ok(ack)
    }
}

/// Addresses 0x00 and 0xFF are not assignable to a meter
fn checked_address(address: u8) -> Result<u8, SessionError>
{
    match address {
        1..=254 => Ok(address),
        _ => Err(SessionError::InvalidAddress(address)),
    }
}

#[cfg(test)]
mod tests
{
    use super::{ checked_address, Session };
    use crate::error::SessionError;
    use tokio_test::io::Builder;

    #[test]
    fn reserved_addresses()
    {
        assert!(matches!(checked_address(0), Err(SessionError::InvalidAddress(0))));
        assert!(matches!(checked_address(255), Err(SessionError::InvalidAddress(255))));
        assert_eq!(checked_address(1).unwrap(), 1);
        assert_eq!(checked_address(254).unwrap(), 254);
    }

    #[tokio::test]
    async fn leading_line_endings_are_skipped()
    {
        let mock = Builder::new().read(b"\n\r\n>01E,;00D2\r").build();
        let mut session = Session::with(mock);

        let frame_len = session.read_frame().await.unwrap();
        assert_eq!(&session.read_buf[..frame_len], b">01E,;00D2");
    }

    #[tokio::test]
    async fn frame_split_across_reads()
    {
        let mock = Builder::new().read(b">01").read(b"E,;00").read(b"D2\r\n").build();
        let mut session = Session::with(mock);

        let frame_len = session.read_frame().await.unwrap();
        assert_eq!(&session.read_buf[..frame_len], b">01E,;00D2");
    }
}
