//! Session and serial line configuration

use std::time::Duration;

/// Line rate of the meter's RS232 port. The meter has no way to negotiate it.
pub const BAUD_RATE: u32 = 9600;

/// Settings for one [`crate::Session`]
///
/// ```
/// use std::time::Duration;
/// use pm10ahds::SessionConfig;
///
/// let config = SessionConfig::new()
///     .timeout(Duration::from_millis(1500))
///     .retry(false);
///
/// assert_eq!(config.response_timeout(), Duration::from_millis(1500));
/// assert!(!config.retry_enabled());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig
{
    timeout: Duration,
    retry: bool,
}

impl SessionConfig
{
    /// The meter can take up to a second to answer a status request
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new() -> Self
    {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            retry: true,
        }
    }

    /// How long to wait for a complete response frame after the request is written
    ///
    /// The bound applies to each attempt separately, so with retries enabled a call can take up to
    /// twice this long.
    pub fn timeout(mut self, timeout: Duration) -> Self
    {
        self.timeout = timeout;
        self
    }

    /// Whether to repeat a request once after a timeout or a checksum mismatch
    pub fn retry(mut self, retry: bool) -> Self
    {
        self.retry = retry;
        self
    }

    pub fn response_timeout(&self) -> Duration
    {
        self.timeout
    }

    pub fn retry_enabled(&self) -> bool
    {
        self.retry
    }
}

impl Default for SessionConfig
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Opens a serial port with the meter's fixed line settings: 9600 baud, 8 data bits, no parity,
/// 1 stop bit, no flow control
///
/// Finding the right port is up to the caller. Any other `AsyncRead + AsyncWrite` stream, such as a
/// TCP serial bridge, works with [`crate::Session`] just as well.
#[cfg(feature = "serial")]
pub fn open_port(path: &str) -> std::io::Result<tokio_serial::SerialStream>
{
    use tokio_serial::SerialPortBuilderExt;

    let port = tokio_serial::new(path, BAUD_RATE)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()?;

    tracing::info!(path, baud = BAUD_RATE, "opened serial port");

    Ok(port)
}

#[cfg(test)]
mod tests
{
    use super::SessionConfig;
    use std::time::Duration;

    #[test]
    fn defaults_match_meter_timing()
    {
        let config = SessionConfig::default();
        assert_eq!(config.response_timeout(), Duration::from_secs(2));
        assert!(config.retry_enabled());
    }

    #[test]
    fn builder_overrides()
    {
        let config = SessionConfig::new().timeout(Duration::from_millis(250)).retry(false);
        assert_eq!(config.response_timeout(), Duration::from_millis(250));
        assert!(!config.retry_enabled());
    }
}
