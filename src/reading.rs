//! Decoded meter readings
//!
//! A status response carries ten comma separated integers:
//!
//! | index | content                                    | raw unit          |
//! |-------|--------------------------------------------|-------------------|
//! | 0, 1  | reserved, always `0` on captured frames    |                   |
//! | 2     | runtime since the last erase               | seconds           |
//! | 3     | accumulated energy                         | millijoules       |
//! | 4     | real power                                 | milliwatts        |
//! | 5     | line voltage                               | microvolts        |
//! | 6     | line current                               | microamps         |
//! | 7     | power factor lead (`0`) or lag (`1`)       |                   |
//! | 8     | power factor                               | millionths        |
//! | 9     | apparent power                             | milli-volt-amps   |

use std::time::Duration;
use crate::{
    error::FrameError,
    frame::{ CommandCode, Frame },
    units::{ Ampere, Joule, PowerFactor, Volt, VoltAmpere, Watt, scalar::{ Milli, Micro } },
};

/// Number of sub-fields in a status payload
pub const STATUS_FIELDS: usize = 10;

const FIELD_NAMES: [&str; STATUS_FIELDS] = [
    "reserved0",
    "reserved1",
    "runtime_seconds",
    "energy",
    "power",
    "voltage",
    "current",
    "powerfactor_leadlag",
    "powerfactor",
    "apparent_power",
];

/// Whether the current leads or lags the voltage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerFactorPhase
{
    Lead,
    Lag,
}

/// One status snapshot from the meter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReading
{
    /// Seconds since the accumulators were last erased
    pub runtime_seconds: u64,
    /// Energy accumulated since the last erase
    pub energy: Joule,
    /// Instantaneous real power
    pub power: Watt,
    pub voltage: Volt,
    pub current: Ampere,
    pub powerfactor_leadlag: PowerFactorPhase,
    /// Always within `0..=1`
    pub powerfactor: PowerFactor,
    pub apparent_power: VoltAmpere,
}

impl StatusReading
{
    pub fn runtime(&self) -> Duration
    {
        Duration::from_secs(self.runtime_seconds)
    }

    pub fn energy_kwh(&self) -> f64
    {
        self.energy.kilowatt_hours()
    }

    pub fn power_w(&self) -> f64
    {
        self.power.as_f64_base()
    }

    pub fn voltage_v(&self) -> f64
    {
        self.voltage.as_f64_base()
    }

    pub fn current_a(&self) -> f64
    {
        self.current.as_f64_base()
    }

    /// Power factor as a ratio in `0.0..=1.0`
    pub fn powerfactor(&self) -> f64
    {
        self.powerfactor.as_f64_base()
    }

    pub fn apparent_power_va(&self) -> f64
    {
        self.apparent_power.as_f64_base()
    }
}

/// Acknowledgement of an erase request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseAck
{
    completed: bool,
}

impl EraseAck
{
    /// Interprets a checksum-verified response to an erase request
    ///
    /// Any intact reply other than an erase echo means the meter did something else with the
    /// request, so the erase is reported as not completed.
    pub fn from_frame(frame: &Frame) -> Self
    {
        Self {
            completed: frame.code == CommandCode::Erase,
        }
    }

    pub fn completed(&self) -> bool
    {
        self.completed
    }
}

impl From<EraseAck> for bool
{
    fn from(this: EraseAck) -> bool
    {
        this.completed
    }
}

/// Parses one payload field as a non-negative decimal integer
fn raw_field(field: &str, name: &'static str) -> Result<u64, FrameError>
{
    let (negative, digits) = match field.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, field),
    };

    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(FrameError::Malformed("payload field is not a decimal integer"));
    }

    // all digits, so the only way this fails is overflow
    let value = digits
        .parse::<u64>()
        .map_err(|_| FrameError::OutOfRange { field: name, value: if negative { i64::MIN } else { i64::MAX } })?;

    if negative && value != 0 {
        Err(FrameError::OutOfRange { field: name, value: -(value.min(i64::MAX as u64) as i64) })
    }
    else {
        Ok(value)
    }
}

fn out_of_range(name: &'static str, raw: u64) -> FrameError
{
    FrameError::OutOfRange {
        field: name,
        value: i64::try_from(raw).unwrap_or(i64::MAX),
    }
}

macro_rules! scaled
{
    ( $raw:expr, $index:expr, $prefix:ident $u:ident ) => {
        $u::from_count::<$prefix>($raw[$index])
    };
}

/// Decodes the payload of a status response
///
/// Fails without producing a partial reading if any field is missing, extra, non-numeric or out of
/// range.
pub fn decode_status<S>(payload: &[S]) -> Result<StatusReading, FrameError>
    where S: AsRef<str>
{
    if payload.len() != STATUS_FIELDS {
        return Err(FrameError::ArityMismatch {
            expected: STATUS_FIELDS,
            found: payload.len(),
        });
    }

    let mut raw = [0u64; STATUS_FIELDS];

    for (index, field) in payload.iter().enumerate() {
        raw[index] = raw_field(field.as_ref(), FIELD_NAMES[index])?;
    }

    let powerfactor_leadlag = match raw[7] {
        0 => PowerFactorPhase::Lead,
        1 => PowerFactorPhase::Lag,
        other => return Err(out_of_range(FIELD_NAMES[7], other)),
    };

    let powerfactor = scaled!(raw, 8, Micro PowerFactor);

    if powerfactor > PowerFactor::UNITY {
        return Err(out_of_range(FIELD_NAMES[8], raw[8]));
    }

    Ok(StatusReading {
        runtime_seconds: raw[2],
        energy: scaled!(raw, 3, Milli Joule),
        power: scaled!(raw, 4, Milli Watt),
        voltage: scaled!(raw, 5, Micro Volt),
        current: scaled!(raw, 6, Micro Ampere),
        powerfactor_leadlag: powerfactor_leadlag,
        powerfactor: powerfactor,
        apparent_power: scaled!(raw, 9, Milli VoltAmpere),
    })
}
