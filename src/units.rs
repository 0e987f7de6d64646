//! Physical quantities with exact decimal storage
//!
//! The meter reports every quantity as an integer count of some sub-unit (milliwatts, microvolts,
//! millijoules...). Converting those straight to `f64` would smear values like `3200 mW` into
//! `3.2000000000000001776`, so each quantity is kept as an unsigned count of billionths of its base
//! unit and only turned into a float when the caller asks for one.

use std::fmt::{ self, Write };

/// Unsigned decimal value with nano (10e-9) precision
///
/// Stored in 128 bits so that any 64-bit count of milli- or micro-units fits without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
struct FixedNano
{
    nanos: u128,
}

impl FixedNano
{
    /// Number of nano-units in one unit of the given scalar
    fn divisor<S: Scalar>() -> u128
    {
        10u128.pow((9 + S::magnitude()) as u32)
    }

    /// Construct a new value from a count of units with a specified magnitude
    fn from_count<S: Scalar>(num: u64) -> Self
    {
        Self { nanos: u128::from(num) * Self::divisor::<S>() }
    }

    /// Construct a new value from its whole and fractional parts with reference to a particular
    /// magnitude
    ///
    /// For example, to construct 4.35 with thousandths precision, you would specify `from_parts::<Milli>(4, 350_000)`
    fn from_parts<S: Scalar>(whole: u64, fraction: u64) -> Self
    {
        let divisor = Self::divisor::<S>();
        let fraction = u128::from(fraction);
        let whole = u128::from(whole) + fraction / divisor;
        Self { nanos: whole * divisor + fraction % divisor }
    }

    fn as_f64_base(&self) -> f64
    {
        // a single division keeps the result correctly rounded for anything below 2^53 nanos
        self.nanos as f64 / Self::divisor::<Base>() as f64
    }
}

/// Defines a scalar prefix type for displaying and constructing units e.g. "kilo-" or "micro-"
///
/// # Implementation
/// Although this trait is public, users should not attempt to implement it. The magnitude is used
/// to compute powers of ten over a nano-precision backing store, so anything below -9 or above 9
/// will panic.
pub trait Scalar
{
    /// Return the power of 10 of this scalar
    ///
    /// For example, a prefix of "milli-" should return -3.
    fn magnitude() -> i32;

    /// Return this scalar's written shorthand notation
    ///
    /// For example, a prefix of "kilo-" should return "k"
    fn notation() -> &'static str;
}

pub mod scalar
{
    use super::Scalar;

    macro_rules! impl_prefix
    {
        { $name:ident, $magnitude:literal, $notation:literal } => {
            #[derive(Debug, Clone, Copy)]
            pub struct $name {}

            impl $name
            {
                pub const MAGNITUDE: i32 = $magnitude;
                pub const NOTATION: &'static str = $notation;
            }

            impl Scalar for $name
            {
                fn magnitude() -> i32
                {
                    Self::MAGNITUDE
                }

                fn notation() -> &'static str
                {
                    Self::NOTATION
                }
            }
        }
    }

    impl_prefix!{ Micro, -6, "u" }
    impl_prefix!{ Milli, -3, "m" }
    impl_prefix!{ Base, 0, "" }
}

use scalar::Base;

/// Formats a quantity with a chosen prefix
///
/// Without a precision (`{}`) every significant fractional digit is printed. With a precision
/// (`{:.2}`) digits beyond it are truncated, not rounded, and missing ones are zero-filled.
pub struct UnitDisplay
{
    symbol: &'static str,
    notation: &'static str,
    magnitude: i32,
    value: FixedNano,
}

impl UnitDisplay
{
    fn write_digit(f: &mut fmt::Formatter<'_>, digit: u128) -> fmt::Result
    {
        f.write_char(char::from(b'0' + digit as u8))
    }
}

impl fmt::Display for UnitDisplay
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let mut divisor = 10u128.pow((9 + self.magnitude) as u32);
        let whole = self.value.nanos / divisor;
        let mut fraction = self.value.nanos % divisor;
        write!(f, "{}", whole)?;

        if let Some(precision) = f.precision() {
            if precision != 0 {
                f.write_char('.')?;
            }

            for _index in 0..precision {
                if fraction == 0 || divisor == 1 {
                    f.write_char('0')?;
                }
                else {
                    divisor /= 10;
                    Self::write_digit(f, fraction / divisor)?;
                    fraction = fraction % divisor;
                }
            }
        }
        else {
            if fraction != 0 {
                f.write_char('.')?;
            }
            while fraction != 0 {
                divisor /= 10;
                Self::write_digit(f, fraction / divisor)?;
                fraction = fraction % divisor;
            }
        }

        f.write_str(self.notation)?;
        f.write_str(self.symbol)
    }
}

/// Real power with nanowatt precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Watt
{
    value: FixedNano,
}

/// Apparent power with nano-volt-ampere precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VoltAmpere
{
    value: FixedNano,
}

/// A voltage value with nanovolt precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Volt
{
    value: FixedNano,
}

/// An electrical current value with nanoamp precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ampere
{
    value: FixedNano,
}

/// An energy value with nanojoule precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Joule
{
    value: FixedNano,
}

/// Dimensionless ratio of real to apparent power
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PowerFactor
{
    value: FixedNano,
}

macro_rules! impl_unit
{
    { $u:ty, $symbol:literal } => {
        impl $u
        {
            /// The written shorthand symbol
            pub const SYMBOL: &'static str = $symbol;

            /// Displays the unit with a given scalar prefix
            pub fn display<S: Scalar>(&self) -> UnitDisplay
            {
                UnitDisplay {
                    symbol: Self::SYMBOL,
                    notation: S::notation(),
                    magnitude: S::magnitude(),
                    value: self.value,
                }
            }

            /// Displays the unit with no scalar prefix and with its symbol
            pub fn display_base(&self) -> UnitDisplay
            {
                self.display::<Base>()
            }

            /// Constructs a value from an integer count of prefixed units e.g. `Watt::from_count::<Milli>(3200)`
            pub fn from_count<S: Scalar>(num: u64) -> Self
            {
                Self { value: FixedNano::from_count::<S>(num) }
            }

            /// Construct a new value from its whole and fractional parts with reference to a particular
            /// magnitude
            ///
            /// For example, to construct 4.35 with thousandths precision, you would specify `from_parts::<Milli>(4, 350_000)`
            pub fn from_parts<S: Scalar>(whole: u64, fraction: u64) -> Self
            {
                Self { value: FixedNano::from_parts::<S>(whole, fraction) }
            }

            /// Returns the value as a float in base units
            pub fn as_f64_base(&self) -> f64
            {
                self.value.as_f64_base()
            }
        }

        impl fmt::Display for $u
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
            {
                self.display_base().fmt(f)
            }
        }
    }
}

impl_unit!{ Watt, "W" }
impl_unit!{ VoltAmpere, "VA" }
impl_unit!{ Volt, "V" }
impl_unit!{ Ampere, "A" }
impl_unit!{ Joule, "J" }
impl_unit!{ PowerFactor, "" }

impl Joule
{
    /// Nanojoules in one kilowatt-hour
    const NANOS_PER_KWH: f64 = 3.6e15;

    /// Returns the energy in kilowatt-hours
    pub fn kilowatt_hours(&self) -> f64
    {
        self.value.nanos as f64 / Self::NANOS_PER_KWH
    }
}

impl PowerFactor
{
    /// Unity power factor
    pub const UNITY: PowerFactor = PowerFactor { value: FixedNano { nanos: 1_000_000_000 } };
}

#[cfg(test)]
mod tests
{
    use super::{ FixedNano, UnitDisplay, Watt, Volt, Ampere, Joule, PowerFactor };
    use super::scalar::{ Base, Milli, Micro };

    fn bare(magnitude: i32, nanos: u128) -> UnitDisplay
    {
        UnitDisplay {
            symbol: "",
            notation: "",
            magnitude: magnitude,
            value: FixedNano { nanos: nanos },
        }
    }

    #[test]
    fn precision_truncates()
    {
        assert_eq!(&format!("{:.2}", bare(0, 12345 * 1_000_000)), "12.34");
    }

    #[test]
    fn precision_zero_extends()
    {
        assert_eq!(&format!("{:.5}", bare(-3, 12345 * 1_000_000)), "12345.00000");
    }

    #[test]
    fn no_precision_prints_all()
    {
        assert_eq!(&format!("{}", bare(0, 1_234_567_800_000)), "1234.5678");
    }

    #[test]
    fn zero_precision_has_no_point()
    {
        assert_eq!(&format!("{:.0}", bare(0, 7_900_000_000)), "7");
    }

    #[test]
    fn format_unit()
    {
        let power = Watt::from_count::<Milli>(12_345_678);
        assert_eq!(&format!("{}", power.display::<Milli>()), "12345678mW");
        assert_eq!(&format!("{}", power), "12345.678W");
        assert_eq!(&format!("{:.1}", Volt::from_count::<Micro>(246_572_000)), "246.5V");
    }

    #[test]
    fn micro_scaling_is_exact()
    {
        let volts = Volt::from_count::<Micro>(246_572_000);
        assert_eq!(volts, Volt::from_parts::<Base>(246, 572_000_000));
        assert_eq!(volts.as_f64_base(), 246.572);

        let amps = Ampere::from_count::<Micro>(31_400);
        assert_eq!(amps.as_f64_base(), 0.0314);
    }

    #[test]
    fn parts_normalize()
    {
        assert_eq!(Watt::from_parts::<Base>(0, 1_100_000_000), Watt::from_parts::<Base>(1, 100_000_000));
    }

    #[test]
    fn full_counter_range_fits()
    {
        let largest = Joule::from_count::<Milli>(u64::MAX);
        assert!(largest > Joule::from_count::<Base>(u64::MAX / 1000));
        assert_eq!(&format!("{}", largest), "18446744073709551.615J");
        assert!((largest.kilowatt_hours() - 5_124_095_576.030_431).abs() < 1.0);
    }

    #[test]
    fn energy_converts_to_kilowatt_hours()
    {
        let energy = Joule::from_count::<Milli>(3_600_000_000);
        assert_eq!(energy.kilowatt_hours(), 1.0);
    }

    #[test]
    fn ordering_follows_magnitude()
    {
        assert!(PowerFactor::from_count::<Micro>(999_999) < PowerFactor::UNITY);
        assert!(PowerFactor::from_count::<Micro>(1_000_000) == PowerFactor::UNITY);
    }
}
