//! Driver for running one or several [VL6180X ToF distance sensors](https://www.st.com/en/imaging-and-photonics-solutions/vl6180x.html)
//! on the same I²C bus.
//!
//! Every VL6180X powers up listening at the same address,
//! [`PERIPHERAL_ADDR`]. [`MultiSensor`] separates them at startup: it holds
//! all sensors in reset through their XSHUT lines, then enables them one at
//! a time and moves each to its own address before the next one is allowed
//! to listen.
//!
//! ```no_run
//! use rppal::{gpio::Gpio, hal::Delay, i2c::I2c};
//! use vl6180x_multi::{MultiSensor, SensorConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let gpio = Gpio::new()?;
//! let mut delay = Delay::new();
//!
//! let mut sensors = MultiSensor::new(
//!     [
//!         SensorConfig {
//!             i2c: I2c::new()?,
//!             xshut: gpio.get(17)?.into_output_low(),
//!             address: 0x2a,
//!             offset_mm: 0,
//!         },
//!         SensorConfig {
//!             i2c: I2c::new()?,
//!             xshut: gpio.get(27)?.into_output_low(),
//!             address: 0x2b,
//!             offset_mm: 0,
//!         },
//!     ],
//!     &mut delay,
//! )?;
//!
//! loop {
//!     for i in 0..2 {
//!         println!("sensor {i}: {} mm", sensors.sensor_mut(i).range(&mut delay)?);
//!     }
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![no_std]

#[cfg(test)]
extern crate std;

pub use embedded_hal;

mod i2c;
pub mod multi;

pub use multi::{MultiSensor, SensorConfig};

use core::fmt;

use embedded_hal::{delay::DelayNs, i2c::I2c};

#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

/// Register writes issued once per boot, after the model ID check.
const DEFAULT_SETTINGS: &[(u16, u8)] = &[
    // Mandatory private registers (AN4545 section 9), not user-modifiable.
    (0x0207, 0x01),
    (0x0208, 0x01),
    (0x0096, 0x00),
    (0x0097, 0xfd),
    (0x00e3, 0x00),
    (0x00e4, 0x04),
    (0x00e5, 0x02),
    (0x00e6, 0x01),
    (0x00e7, 0x03),
    (0x00f5, 0x02),
    (0x00d9, 0x05),
    (0x00db, 0xce),
    (0x00dc, 0x03),
    (0x00dd, 0xf8),
    (0x009f, 0x00),
    (0x00a3, 0x3c),
    (0x00b7, 0x00),
    (0x00bb, 0x3c),
    (0x00b2, 0x09),
    (0x00ca, 0x09),
    (0x0198, 0x01),
    (0x01b0, 0x17),
    (0x01ad, 0x00),
    (0x00ff, 0x05),
    (0x0100, 0x05),
    (0x0199, 0x05),
    (0x01a6, 0x1b),
    (0x01ac, 0x3e),
    (0x01a7, 0x1f),
    (0x0030, 0x00),
    // Recommended public registers.
    (0x0011, 0x10), // GPIO1 signals "new sample ready"
    (0x010a, 0x30), // averaging sample period (noise vs. execution time)
    (0x003f, 0x46), // light gain in the upper nibble, dark gain untouched
    (0x0031, 0xff), // ranging measurements between auto calibrations
    (0x0041, 0x63), // ALS integration time 100 ms
    (0x002e, 0x01), // single temperature calibration of the ranging sensor
    (0x001b, 0x09), // ranging inter-measurement period 100 ms
    (0x003e, 0x31), // ALS inter-measurement period 500 ms
    (0x0014, 0x24), // interrupt on "new sample ready" for range and ALS
];

#[derive(Debug, Clone, Copy)]
#[allow(non_camel_case_types)]
enum Register {
    IDENTIFICATION_MODEL_ID = 0x0000,
    SYSTEM_INTERRUPT_CONFIG_GPIO = 0x0014,
    SYSTEM_INTERRUPT_CLEAR = 0x0015,
    SYSTEM_FRESH_OUT_OF_RESET = 0x0016,
    SYSRANGE_START = 0x0018,
    SYSRANGE_PART_TO_PART_RANGE_OFFSET = 0x0024,
    SYSALS_START = 0x0038,
    SYSALS_ANALOGUE_GAIN = 0x003f,
    SYSALS_INTEGRATION_PERIOD_HI = 0x0040,
    SYSALS_INTEGRATION_PERIOD_LO = 0x0041,
    RESULT_RANGE_STATUS = 0x004d,
    RESULT_INTERRUPT_STATUS_GPIO = 0x004f,
    RESULT_ALS_VAL = 0x0050,
    RESULT_RANGE_VAL = 0x0062,
    I2C_SLAVE_DEVICE_ADDRESS = 0x0212,
}

impl From<Register> for u16 {
    fn from(reg: Register) -> Self {
        reg as u16
    }
}

/// Power-on I<sup>2</sup>C address shared by every VL6180X.
pub const PERIPHERAL_ADDR: u8 = 0x29;

/// Time a sensor is given to boot after its XSHUT line goes high.
pub const BOOT_SETTLE_MS: u32 = 100;

/// Poll interval while waiting for a sample.
pub const POLL_INTERVAL_MS: u32 = 1;

// Polls before a wait gives up with a timeout error.
const MAX_POLLS: u16 = 1000;

const MODEL_ID: u8 = 0xb4;
const LUX_PER_COUNT: f32 = 0.32;
const ALS_INTEGRATION_MS: u16 = 100;

/// Validity of a range measurement, decoded from the upper nibble of
/// `RESULT__RANGE_STATUS`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum RangeStatus {
    /// Returned distance is valid.
    Valid = 0,
    /// VCSEL continuity test failed.
    VcselContinuityTest = 1,
    /// VCSEL watchdog test failed.
    VcselWatchdogTest = 2,
    /// VCSEL watchdog fired.
    VcselWatchdog = 3,
    /// PLL1 lock lost.
    Pll1Lock = 4,
    /// PLL2 lock lost.
    Pll2Lock = 5,
    /// Early convergence estimate failed.
    EarlyConvergenceEstimate = 6,
    /// No target found within the maximum convergence time.
    MaxConvergence = 7,
    /// Target ignored by the range ignore feature.
    RangeIgnore = 8,
    /// Signal-to-noise ratio too low.
    MaxSignalToNoiseRatio = 11,
    /// Raw ranging algorithm underflow.
    RawRangingUnderflow = 12,
    /// Raw ranging algorithm overflow.
    RawRangingOverflow = 13,
    /// Ranging algorithm underflow.
    RangingUnderflow = 14,
    /// Ranging algorithm overflow.
    RangingOverflow = 15,
    /// Reserved or undocumented status code.
    Other = 255,
}

impl RangeStatus {
    const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Valid,
            1 => Self::VcselContinuityTest,
            2 => Self::VcselWatchdogTest,
            3 => Self::VcselWatchdog,
            4 => Self::Pll1Lock,
            5 => Self::Pll2Lock,
            6 => Self::EarlyConvergenceEstimate,
            7 => Self::MaxConvergence,
            8 => Self::RangeIgnore,
            11 => Self::MaxSignalToNoiseRatio,
            12 => Self::RawRangingUnderflow,
            13 => Self::RawRangingOverflow,
            14 => Self::RangingUnderflow,
            15 => Self::RangingOverflow,
            _ => Self::Other,
        }
    }

    /// Whether the distance reported alongside this status can be trusted.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self == Self::Valid
    }
}

/// Analogue gain for ambient light measurements.
///
/// The variants carry the register encoding; [`Vl6180x::read_lux`] divides
/// by the actual gain from the datasheet (x1 is really 1.01 and so on).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum AlsGain {
    /// 20x gain.
    X20 = 0x00,
    /// 10x gain.
    X10 = 0x01,
    /// 5x gain.
    X5 = 0x02,
    /// 2.5x gain.
    X2_5 = 0x03,
    /// 1.67x gain.
    X1_67 = 0x04,
    /// 1.25x gain.
    X1_25 = 0x05,
    /// 1x gain.
    X1 = 0x06,
    /// 40x gain.
    X40 = 0x07,
}

impl AlsGain {
    const fn bits(self) -> u8 {
        self as u8
    }

    fn factor(self) -> f32 {
        match self {
            Self::X20 => 20.0,
            Self::X10 => 10.32,
            Self::X5 => 5.21,
            Self::X2_5 => 2.6,
            Self::X1_67 => 1.72,
            Self::X1_25 => 1.28,
            Self::X1 => 1.01,
            Self::X40 => 40.0,
        }
    }
}

/// Driver and address-allocation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The underlying I<sup>2</sup>C transaction failed (no acknowledgment,
    /// bus fault).
    Bus(E),
    /// An XSHUT line could not be driven.
    Gpio,
    /// The sensor did not produce a sample within the poll budget.
    Timeout,
    /// The device did not identify as a VL6180X.
    UnknownDevice(u8),
    /// The requested address does not fit in 7 bits.
    InvalidAddress(u8),
    /// The requested address is used by another sensor in the same set, or
    /// is the shared power-on address.
    AddressCollision(u8),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(err) => write!(f, "i2c transaction failed: {err:?}"),
            Self::Gpio => f.write_str("xshut line could not be driven"),
            Self::Timeout => f.write_str("timed out waiting for the sensor"),
            Self::UnknownDevice(id) => write!(f, "unexpected model id {id:#04x}"),
            Self::InvalidAddress(addr) => write!(f, "{addr:#04x} is not a 7-bit i2c address"),
            Self::AddressCollision(addr) => write!(f, "i2c address {addr:#04x} is already taken"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}

/// A single VL6180X ToF range sensor.
pub struct Vl6180x<I2C: I2c> {
    i2c: i2c::Device<I2C>,
}

impl<I2C: I2c> Vl6180x<I2C> {
    /// Construct a sensor listening at [`PERIPHERAL_ADDR`], without sending
    /// any commands. Call [`Self::init`] before measuring.
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, PERIPHERAL_ADDR)
    }

    /// Construct a sensor listening at `address`, without sending any
    /// commands.
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self {
            i2c: i2c::Device { addr: address, i2c },
        }
    }

    /// The address the sensor is currently spoken to at.
    #[inline]
    pub fn address(&self) -> u8 {
        self.i2c.addr
    }

    /// Initialize the sensor: check its identity, load the tuning settings
    /// and clear the fresh-out-of-reset flag.
    ///
    /// [`Error::UnknownDevice`] means whatever acknowledged at this address
    /// did not report the VL6180X model ID, which usually comes down to a
    /// wiring fault or a foreign device.
    #[cfg_attr(feature = "tracing", instrument(err, skip(self)))]
    pub fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        let id = self.read_byte(Register::IDENTIFICATION_MODEL_ID)?;
        if id != MODEL_ID {
            return Err(Error::UnknownDevice(id));
        }

        #[cfg(feature = "tracing")]
        debug!("loading tuning settings");

        for &(index, data) in DEFAULT_SETTINGS {
            self.write_byte(index, data)?;
        }

        self.write_byte(Register::SYSTEM_FRESH_OUT_OF_RESET, 0x00)?;

        Ok(())
    }

    /// Move the sensor to a new I<sup>2</sup>C address.
    ///
    /// Takes effect immediately and lasts until the next reset; this handle
    /// keeps working, subsequent transactions use the new address.
    #[cfg_attr(feature = "tracing", instrument(err, skip(self)))]
    pub fn change_address(&mut self, address: u8) -> Result<(), Error<I2C::Error>> {
        if address > 0x7f {
            return Err(Error::InvalidAddress(address));
        }
        self.write_byte(Register::I2C_SLAVE_DEVICE_ADDRESS, address)?;
        self.i2c.addr = address;
        Ok(())
    }

    /// Set the part-to-part range offset added by the sensor to every
    /// distance it reports (millimeters, two's complement).
    pub fn set_offset(&mut self, offset_mm: i8) -> Result<(), Error<I2C::Error>> {
        self.write_byte(Register::SYSRANGE_PART_TO_PART_RANGE_OFFSET, offset_mm as u8)
    }

    /// Perform a single-shot range measurement and return the distance in
    /// millimeters, polling every [`POLL_INTERVAL_MS`] while the sensor
    /// works.
    ///
    /// Out-of-range targets read as 255 mm; [`Self::range_status`] tells a
    /// genuine 255 from a failed measurement.
    ///
    /// ```no_run
    /// # use rppal::{hal::Delay, i2c::I2c};
    /// # use vl6180x_multi::Vl6180x;
    /// #
    /// # fn main() -> anyhow::Result<()> {
    /// let mut delay = Delay::new();
    /// let mut sensor = Vl6180x::new(I2c::new()?);
    /// sensor.init()?;
    ///
    /// loop {
    ///     println!("{} mm", sensor.range(&mut delay)?);
    /// }
    /// # }
    /// ```
    pub fn range<D: DelayNs>(&mut self, delay: &mut D) -> Result<u8, Error<I2C::Error>> {
        self.wait_device_ready(delay)?;
        self.start_range()?;
        self.wait_range_ready(delay)?;
        let distance = self.read_range()?;
        self.clear_interrupt()?;
        Ok(distance)
    }

    /// Request a single range measurement. The sensor must be ready
    /// (`RESULT__RANGE_STATUS` bit 0); [`Self::range`] handles that.
    #[inline]
    pub fn start_range(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_byte(Register::SYSRANGE_START, 0x01)
    }

    /// Check if a range sample is waiting to be read.
    #[inline]
    pub fn range_ready(&mut self) -> Result<bool, Error<I2C::Error>> {
        Ok(self.read_byte(Register::RESULT_INTERRUPT_STATUS_GPIO)? & 0x04 != 0)
    }

    /// Read the latest range sample (millimeters). Wait for
    /// [`Self::range_ready`] before calling this, and resume with
    /// [`Self::clear_interrupt`] afterwards.
    #[inline]
    pub fn read_range(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.read_byte(Register::RESULT_RANGE_VAL)
    }

    /// Clear the interrupt flags so the sensor can take another sample.
    #[inline]
    pub fn clear_interrupt(&mut self) -> Result<(), Error<I2C::Error>> {
        self.write_byte(Register::SYSTEM_INTERRUPT_CLEAR, 0x07)
    }

    /// Validity of the most recent range measurement.
    #[inline]
    pub fn range_status(&mut self) -> Result<RangeStatus, Error<I2C::Error>> {
        let status = self.read_byte(Register::RESULT_RANGE_STATUS)? >> 4;
        Ok(RangeStatus::from_code(status))
    }

    /// Measure ambient light and convert it to lux.
    ///
    /// The integration period is fixed at 100 ms, so a call blocks for at
    /// least that long.
    pub fn read_lux<D: DelayNs>(
        &mut self,
        gain: AlsGain,
        delay: &mut D,
    ) -> Result<f32, Error<I2C::Error>> {
        // Route the ALS interrupt to "new sample ready".
        let config = self.read_byte(Register::SYSTEM_INTERRUPT_CONFIG_GPIO)?;
        self.write_byte(
            Register::SYSTEM_INTERRUPT_CONFIG_GPIO,
            (config & !0x38) | (0x4 << 3),
        )?;
        self.write_byte(Register::SYSALS_INTEGRATION_PERIOD_HI, 0x00)?;
        self.write_byte(Register::SYSALS_INTEGRATION_PERIOD_LO, ALS_INTEGRATION_MS as u8)?;
        self.write_byte(Register::SYSALS_ANALOGUE_GAIN, 0x40 | gain.bits())?;
        self.write_byte(Register::SYSALS_START, 0x01)?;

        self.wait_als_ready(delay)?;
        let raw = self.read_word(Register::RESULT_ALS_VAL)?;
        self.clear_interrupt()?;

        let lux = f32::from(raw) * LUX_PER_COUNT * (100.0 / f32::from(ALS_INTEGRATION_MS))
            / gain.factor();
        Ok(lux)
    }

    /// Destroy the driver and recover the bus handle.
    pub fn release(self) -> I2C {
        self.i2c.i2c
    }

    fn wait_device_ready<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<I2C::Error>> {
        for _ in 0u16..MAX_POLLS {
            if self.read_byte(Register::RESULT_RANGE_STATUS)? & 0x01 != 0 {
                return Ok(());
            }
            delay.delay_ms(POLL_INTERVAL_MS);
        }
        Err(Error::Timeout)
    }

    fn wait_range_ready<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<I2C::Error>> {
        for _ in 0u16..MAX_POLLS {
            if self.range_ready()? {
                return Ok(());
            }
            delay.delay_ms(POLL_INTERVAL_MS);
        }
        Err(Error::Timeout)
    }

    fn wait_als_ready<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<I2C::Error>> {
        for _ in 0u16..MAX_POLLS {
            if (self.read_byte(Register::RESULT_INTERRUPT_STATUS_GPIO)? >> 3) & 0x07 == 0x04 {
                return Ok(());
            }
            delay.delay_ms(POLL_INTERVAL_MS);
        }
        Err(Error::Timeout)
    }

    fn read_byte(&mut self, index: impl Into<u16>) -> Result<u8, Error<I2C::Error>> {
        self.i2c.read_byte(index).map_err(Error::Bus)
    }

    fn read_word(&mut self, index: impl Into<u16>) -> Result<u16, Error<I2C::Error>> {
        self.i2c.read_word(index).map_err(Error::Bus)
    }

    fn write_byte(&mut self, index: impl Into<u16>, data: u8) -> Result<(), Error<I2C::Error>> {
        self.i2c.write_byte(index, data).map_err(Error::Bus)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::{vec, vec::Vec};

    use embedded_hal_mock::eh1::i2c::Transaction;

    use crate::{DEFAULT_SETTINGS, MODEL_ID};

    pub(crate) fn reg_write(addr: u8, index: u16, data: u8) -> Transaction {
        let index = index.to_be_bytes();
        Transaction::write(addr, vec![index[0], index[1], data])
    }

    pub(crate) fn reg_read(addr: u8, index: u16, data: &[u8]) -> Transaction {
        let index = index.to_be_bytes();
        Transaction::write_read(addr, vec![index[0], index[1]], data.to_vec())
    }

    /// Every transaction `Vl6180x::init` performs on a sensor at `addr`.
    pub(crate) fn init_transactions(addr: u8) -> Vec<Transaction> {
        let mut transactions = vec![reg_read(addr, 0x0000, &[MODEL_ID])];
        transactions.extend(
            DEFAULT_SETTINGS
                .iter()
                .map(|&(index, data)| reg_write(addr, index, data)),
        );
        transactions.push(reg_write(addr, 0x0016, 0x00));
        transactions
    }
}
