//! Bring up several VL6180X sensors sharing one I²C bus.
//!
//! Every VL6180X boots at [`PERIPHERAL_ADDR`], so sensors on the same bus
//! cannot be told apart until they have been separated. [`MultiSensor::new`]
//! holds all of them in reset through their XSHUT lines, wakes them one at
//! a time and moves each to its own address before the next one is allowed
//! to listen.

use embedded_hal::{delay::DelayNs, digital::OutputPin, i2c::I2c};

#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

use crate::{Error, Vl6180x, BOOT_SETTLE_MS, PERIPHERAL_ADDR};

/// Everything needed to bring one sensor online.
pub struct SensorConfig<I2C, P> {
    /// This sensor's connection to the shared bus.
    pub i2c: I2C,
    /// Output driving the sensor's XSHUT (chip enable) line.
    pub xshut: P,
    /// 7-bit address the sensor is moved to. Must differ from
    /// [`PERIPHERAL_ADDR`] and from every other sensor's target.
    pub address: u8,
    /// Part-to-part range offset (millimeters) applied after bring-up.
    pub offset_mm: i8,
}

/// A set of VL6180X sensors on one bus, each at its own address.
pub struct MultiSensor<I2C: I2c, P, const N: usize> {
    sensors: [(Vl6180x<I2C>, P); N],
}

impl<I2C, P, const N: usize> MultiSensor<I2C, P, N>
where
    I2C: I2c,
    P: OutputPin,
{
    /// Bring every configured sensor online, in the order given.
    ///
    /// Target addresses are validated before any pin or bus traffic; a bad
    /// set fails with [`Error::InvalidAddress`] or
    /// [`Error::AddressCollision`] without touching the hardware. All XSHUT
    /// lines are then driven low, and each sensor in turn is enabled, given
    /// [`BOOT_SETTLE_MS`] to boot, moved to its target address, initialized
    /// ([`Vl6180x::init`]) and handed its range offset.
    ///
    /// The first failure aborts the whole bring-up and the partially-raised
    /// pins are dropped with the configs. HAL pin types commonly release
    /// the line on drop, which puts those sensors back into reset, so a
    /// failed call does not leave a half-configured set powered.
    #[cfg_attr(feature = "tracing", instrument(err, skip_all, fields(sensors = N)))]
    pub fn new<D: DelayNs>(
        configs: [SensorConfig<I2C, P>; N],
        delay: &mut D,
    ) -> Result<Self, Error<I2C::Error>> {
        for (i, config) in configs.iter().enumerate() {
            let address = config.address;
            if address > 0x7f {
                return Err(Error::InvalidAddress(address));
            }
            if address == PERIPHERAL_ADDR || configs[..i].iter().any(|c| c.address == address) {
                return Err(Error::AddressCollision(address));
            }
        }

        let mut staged = configs.map(|c| (Vl6180x::new(c.i2c), c.xshut, c.address, c.offset_mm));

        // Hold every sensor in reset so that below, exactly one listens at
        // the shared power-on address at any time.
        for (_, xshut, _, _) in &mut staged {
            xshut.set_low().map_err(|_| Error::Gpio)?;
        }

        for (sensor, xshut, address, offset_mm) in &mut staged {
            xshut.set_high().map_err(|_| Error::Gpio)?;
            delay.delay_ms(BOOT_SETTLE_MS);

            sensor.change_address(*address)?;
            sensor.init()?;
            sensor.set_offset(*offset_mm)?;

            #[cfg(feature = "tracing")]
            debug!("sensor ready at {:#04x}", address);
        }

        Ok(Self {
            sensors: staged.map(|(sensor, xshut, _, _)| (sensor, xshut)),
        })
    }

    /// Number of sensors in the set.
    pub const fn len(&self) -> usize {
        N
    }

    /// Whether the set holds no sensors.
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// The sensor at `index`, counting in the order the configs were given.
    ///
    /// # Panics
    ///
    /// Panics if `index >= N`. [`Self::get_mut`] is the checked variant.
    pub fn sensor_mut(&mut self, index: usize) -> &mut Vl6180x<I2C> {
        &mut self.sensors[index].0
    }

    /// The sensor at `index`, or `None` if `index >= N`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Vl6180x<I2C>> {
        self.sensors.get_mut(index).map(|(sensor, _)| sensor)
    }

    /// All sensors, in the order the configs were given.
    pub fn sensors_mut(&mut self) -> impl Iterator<Item = &mut Vl6180x<I2C>> {
        self.sensors.iter_mut().map(|(sensor, _)| sensor)
    }

    /// Dissolve the set into the sensors and their XSHUT pins.
    ///
    /// The pins are still high; dropping one puts that sensor back into
    /// reset on HALs that release pins on drop.
    pub fn release(self) -> [(Vl6180x<I2C>, P); N] {
        self.sensors
    }
}
