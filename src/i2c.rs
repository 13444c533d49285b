//! [I²C](https://en.wikipedia.org/wiki/I%C2%B2C) abstractions.
//!
//! The VL6180X uses a 16-bit register index, sent big-endian before the
//! data byte(s).

use embedded_hal::i2c::I2c;

#[cfg(feature = "tracing")]
use tracing::trace;

pub struct Device<M: I2c> {
    pub addr: u8,
    pub i2c: M,
}

impl<M: I2c> Device<M> {
    pub fn read_bytes(&mut self, index: u16, dest: &mut [u8]) -> Result<(), M::Error> {
        #[cfg(feature = "tracing")]
        trace!("read {:#06x} ({} bytes)", index, dest.len());
        self.i2c.write_read(self.addr, &index.to_be_bytes(), dest)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), M::Error> {
        self.i2c.write(self.addr, data)
    }
}

macro_rules! read_impl {
    ($name:ident, $out:ty) => {
        impl<M: I2c> Device<M> {
            /// Read a
            #[doc = concat!("[`", stringify!($out), "`]")]
            /// starting at some register index.
            pub fn $name(&mut self, index: impl Into<u16>) -> Result<$out, M::Error> {
                let mut buf = [0; core::mem::size_of::<$out>()];
                self.read_bytes(index.into(), &mut buf)?;
                Ok(<$out>::from_be_bytes(buf))
            }
        }
    };
}

read_impl!(read_byte, u8);
read_impl!(read_word, u16);

impl<M: I2c> Device<M> {
    /// Write a [`u8`] into some register index.
    pub fn write_byte(&mut self, index: impl Into<u16>, data: u8) -> Result<(), M::Error> {
        let mut msg = [0; 3]; // 2 bytes for register selection, 1 for data
        msg[..2].copy_from_slice(&index.into().to_be_bytes());
        msg[2] = data;
        #[cfg(feature = "tracing")]
        trace!("write {:02x?}", msg);
        self.write(&msg)
    }
}
