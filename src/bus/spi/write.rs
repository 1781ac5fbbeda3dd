use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::bus::{self, Error};
use crate::sd::BLOCK_SIZE;

use super::bus::Bus;

/// Block writes are not implemented. The stub fails before touching the
/// bus so a rejected write leaves no trace on the wire.
impl<E, SCK, MOSI, MISO, CS, D> bus::Write for Bus<SCK, MOSI, MISO, CS, D>
where
    SCK: OutputPin<Error = E>,
    MOSI: OutputPin<Error = E>,
    MISO: InputPin<Error = E>,
    CS: OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    type Error = E;

    fn write<'a, B>(&mut self, _address: u32, _blocks: B) -> Result<(), Error<E>>
    where
        B: core::iter::ExactSizeIterator<Item = &'a [u8; BLOCK_SIZE]>,
    {
        Err(Error::Unsupported)
    }
}
