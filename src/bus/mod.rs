use crate::sd::data;
use crate::sd::{Card, BLOCK_SIZE};

#[derive(Debug)]
pub enum Error<PIN> {
    Pin(PIN),               // Pin capability error
    NoResponse,             // Probably no card
    Timeout,                // Bounded poll exhausted
    UnexpectedResponse(u8), // Response code outside the expected set
    MalformedResponse,      // Structurally invalid response payload
    Transfer(data::Error),  // Card-reported read fault
    LegacyCard,             // Card requires the unimplemented CMD1 init path
    Unsupported,            // Operation not implemented
}

pub trait Bus {
    type Error;
    /// Selects the card, leaving CS low.
    fn before(&mut self) -> Result<(), Error<Self::Error>>;
    /// Issues termination clocks and releases CS.
    fn after(&mut self) -> Result<(), Error<Self::Error>>;
    /// Full card reset and capability negotiation.
    fn reset(&mut self) -> Result<Card, Error<Self::Error>>;
    /// CMD16, expects the card to accept the block length.
    fn set_block_len(&mut self, len: u32) -> Result<(), Error<Self::Error>>;
}

pub trait Read {
    type Error;
    fn read<'a, B>(&mut self, address: u32, blocks: B) -> Result<(), Error<Self::Error>>
    where
        B: core::iter::ExactSizeIterator<Item = &'a mut [u8; BLOCK_SIZE]>;
}

pub trait Write {
    type Error;
    fn write<'a, B>(&mut self, address: u32, blocks: B) -> Result<(), Error<Self::Error>>
    where
        B: core::iter::ExactSizeIterator<Item = &'a [u8; BLOCK_SIZE]>;
}

pub mod spi;
