//! # sdmmc
//!
//! > A bit-banged SPI-mode SD/SDHC driver for bare-metal hosts with no OS,
//! > no DMA and no hardware SPI peripheral
//!
//! Every clock edge is driven through an injected [`embedded_hal`] pin
//! capability, so the protocol stack is host-testable against a simulated
//! wire.
//!
//! ## Using this crate
//!
//! Assuming you have GPIO pins implementing `OutputPin`/`InputPin` and a
//! calibrated `DelayUs` for your platform:
//!
//! ```rust,ignore
//! let bus = sdmmc::bus::spi::Bus::new(sck, mosi, miso, cs, delay);
//! let mut sd = SD::init(bus)?;
//! let blocks: u64 = sd.num_blocks().into();
//! debug!("Card: {:?}, {} blocks", sd.card(), blocks);
//!
//! let mut buffer = [[0u8; 512]; 1];
//! sd.read(0, buffer.iter_mut())?;
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
extern crate log;

pub mod bus;
mod sd;

use bus::Error;
pub use sd::data::Error as TokenError;
pub use sd::registers::NumBlocks;
pub use sd::{Card, TransferRate, Version, BLOCK_SIZE};

pub struct SD<BUS> {
    bus: BUS,
    card: Card,
}

type LBA = u32;

impl<E, BUS> SD<BUS>
where
    BUS: bus::Read<Error = E> + bus::Write<Error = E> + bus::Bus<Error = E>,
{
    /// Resets the card and negotiates protocol version, capacity and
    /// transfer rate. The returned session owns the bus.
    pub fn init(mut bus: BUS) -> Result<Self, Error<E>> {
        let card = bus.reset()?;
        Ok(Self { bus, card })
    }

    pub fn card(&self) -> Card {
        self.card
    }

    pub fn num_blocks(&self) -> NumBlocks {
        self.card.num_blocks
    }

    /// Reads consecutive 512 byte blocks starting at `address` (a block
    /// index, regardless of the card's addressing mode).
    pub fn read<'a, B>(&mut self, address: LBA, blocks: B) -> Result<(), Error<E>>
    where
        B: core::iter::ExactSizeIterator<Item = &'a mut [u8; BLOCK_SIZE]>,
    {
        if blocks.len() == 0 {
            return Ok(());
        }
        self.bus.before()?;
        let result = self.read_blocks(address, blocks);
        self.bus.after().and(result)
    }

    fn read_blocks<'a, B>(&mut self, address: LBA, blocks: B) -> Result<(), Error<E>>
    where
        B: core::iter::ExactSizeIterator<Item = &'a mut [u8; BLOCK_SIZE]>,
    {
        if self.bus.set_block_len(BLOCK_SIZE as u32).is_err() {
            warn!("SD: set block length failed, resetting card");
            self.bus.after()?;
            self.card = self.bus.reset()?;
            self.bus.before()?;
            self.bus.set_block_len(BLOCK_SIZE as u32)?;
        }
        let address = if self.card.high_capacity { address } else { address * BLOCK_SIZE as u32 };
        self.bus.read(address, blocks)
    }

    /// Block writes are not supported yet; always fails with
    /// [`Error::Unsupported`] and performs no bus activity.
    pub fn write<'a, B>(&mut self, address: LBA, blocks: B) -> Result<(), Error<E>>
    where
        B: core::iter::ExactSizeIterator<Item = &'a [u8; BLOCK_SIZE]>,
    {
        self.bus.write(address, blocks)
    }
}
