use core::convert::TryFrom;

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::bus::{self, Error};
use crate::sd::command::Command;
use crate::sd::data::Token;
use crate::sd::response::R1_READY;
use crate::sd::{TransferRate, BLOCK_SIZE};

use super::bus::Bus;

/// Bounded poll for the data start token of one block.
const TOKEN_POLLS: usize = 1_000;

impl<E, SCK, MOSI, MISO, CS, D> Bus<SCK, MOSI, MISO, CS, D>
where
    SCK: OutputPin<Error = E>,
    MOSI: OutputPin<Error = E>,
    MISO: InputPin<Error = E>,
    CS: OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    fn wait_token(&mut self) -> Result<(), Error<E>> {
        for _ in 0..TOKEN_POLLS {
            let byte = self.receive_byte_slow()?;
            if byte == 0xFF {
                continue;
            }
            return match Token::try_from(byte) {
                Ok(Token::Start) => Ok(()),
                Err(e) => {
                    warn!("SD: read error");
                    Err(Error::Transfer(e))
                }
            };
        }
        warn!("SD: data token timeout");
        Err(Error::Timeout)
    }

    fn read_block(&mut self, block: &mut [u8; BLOCK_SIZE]) -> Result<(), Error<E>> {
        self.wait_token()?;
        if self.rate >= TransferRate::Mbit10 {
            for slot in block.iter_mut() {
                *slot = self.receive_byte_fast()?;
            }
        } else {
            for slot in block.iter_mut() {
                *slot = self.receive_byte_slow()?;
            }
        }
        // Discard the CRC-16 trailer.
        self.receive_byte_slow()?;
        self.receive_byte_slow()?;
        Ok(())
    }
}

impl<E, SCK, MOSI, MISO, CS, D> bus::Read for Bus<SCK, MOSI, MISO, CS, D>
where
    SCK: OutputPin<Error = E>,
    MOSI: OutputPin<Error = E>,
    MISO: InputPin<Error = E>,
    CS: OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    type Error = E;

    fn read<'a, B>(&mut self, address: u32, blocks: B) -> Result<(), Error<E>>
    where
        B: core::iter::ExactSizeIterator<Item = &'a mut [u8; BLOCK_SIZE]>,
    {
        let num_blocks = blocks.len();
        let cmd = match num_blocks {
            1 => Command::ReadSingleBlock(address),
            _ => Command::ReadMultipleBlock(address),
        };
        self.send_command(cmd)?;
        let r = self.get_response::<1>()?;
        if r[0] != R1_READY {
            warn!("CMD17/18: unexpected response");
            return Err(Error::UnexpectedResponse(r[0]));
        }

        for block in blocks {
            self.read_block(block)?;
        }

        if num_blocks > 1 {
            self.send_command(Command::StopTransmission)?;
            let r = self.get_response::<1>()?;
            if r[0] != R1_READY {
                warn!("CMD12: unexpected response");
                return Err(Error::UnexpectedResponse(r[0]));
            }
        }
        Ok(())
    }
}
