pub mod bus;
pub mod read;
pub mod write;

use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::bus::Error;
use crate::sd::command::{AppCommand, Command, SendInterfaceCondition};
use crate::sd::registers::CSD;
use crate::sd::response::{R1, R1Status, R3, R1_IDLE, R1_ILLEGAL_IDLE, R1_READY};
use crate::sd::{Card, Version};
pub use bus::Bus;

use bus::{DRAIN_CYCLES, POWER_UP_CYCLES};

const CMD0_ATTEMPTS: usize = 100;
const ACMD41_ATTEMPTS: usize = 10_000;
const ACMD41_RETRY_DELAY_US: u16 = 1_000;

fn log_r1(r1: R1) {
    if r1.has(R1Status::InIdleState) {
        debug!("response: idle");
    }
    if r1.has(R1Status::EraseReset) {
        debug!("response: erase reset");
    }
    if r1.has(R1Status::IllegalCommand) {
        debug!("response: illegal command");
    }
    if r1.has(R1Status::CommandCRCError) {
        debug!("response: CRC error");
    }
    if r1.has(R1Status::EraseSequenceError) {
        debug!("response: erase sequence error");
    }
    if r1.has(R1Status::AddressError) {
        debug!("response: address error");
    }
    if r1.has(R1Status::ParameterError) {
        debug!("response: parameter error");
    }
}

impl<E, SCK, MOSI, MISO, CS, D> Bus<SCK, MOSI, MISO, CS, D>
where
    SCK: OutputPin<Error = E>,
    MOSI: OutputPin<Error = E>,
    MISO: InputPin<Error = E>,
    CS: OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    /// Resets the card and negotiates protocol version, transfer rate and
    /// capacity. See "Part 1 Physical Layer Specification", figure 7-2.
    ///
    /// The bus is always left released - CS high plus trailing clocks, on
    /// success and failure alike.
    pub fn init(&mut self) -> Result<Card, Error<E>> {
        // Hold MOSI and CS high for more than 74 dummy clocks, then pull
        // CS low to enter SPI mode.
        self.deselect()?;
        self.sck_cycles(POWER_UP_CYCLES)?;
        self.select()?;

        let result = self.negotiate();
        self.deselect()?;
        self.sck_cycles(DRAIN_CYCLES)?;

        match result {
            Ok(_) => debug!("SD: initialization succeeded"),
            Err(_) => warn!("SD: initialization failed"),
        }
        result
    }

    fn negotiate(&mut self) -> Result<Card, Error<E>> {
        // CMD0: software reset, retried until the card reports a clean
        // idle state. An absent card never produces a start bit, so a
        // response timeout here is a retry, not a failure.
        debug!("SD: send CMD0");
        let mut idle = false;
        for _ in 0..CMD0_ATTEMPTS {
            self.send_command(Command::GoIdleState)?;
            match self.get_response::<1>() {
                Ok(r) if r[0] == R1_IDLE => {
                    idle = true;
                    break;
                }
                Ok(r) => log_r1(R1(r[0])),
                Err(Error::Timeout) => (),
                Err(e) => return Err(e),
            }
        }
        if !idle {
            return Err(Error::NoResponse);
        }

        // CMD8: interface condition, 2.7-3.6V with check pattern 0xAA.
        debug!("SD: send CMD8");
        let cond = SendInterfaceCondition::spi();
        self.send_command(Command::SendIfCond(cond))?;
        let r = self.get_response::<5>()?;
        let version = if r[0] == R1_IDLE {
            debug!("CMD8: version 2.0+");
            let echo = u32::from_be_bytes([r[1], r[2], r[3], r[4]]);
            let expected: u32 = cond.into();
            if echo != expected {
                warn!("CMD8: invalid echo");
                return Err(Error::MalformedResponse);
            }
            Version::V2
        } else {
            debug!("CMD8: version 1");
            log_r1(R1(r[0]));
            Version::V1
        };

        // CMD9: read the CSD register for transfer rate and capacity.
        debug!("SD: send CMD9");
        self.send_command(Command::SendCSD(0))?;
        let r = self.get_response::<17>()?;
        if r[0] & 0xFE != 0 {
            warn!("CMD9: unexpected response");
            return Err(Error::UnexpectedResponse(r[0]));
        }
        let mut csd_bytes = [0u8; 16];
        csd_bytes.copy_from_slice(&r[1..]);
        let csd = CSD::try_from(u128::from_be_bytes(csd_bytes)).ok_or(Error::MalformedResponse)?;
        self.rate = csd.transfer_rate();
        let num_blocks = csd.num_blocks();

        // CMD55+ACMD41: poll until the card leaves the idle state. A 0x05
        // response to either command means the card only supports the
        // legacy CMD1 path, which is not implemented.
        let mut ready = false;
        for _ in 0..ACMD41_ATTEMPTS {
            debug!("SD: send CMD55");
            self.send_command(Command::AppCommand(0))?;
            let r = self.get_response::<1>()?;
            match r[0] {
                R1_IDLE => (),
                R1_ILLEGAL_IDLE => {
                    warn!("SD: old SD card - not supported");
                    return Err(Error::LegacyCard);
                }
                other => {
                    warn!("CMD55: unexpected response");
                    return Err(Error::UnexpectedResponse(other));
                }
            }

            debug!("SD: send ACMD41");
            self.send_command(Command::App(AppCommand::SDSendOpCond(true)))?;
            let r = self.get_response::<1>()?;
            match r[0] {
                R1_READY => {
                    ready = true;
                    break;
                }
                R1_IDLE => (),
                R1_ILLEGAL_IDLE => {
                    warn!("SD: old SD card - not supported");
                    return Err(Error::LegacyCard);
                }
                other => {
                    warn!("ACMD41: unexpected response");
                    return Err(Error::UnexpectedResponse(other));
                }
            }
            self.wait_us(ACMD41_RETRY_DELAY_US);
        }
        if !ready {
            return Err(Error::Timeout);
        }

        // CMD58: read the OCR for the capacity addressing mode.
        debug!("SD: send CMD58");
        self.send_command(Command::ReadOCR)?;
        let r = self.get_response::<5>()?;
        if r[0] != R1_READY {
            warn!("CMD58: unexpected response");
            return Err(Error::UnexpectedResponse(r[0]));
        }
        let ocr = R3(u32::from_be_bytes([r[1], r[2], r[3], r[4]]));
        let high_capacity = ocr.card_capacity_status();
        if high_capacity {
            debug!("SD: the card type is SDHC");
        }

        Ok(Card { version, rate: self.rate, num_blocks, high_capacity })
    }
}

impl<E, SCK, MOSI, MISO, CS, D> crate::bus::Bus for Bus<SCK, MOSI, MISO, CS, D>
where
    SCK: OutputPin<Error = E>,
    MOSI: OutputPin<Error = E>,
    MISO: InputPin<Error = E>,
    CS: OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    type Error = E;

    fn before(&mut self) -> Result<(), Error<E>> {
        self.select()
    }

    fn after(&mut self) -> Result<(), Error<E>> {
        self.sck_cycles(DRAIN_CYCLES)?;
        self.deselect()?;
        self.sck_cycles(DRAIN_CYCLES)
    }

    fn reset(&mut self) -> Result<Card, Error<E>> {
        self.init()
    }

    fn set_block_len(&mut self, len: u32) -> Result<(), Error<E>> {
        debug!("SD: send CMD16");
        self.send_command(Command::SetBlockLen(len))?;
        let r = self.get_response::<1>()?;
        if r[0] != R1_READY {
            warn!("CMD16: unexpected response");
            return Err(Error::UnexpectedResponse(r[0]));
        }
        Ok(())
    }
}
