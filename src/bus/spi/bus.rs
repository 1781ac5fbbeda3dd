use embedded_hal::blocking::delay::DelayUs;
use embedded_hal::digital::v2::{InputPin, OutputPin};

use crate::bus::Error;
use crate::sd::command::Command;
use crate::sd::TransferRate;

/// Dummy clocks issued with CS high to put the card in SPI mode. The
/// electrical spec requires at least 74.
pub(crate) const POWER_UP_CYCLES: usize = 100;
/// Trailing clocks letting the card stop driving MISO.
pub(crate) const DRAIN_CYCLES: usize = 8;
/// Bounded poll waiting for MISO high before a command frame.
const READY_POLLS: usize = 10_000;
const READY_POLL_DELAY_US: u16 = 100;
/// Clock cycles spent searching for a response start bit.
const RESPONSE_SEARCH_CYCLES: usize = 20;
/// Half clock period for the timing-safe bit paths, roughly 400kHz.
const HALF_PERIOD_US: u16 = 1;
const SELECT_SETTLE_US: u16 = 10;

/// A bit-banged SPI-mode SD bus. SCK, MOSI and CS are driven as plain
/// GPIO outputs; MISO is sampled around the rising clock edge. All
/// timeouts are bounded-iteration polls paced by the injected delay,
/// not wall-clock deadlines.
pub struct Bus<SCK, MOSI, MISO, CS, D> {
    sck: SCK,
    mosi: MOSI,
    miso: MISO,
    cs: CS,
    delay: D,
    pub(crate) rate: TransferRate,
}

impl<E, SCK, MOSI, MISO, CS, D> Bus<SCK, MOSI, MISO, CS, D>
where
    SCK: OutputPin<Error = E>,
    MOSI: OutputPin<Error = E>,
    MISO: InputPin<Error = E>,
    CS: OutputPin<Error = E>,
    D: DelayUs<u16>,
{
    pub fn new(sck: SCK, mosi: MOSI, miso: MISO, cs: CS, delay: D) -> Self {
        Self { sck, mosi, miso, cs, delay, rate: TransferRate::Kbit100 }
    }

    pub fn free(self) -> (SCK, MOSI, MISO, CS, D) {
        (self.sck, self.mosi, self.miso, self.cs, self.delay)
    }

    pub(crate) fn select(&mut self) -> Result<(), Error<E>> {
        self.cs.set_low().map_err(Error::Pin)?;
        self.delay.delay_us(SELECT_SETTLE_US);
        Ok(())
    }

    pub(crate) fn deselect(&mut self) -> Result<(), Error<E>> {
        self.cs.set_high().map_err(Error::Pin)
    }

    pub(crate) fn wait_us(&mut self, us: u16) {
        self.delay.delay_us(us);
    }

    fn sck_fall(&mut self) -> Result<(), Error<E>> {
        self.delay.delay_us(HALF_PERIOD_US);
        self.sck.set_low().map_err(Error::Pin)
    }

    fn sck_rise(&mut self) -> Result<(), Error<E>> {
        self.delay.delay_us(HALF_PERIOD_US);
        self.sck.set_high().map_err(Error::Pin)
    }

    fn set_mosi(&mut self, level: bool) -> Result<(), Error<E>> {
        match level {
            false => self.mosi.set_low(),
            true => self.mosi.set_high(),
        }
        .map_err(Error::Pin)
    }

    fn miso(&mut self) -> Result<bool, Error<E>> {
        self.miso.is_high().map_err(Error::Pin)
    }

    /// Sends one byte MSB first. MOSI changes while SCK is low and is
    /// latched by the card on the rising edge.
    pub(crate) fn send_byte(&mut self, byte: u8) -> Result<(), Error<E>> {
        for shift in (0..8).rev() {
            self.sck_fall()?;
            self.set_mosi(byte >> shift & 1 == 1)?;
            self.sck_rise()?;
        }
        Ok(())
    }

    pub(crate) fn receive_byte_slow(&mut self) -> Result<u8, Error<E>> {
        let mut byte = 0;
        for _ in 0..8 {
            self.sck_fall()?;
            byte = byte << 1 | self.miso()? as u8;
            self.sck_rise()?;
        }
        Ok(byte)
    }

    /// Same sampling as [`Self::receive_byte_slow`] minus the pacing
    /// delays. Only used once the card has reported a transfer rate of
    /// 10 Mbit/s or more; produces bit-identical results on a correctly
    /// wired bus.
    pub(crate) fn receive_byte_fast(&mut self) -> Result<u8, Error<E>> {
        let mut byte = 0;
        for _ in 0..8 {
            self.sck.set_low().map_err(Error::Pin)?;
            byte = byte << 1 | self.miso()? as u8;
            self.sck.set_high().map_err(Error::Pin)?;
        }
        Ok(byte)
    }

    /// Issues bare clock pulses with MOSI held high.
    pub(crate) fn sck_cycles(&mut self, cycles: usize) -> Result<(), Error<E>> {
        self.set_mosi(true)?;
        for _ in 0..cycles {
            self.sck_fall()?;
            self.sck_rise()?;
        }
        Ok(())
    }

    /// Waits for the card to release MISO, then transmits the 6-byte
    /// command frame. Transmission itself cannot fail beyond pin errors.
    pub(crate) fn send_command(&mut self, cmd: Command) -> Result<(), Error<E>> {
        let frame: [u8; 6] = cmd.into();

        let mut ready = false;
        for _ in 0..READY_POLLS {
            if self.miso()? {
                ready = true;
                break;
            }
            self.delay.delay_us(READY_POLL_DELAY_US);
        }
        if !ready {
            warn!("send_command: card busy timeout");
            return Err(Error::Timeout);
        }

        for &byte in frame.iter() {
            self.send_byte(byte)?;
        }
        Ok(())
    }

    /// Searches for the response start bit (the first 0 observed after a
    /// 1) within a bounded number of clock cycles, then reads a LEN byte
    /// response followed by drain clocks to terminate the card's drive.
    pub(crate) fn get_response<const LEN: usize>(&mut self) -> Result<[u8; LEN], Error<E>> {
        self.set_mosi(true)?;

        let mut seen_high = false;
        let mut found = false;
        for _ in 0..RESPONSE_SEARCH_CYCLES {
            let bit = self.miso()?;
            if !seen_high && bit {
                seen_high = true;
            } else if seen_high && !bit {
                found = true;
                break;
            }
            self.sck_cycles(1)?;
        }
        if !found {
            warn!("get_response: start bit timeout");
            return Err(Error::Timeout);
        }

        let mut response = [0u8; LEN];
        // The start bit is bit 7 of the first byte and was already seen.
        let mut value = 0u8;
        for i in 1..8 {
            self.sck_cycles(1)?;
            value |= (self.miso()? as u8) << (7 - i);
        }
        response[0] = value;

        for slot in response[1..].iter_mut() {
            *slot = self.receive_byte_slow()?;
        }

        self.sck_cycles(DRAIN_CYCLES)?;
        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::rc::Rc;

    use embedded_hal::blocking::delay::DelayUs;
    use embedded_hal::digital::v2::{InputPin, OutputPin};

    use super::Bus;
    use crate::bus::Error;

    /// Simulated signal lines: MISO shifts out of `input` on each falling
    /// clock edge, MOSI is latched into `output` on each rising edge.
    struct Line {
        sck: bool,
        mosi: bool,
        level: bool,
        input: VecDeque<bool>,
        output: Vec<bool>,
        cycles: usize,
    }

    impl Default for Line {
        fn default() -> Self {
            // An undriven SPI bus idles high.
            Self {
                sck: true,
                mosi: true,
                level: true,
                input: VecDeque::new(),
                output: Vec::new(),
                cycles: 0,
            }
        }
    }

    impl Line {
        fn load(&mut self, bytes: &[u8]) {
            for &byte in bytes {
                for shift in (0..8).rev() {
                    self.input.push_back(byte >> shift & 1 == 1);
                }
            }
        }

        fn clock(&mut self, level: bool) {
            if level == self.sck {
                return;
            }
            self.sck = level;
            if level {
                self.output.push(self.mosi);
                self.cycles += 1;
            } else {
                self.level = self.input.pop_front().unwrap_or(true);
            }
        }
    }

    #[derive(Clone)]
    struct Sck(Rc<RefCell<Line>>);
    #[derive(Clone)]
    struct Mosi(Rc<RefCell<Line>>);
    #[derive(Clone)]
    struct Miso(Rc<RefCell<Line>>);
    #[derive(Clone)]
    struct Cs;
    struct NoDelay;

    impl OutputPin for Sck {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(self.0.borrow_mut().clock(false))
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(self.0.borrow_mut().clock(true))
        }
    }

    impl OutputPin for Mosi {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(self.0.borrow_mut().mosi = false)
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(self.0.borrow_mut().mosi = true)
        }
    }

    impl InputPin for Miso {
        type Error = Infallible;

        fn is_high(&self) -> Result<bool, Infallible> {
            Ok(self.0.borrow().level)
        }

        fn is_low(&self) -> Result<bool, Infallible> {
            Ok(!self.0.borrow().level)
        }
    }

    impl OutputPin for Cs {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    impl DelayUs<u16> for NoDelay {
        fn delay_us(&mut self, _us: u16) {}
    }

    fn bus() -> (Rc<RefCell<Line>>, Bus<Sck, Mosi, Miso, Cs, NoDelay>) {
        let line = Rc::new(RefCell::new(Line::default()));
        let bus =
            Bus::new(Sck(line.clone()), Mosi(line.clone()), Miso(line.clone()), Cs, NoDelay);
        (line, bus)
    }

    fn bits(byte: u8) -> Vec<bool> {
        (0..8).rev().map(|shift| byte >> shift & 1 == 1).collect()
    }

    #[test]
    fn test_send_byte_msb_first() {
        let (line, mut bus) = bus();
        bus.send_byte(0xA5).unwrap();
        assert_eq!(line.borrow().output, bits(0xA5));
    }

    #[test]
    fn test_receive_fast_matches_slow() {
        let (line, mut bus) = bus();
        line.borrow_mut().load(&[0x3C, 0x3C, 0x81, 0x81]);
        assert_eq!(bus.receive_byte_slow().unwrap(), 0x3C);
        assert_eq!(bus.receive_byte_fast().unwrap(), 0x3C);
        let slow = bus.receive_byte_slow().unwrap();
        let fast = bus.receive_byte_fast().unwrap();
        assert_eq!(slow, fast);
    }

    #[test]
    fn test_sck_cycles_holds_mosi_high() {
        let (line, mut bus) = bus();
        bus.sck_cycles(10).unwrap();
        assert_eq!(line.borrow().cycles, 10);
        assert_eq!(line.borrow().output, vec![true; 10]);
    }

    #[test]
    fn test_get_response_start_bit_timeout() {
        let (_line, mut bus) = bus();
        // Idle-high line: no 1-to-0 transition ever appears.
        match bus.get_response::<1>() {
            Err(Error::Timeout) => (),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_get_response_skips_leading_idle_bytes() {
        let (line, mut bus) = bus();
        line.borrow_mut().load(&[0xFF, 0x05]);
        let response = bus.get_response::<1>().unwrap();
        assert_eq!(response, [0x05]);
    }

    #[test]
    fn test_get_response_multi_byte() {
        let (line, mut bus) = bus();
        line.borrow_mut().load(&[0xFF, 0x01, 0x00, 0x00, 0x01, 0xAA]);
        let response = bus.get_response::<5>().unwrap();
        assert_eq!(response, [0x01, 0x00, 0x00, 0x01, 0xAA]);
    }
}
