use bitfield::Bit;

/// R1 value for a card still in the idle state with no error bits.
pub const R1_IDLE: u8 = 0x01;
/// R1 value for a card out of idle with no error bits.
pub const R1_READY: u8 = 0x00;
/// Idle plus illegal-command: the card wants the legacy CMD1 init path.
pub const R1_ILLEGAL_IDLE: u8 = 0x05;

#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct R1(pub u8);

#[derive(Copy, Clone, Debug)]
#[repr(u8)]
pub enum R1Status {
    InIdleState = 0,
    EraseReset = 1,
    IllegalCommand = 2,
    CommandCRCError = 3,
    EraseSequenceError = 4,
    AddressError = 5,
    ParameterError = 6,
}

impl R1 {
    pub fn valid(self) -> bool {
        !self.0.bit(7)
    }

    pub fn has(self, status: R1Status) -> bool {
        self.0.bit(status as usize)
    }
}

#[derive(Copy, Clone, Default, Debug)]
#[repr(C)]
pub struct R3(pub u32);

impl R3 {
    pub fn card_capacity_status(self) -> bool {
        self.0.bit(30)
    }
}

#[derive(Copy, Clone, Default, Debug)]
pub struct R7(pub u32);

impl R7 {
    pub fn voltage_accepted(self) -> bool {
        self.0.bit(8) // only bit 8 meaningful, for now
    }

    pub fn echo_back_check_pattern(self) -> u8 {
        self.0 as u8
    }
}

mod test {
    #[test]
    fn test_r1_flags() {
        use super::{R1, R1Status};

        let r1 = R1(super::R1_IDLE);
        assert!(r1.valid());
        assert!(r1.has(R1Status::InIdleState));
        assert!(!r1.has(R1Status::IllegalCommand));

        let r1 = R1(super::R1_ILLEGAL_IDLE);
        assert!(r1.has(R1Status::InIdleState));
        assert!(r1.has(R1Status::IllegalCommand));

        assert!(!R1(0xFF).valid());
    }

    #[test]
    fn test_r3_capacity_status() {
        use super::R3;

        assert!(R3(u32::from_be_bytes([0xC0, 0xFF, 0x80, 0x00])).card_capacity_status());
        assert!(!R3(u32::from_be_bytes([0x80, 0xFF, 0x80, 0x00])).card_capacity_status());
    }

    #[test]
    fn test_r7_echo() {
        use super::R7;

        let r7 = R7(0x1AA);
        assert!(r7.voltage_accepted());
        assert_eq!(r7.echo_back_check_pattern(), 0xAA);
    }
}
