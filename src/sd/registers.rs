use bitfield::bitfield;

use super::TransferRate;

bitfield! {
    #[derive(Copy, Clone)]
    pub struct CSDv1(u128);
    pub version, _: 127, 126;
    pub tran_speed, _: 103, 96;
    pub device_size, _: 73, 62;
    pub device_size_multiplier, _: 49, 47;
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NumBlocks {
    device_size: u32,
    multiplier: u16,
}

impl NumBlocks {
    pub fn device_size(&self) -> u32 {
        self.device_size
    }

    pub fn multiplier(&self) -> u16 {
        self.multiplier
    }
}

impl Into<u64> for NumBlocks {
    fn into(self) -> u64 {
        self.device_size as u64 * self.multiplier as u64
    }
}

impl CSDv1 {
    pub fn num_blocks(&self) -> NumBlocks {
        let multiplier = 1 << (self.device_size_multiplier() + 3);
        NumBlocks { device_size: self.device_size() as u32 + 1, multiplier }
    }
}

bitfield! {
    #[derive(Copy, Clone)]
    pub struct CSDv2(u128);
    pub tran_speed, _: 103, 96;
    pub device_size, _: 69, 48;
}

impl CSDv2 {
    pub fn num_blocks(&self) -> NumBlocks {
        NumBlocks { device_size: self.device_size() as u32 + 1, multiplier: 1024 }
    }
}

#[derive(Copy, Clone)]
pub enum CSD {
    V1(CSDv1),
    V2(CSDv2),
}

impl CSD {
    pub fn try_from(value: u128) -> Option<CSD> {
        let csd = match CSDv1(value).version() {
            0 => Self::V1(CSDv1(value)),
            1 => Self::V2(CSDv2(value)),
            _ => return None,
        };
        Some(csd)
    }

    pub fn num_blocks(&self) -> NumBlocks {
        match self {
            Self::V1(csd) => csd.num_blocks(),
            Self::V2(csd) => csd.num_blocks(),
        }
    }

    /// Decodes the TRAN_SPEED unit field. Unknown codes are optimistically
    /// assumed to be the fastest class.
    pub fn transfer_rate(&self) -> TransferRate {
        let code = match self {
            Self::V1(csd) => csd.tran_speed(),
            Self::V2(csd) => csd.tran_speed(),
        } as u8;
        match code & 0b111 {
            0 => TransferRate::Kbit100,
            1 => TransferRate::Mbit1,
            2 => TransferRate::Mbit10,
            _ => TransferRate::Mbit100,
        }
    }
}

mod test {
    #[test]
    fn test_csd_v1_num_blocks() {
        use super::CSD;

        fn v1(c_size: u128, mult: u128) -> u128 {
            c_size << 62 | mult << 47
        }

        let csd = CSD::try_from(v1(0, 0)).unwrap();
        let blocks: u64 = csd.num_blocks().into();
        assert_eq!(blocks, 8);

        let csd = CSD::try_from(v1(4095, 7)).unwrap();
        let blocks: u64 = csd.num_blocks().into();
        assert_eq!(blocks, 4096 << 10);

        let csd = CSD::try_from(v1(0x40, 2)).unwrap();
        let blocks: u64 = csd.num_blocks().into();
        assert_eq!(blocks, 65 << 5);
    }

    #[test]
    fn test_csd_v2_num_blocks() {
        use super::CSD;

        // 16GB-class card: (C_SIZE + 1) * 1024 blocks of 512 bytes.
        let csd = CSD::try_from(1u128 << 126 | 0x747F << 48).unwrap();
        let blocks: u64 = csd.num_blocks().into();
        assert_eq!(blocks, 0x7480 * 1024);
    }

    #[test]
    fn test_csd_version_reserved() {
        use super::CSD;

        assert!(CSD::try_from(2u128 << 126).is_none());
        assert!(CSD::try_from(3u128 << 126).is_none());
    }

    #[test]
    fn test_transfer_rate_table() {
        use super::CSD;
        use crate::sd::TransferRate;

        fn rate(tran_speed: u128) -> TransferRate {
            CSD::try_from(tran_speed << 96).unwrap().transfer_rate()
        }

        assert_eq!(rate(0x00), TransferRate::Kbit100);
        assert_eq!(rate(0x01), TransferRate::Mbit1);
        assert_eq!(rate(0x32), TransferRate::Mbit10);
        assert_eq!(rate(0x5A), TransferRate::Mbit10);
        assert_eq!(rate(0x0B), TransferRate::Mbit100);
        // Reserved unit codes fall back to the fastest class.
        assert_eq!(rate(0x07), TransferRate::Mbit100);
    }
}
