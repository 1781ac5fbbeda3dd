pub mod command;
pub mod data;
pub mod registers;
pub mod response;

use registers::NumBlocks;

pub const BLOCK_SIZE: usize = 512;

/// SD physical layer protocol version, negotiated by CMD8.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
}

/// Maximum transfer rate class, from the CSD TRAN_SPEED field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransferRate {
    Kbit100,
    Mbit1,
    Mbit10,
    Mbit100,
}

impl TransferRate {
    pub fn kbit(self) -> u32 {
        match self {
            Self::Kbit100 => 100,
            Self::Mbit1 => 1_000,
            Self::Mbit10 => 10_000,
            Self::Mbit100 => 100_000,
        }
    }
}

/// Card session state, populated wholesale by every successful reset.
///
/// Single card, single outstanding operation: access from multiple
/// logical threads of control requires external serialization.
#[derive(Copy, Clone, Debug)]
pub struct Card {
    pub version: Version,
    pub rate: TransferRate,
    pub num_blocks: NumBlocks,
    /// Block (not byte) addressing, from OCR bit 30.
    pub high_capacity: bool,
}
