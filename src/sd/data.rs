use core::convert::TryFrom;

/// Card-reported data error token, with sub-reason flags.
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Error {
    NotToken,
    Generic,
    CC,
    CardECC,
    OutOfRange,
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Token {
    Start = 0xFE,
}

impl TryFrom<u8> for Token {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Token, Error> {
        match (byte, byte ^ (byte & byte.wrapping_sub(1))) {
            (0xFE, _) => Ok(Token::Start),
            (_, 0x8) => Err(Error::OutOfRange),
            (_, 0x4) => Err(Error::CardECC),
            (_, 0x2) => Err(Error::CC),
            (_, 0x1) => Err(Error::Generic),
            (_, _) => Err(Error::NotToken),
        }
    }
}

mod test {
    #[test]
    fn test_token_parse() {
        use core::convert::TryFrom;

        use super::{Error, Token};

        assert_eq!(Token::try_from(0xFE), Ok(Token::Start));
        assert_eq!(Token::try_from(0x01), Err(Error::Generic));
        assert_eq!(Token::try_from(0x02), Err(Error::CC));
        assert_eq!(Token::try_from(0x04), Err(Error::CardECC));
        assert_eq!(Token::try_from(0x08), Err(Error::OutOfRange));
        // Lowest flag wins when several are set.
        assert_eq!(Token::try_from(0x06), Err(Error::CC));
        assert_eq!(Token::try_from(0x00), Err(Error::NotToken));
    }
}
