//! LZXD block types and the block header shared by all three.

use std::convert::TryFrom;

use super::DecodeFailed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Verbatim,
    AlignedOffset,
    Uncompressed,
}

impl TryFrom<u8> for BlockType {
    type Error = DecodeFailed;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(BlockType::Verbatim),
            2 => Ok(BlockType::AlignedOffset),
            3 => Ok(BlockType::Uncompressed),
            other => Err(DecodeFailed::BadBlockType(other)),
        }
    }
}
