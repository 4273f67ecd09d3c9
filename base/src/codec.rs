//! Conversion between words and the byte image used for pack files.
//!
//! Each pair of words occupies nine bytes: the 72 bits of the pair,
//! most significant first.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use super::word36::Word36;

pub const BYTES_PER_WORD_PAIR: usize = 9;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CodecError {
    OddWordCount(usize),
    RaggedByteCount(usize),
    BufferTooSmall { needed: usize, available: usize },
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            CodecError::OddWordCount(n) => {
                write!(f, "source buffer does not contain an even number of words ({n})")
            }
            CodecError::RaggedByteCount(n) => {
                write!(f, "source buffer length {n} is not a multiple of 9 bytes")
            }
            CodecError::BufferTooSmall { needed, available } => write!(
                f,
                "destination buffer has room for {available} units but {needed} are needed"
            ),
        }
    }
}

impl Error for CodecError {}

#[must_use]
pub const fn packed_len(word_count: usize) -> usize {
    word_count / 2 * BYTES_PER_WORD_PAIR
}

/// Packs words into `destination`, which must hold at least
/// `packed_len(source.len())` bytes.
pub fn pack(source: &[Word36], destination: &mut [u8]) -> Result<(), CodecError> {
    if source.len() % 2 != 0 {
        return Err(CodecError::OddWordCount(source.len()));
    }
    let needed = packed_len(source.len());
    if destination.len() < needed {
        return Err(CodecError::BufferTooSmall {
            needed,
            available: destination.len(),
        });
    }
    for (pair, out) in source
        .chunks_exact(2)
        .zip(destination.chunks_exact_mut(BYTES_PER_WORD_PAIR))
    {
        let combined: u128 = (u128::from(pair[0].bits()) << 36) | u128::from(pair[1].bits());
        let bytes = combined.to_be_bytes();
        out.copy_from_slice(&bytes[16 - BYTES_PER_WORD_PAIR..]);
    }
    Ok(())
}

/// Unpacks nine-byte groups into `destination`.
pub fn unpack(source: &[u8], destination: &mut [Word36]) -> Result<(), CodecError> {
    if source.len() % BYTES_PER_WORD_PAIR != 0 {
        return Err(CodecError::RaggedByteCount(source.len()));
    }
    let needed = source.len() / BYTES_PER_WORD_PAIR * 2;
    if destination.len() < needed {
        return Err(CodecError::BufferTooSmall {
            needed,
            available: destination.len(),
        });
    }
    for (group, out) in source
        .chunks_exact(BYTES_PER_WORD_PAIR)
        .zip(destination.chunks_exact_mut(2))
    {
        let combined = group
            .iter()
            .fold(0_u128, |acc, &b| (acc << 8) | u128::from(b));
        out[0] = Word36::masked((combined >> 36) as u64);
        out[1] = Word36::masked(combined as u64);
    }
    Ok(())
}

pub fn pack_to_vec(source: &[Word36]) -> Result<Vec<u8>, CodecError> {
    let mut result = vec![0_u8; packed_len(source.len())];
    pack(source, &mut result)?;
    Ok(result)
}

pub fn unpack_to_vec(source: &[u8]) -> Result<Vec<Word36>, CodecError> {
    let mut result = vec![Word36::ZERO; source.len() / BYTES_PER_WORD_PAIR * 2];
    unpack(source, &mut result)?;
    Ok(result)
}
