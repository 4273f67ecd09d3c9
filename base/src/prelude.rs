//! The prelude exports the types most users of the base crate need.
pub use super::charset::{
    ascii_string, ascii_word, ascii_words, fieldata_string, fieldata_word, fieldata_words,
};
pub use super::codec::{pack, pack_to_vec, unpack, unpack_to_vec, CodecError};
pub use super::error::{ConversionFailed, DivideCheck};
pub use super::onescomplement::{DoubleWord, Sum};
pub use super::w36;
pub use super::word36::{jfield, PartialWord, Word36};
