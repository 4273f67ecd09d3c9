//! Character set conversions.
//!
//! Words hold text in one of two encodings:
//!
//! - Fieldata, six 6-bit characters per word.  Only 64 characters
//!   exist, so lower-case ASCII folds onto upper case and control
//!   characters become spaces.
//! - ASCII, four 9-bit quarter words per word, each holding one
//!   8-bit character.
//!
//! Strings are left-justified and padded with spaces to fill the
//! final word.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use super::word36::Word36;

#[cfg(test)]
mod tests;

pub const FIELDATA_SPACE: u8 = 0o05;
pub const ASCII_SPACE: u8 = b' ';

/// Fieldata code to ASCII character, indexed by the 6-bit code.
pub const ASCII_FROM_FIELDATA: [u8; 64] = *b"@[]#^ ABCDEFGHIJKLMNOPQRSTUVWXYZ)-+<=>&$*(%:?!,\\0123456789';/.\"_";

/// ASCII character to Fieldata code, indexed by the 7-bit character.
#[rustfmt::skip]
pub const FIELDATA_FROM_ASCII: [u8; 128] = [
    0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05,
    0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05, 0o05,
    0o05, 0o55, 0o76, 0o03, 0o47, 0o52, 0o46, 0o72, 0o51, 0o40, 0o50, 0o42, 0o56, 0o41, 0o75, 0o74,
    0o60, 0o61, 0o62, 0o63, 0o64, 0o65, 0o66, 0o67, 0o70, 0o71, 0o53, 0o73, 0o43, 0o44, 0o45, 0o54,
    0o00, 0o06, 0o07, 0o10, 0o11, 0o12, 0o13, 0o14, 0o15, 0o16, 0o17, 0o20, 0o21, 0o22, 0o23, 0o24,
    0o25, 0o26, 0o27, 0o30, 0o31, 0o32, 0o33, 0o34, 0o35, 0o36, 0o37, 0o01, 0o57, 0o02, 0o04, 0o77,
    0o00, 0o06, 0o07, 0o10, 0o11, 0o12, 0o13, 0o14, 0o15, 0o16, 0o17, 0o20, 0o21, 0o22, 0o23, 0o24,
    0o25, 0o26, 0o27, 0o30, 0o31, 0o32, 0o33, 0o34, 0o35, 0o36, 0o37, 0o54, 0o57, 0o55, 0o04, 0o77,
];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TextTooLong {
    pub length: usize,
    pub capacity: usize,
}

impl Display for TextTooLong {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "text of {} characters does not fit in {} characters of storage",
            self.length, self.capacity
        )
    }
}

impl Error for TextTooLong {}

#[must_use]
pub fn fieldata_from_ascii(ch: u8) -> u8 {
    FIELDATA_FROM_ASCII[usize::from(ch & 0o177)]
}

#[must_use]
pub fn ascii_from_fieldata(code: u8) -> u8 {
    ASCII_FROM_FIELDATA[usize::from(code & 0o77)]
}

/// Packs up to six characters into one Fieldata word.
#[must_use]
pub fn fieldata_word(text: &str) -> Word36 {
    let bytes = text.as_bytes();
    let value = (0..6).fold(0_u64, |acc, i| {
        let code = bytes.get(i).map_or(FIELDATA_SPACE, |&ch| fieldata_from_ascii(ch));
        (acc << 6) | u64::from(code)
    });
    Word36::masked(value)
}

/// Packs up to four characters into one ASCII word.
#[must_use]
pub fn ascii_word(text: &str) -> Word36 {
    let bytes = text.as_bytes();
    let value = (0..4).fold(0_u64, |acc, i| {
        let ch = bytes.get(i).copied().unwrap_or(ASCII_SPACE);
        (acc << 9) | u64::from(ch)
    });
    Word36::masked(value)
}

#[must_use]
pub fn fieldata_word_to_string(word: Word36) -> String {
    (0..6)
        .map(|i| {
            let code = (word.bits() >> (30 - 6 * i)) & 0o77;
            char::from(ascii_from_fieldata(code as u8))
        })
        .collect()
}

#[must_use]
pub fn ascii_word_to_string(word: Word36) -> String {
    (0..4)
        .map(|i| {
            let ch = (word.bits() >> (27 - 9 * i)) & 0o377;
            char::from(ch as u8)
        })
        .collect()
}

/// Encodes `text` as Fieldata into exactly `word_count` words.
pub fn fieldata_words(text: &str, word_count: usize) -> Result<Vec<Word36>, TextTooLong> {
    pack_words(text, word_count, 6, fieldata_word)
}

/// Encodes `text` as ASCII into exactly `word_count` words.
pub fn ascii_words(text: &str, word_count: usize) -> Result<Vec<Word36>, TextTooLong> {
    pack_words(text, word_count, 4, ascii_word)
}

fn pack_words(
    text: &str,
    word_count: usize,
    per_word: usize,
    pack: fn(&str) -> Word36,
) -> Result<Vec<Word36>, TextTooLong> {
    let capacity = word_count * per_word;
    if text.len() > capacity || !text.is_ascii() {
        return Err(TextTooLong {
            length: text.len(),
            capacity,
        });
    }
    Ok((0..word_count)
        .map(|wx| {
            let start = (wx * per_word).min(text.len());
            let end = ((wx + 1) * per_word).min(text.len());
            pack(&text[start..end])
        })
        .collect())
}

/// Decodes Fieldata words, dropping trailing spaces.
#[must_use]
pub fn fieldata_string(words: &[Word36]) -> String {
    let s: String = words.iter().copied().map(fieldata_word_to_string).collect();
    s.trim_end_matches(' ').to_string()
}

/// Decodes ASCII words, dropping trailing spaces.
#[must_use]
pub fn ascii_string(words: &[Word36]) -> String {
    let s: String = words.iter().copied().map(ascii_word_to_string).collect();
    s.trim_end_matches(' ').to_string()
}
