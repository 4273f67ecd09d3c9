//! Basic error reporting.

use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};

/// Represents a failure to convert a native value into one of the
/// word types defined in the base crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionFailed {
    TooLarge,
    TooSmall,
}

impl Error for ConversionFailed {}

impl Display for ConversionFailed {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConversionFailed::TooLarge => f.write_str("value is too large"),
            ConversionFailed::TooSmall => f.write_str("value is too small"),
        }
    }
}

/// A division could not produce a representable result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DivideCheck {
    DivideByZero,
    QuotientOverflow,
}

impl Error for DivideCheck {}

impl Display for DivideCheck {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            DivideCheck::DivideByZero => f.write_str("division by zero"),
            DivideCheck::QuotientOverflow => f.write_str("quotient does not fit in one word"),
        }
    }
}
