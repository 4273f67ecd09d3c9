//! The `base` crate defines the word-level things which are useful
//! to both the instruction processor and the mass storage subsystem:
//! 36-bit words, ones-complement arithmetic, character sets and the
//! byte codec used for pack images.

pub mod charset;
pub mod codec;
pub mod error;
pub mod onescomplement;
pub mod prelude;
pub mod word36;

/// Builds a [`word36::Word36`] from a constant, rejecting values
/// wider than 36 bits at compile time.
#[macro_export]
macro_rules! w36 {
    ($n:expr) => {
        $crate::word36::Word36::new::<{ $n }>()
    };
}

#[test]
fn test_w36() {
    use prelude::Word36;
    let m: Word36 = w36!(40_u64);
    let n: Word36 = Word36::from(40_u32);
    assert_eq!(m, n);

    let p: Word36 = w36!(1u64 << 34);
    let q: Word36 = Word36::try_from(1u64 << 34).expect("test data should be in range");
    assert_eq!(p, q);
}
