use std::cmp::Ordering;

use test_strategy::{proptest, Arbitrary};

use super::*;
use crate::error::DivideCheck;

macro_rules! assert_octal_eq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    panic!(
                        "Assertion failed: {:>#012o} != {:>#012o}",
                        left_val, right_val
                    );
                }
            }
        }
    }};
}

fn w(bits: u64) -> Word36 {
    Word36::masked(bits)
}

#[test]
fn test_add_mixed_signs() {
    let sum = add(w(0o700000001314), w(0o000212273555));
    assert_octal_eq!(sum.value.bits(), 0o700212275071);
    assert!(!sum.carry);
    assert!(!sum.overflow);
}

#[test]
fn test_add_negative_zeros() {
    let sum = add(Word36::NEGATIVE_ZERO, Word36::NEGATIVE_ZERO);
    assert_octal_eq!(sum.value.bits(), 0o777777777777);
    assert!(sum.carry);
    assert!(!sum.overflow);
}

#[test]
fn test_add_opposite_zeros_is_positive_zero() {
    let sum = add(Word36::ZERO, Word36::NEGATIVE_ZERO);
    assert_octal_eq!(sum.value.bits(), 0);
    let sum = add(w(5), w(5).negate());
    assert_octal_eq!(sum.value.bits(), 0);
    assert!(sum.carry);
    assert!(!sum.overflow);
}

#[test]
fn test_add_positive_overflow_wraps() {
    let sum = add(w(0o377777777777), Word36::ONE);
    assert_octal_eq!(sum.value.bits(), 0o400000000000);
    assert!(!sum.carry);
    assert!(sum.overflow);
}

#[test]
fn test_add_negative_overflow_wraps() {
    let sum = add(w(0o400000000000), w(0o777777777776));
    assert_octal_eq!(sum.value.bits(), 0o377777777777);
    assert!(sum.carry);
    assert!(sum.overflow);
}

#[test]
fn test_carry_overflow_table() {
    assert_eq!(carry_and_overflow(false, false, false), (false, false));
    assert_eq!(carry_and_overflow(false, false, true), (false, true));
    assert_eq!(carry_and_overflow(false, true, false), (true, false));
    assert_eq!(carry_and_overflow(false, true, true), (false, false));
    assert_eq!(carry_and_overflow(true, true, false), (true, true));
    assert_eq!(carry_and_overflow(true, true, true), (true, false));
}

#[test]
fn test_compare() {
    assert_eq!(compare(Word36::ZERO, Word36::NEGATIVE_ZERO), Ordering::Greater);
    assert_eq!(compare(w(1), w(1).negate()), Ordering::Greater);
    assert_eq!(compare(w(3).negate(), w(2).negate()), Ordering::Less);
    assert_eq!(compare(w(7), w(7)), Ordering::Equal);
    assert_eq!(compare(w(6), w(7)), Ordering::Less);
}

#[test]
fn test_add_halves_ignores_carry_between_halves() {
    let sum = add_halves(w(0o000001_377777), w(0o000001_000001));
    // H2 overflows to negative but nothing spills into H1.
    assert_octal_eq!(sum.bits(), 0o000002_400000);
}

#[test]
fn test_add_thirds() {
    let sum = add_thirds(w(0o0001_0002_0003), w(0o0001_7776_0004));
    // 2 + (-1) = 1 in T2.
    assert_octal_eq!(sum.bits(), 0o0002_0001_0007);
}

#[test]
fn test_multiply_signs() {
    let product = multiply(w(5), w(7).negate());
    assert!(product.is_negative());
    assert_eq!(product.to_i128(), -35);
    assert_octal_eq!(product.low.bits(), 0o777777777734);
    assert_octal_eq!(product.high.bits(), 0o777777777777);
}

#[test]
fn test_multiply_large() {
    let product = multiply(w(0o377777777777), w(0o377777777777));
    let expected: i128 = ((1_i128 << 35) - 1) * ((1_i128 << 35) - 1);
    assert_eq!(product.to_i128(), expected);
    assert!(!product.is_negative());
}

#[test]
fn test_divide() {
    let dividend = DoubleWord::from_i128(100);
    assert_eq!(divide(dividend, w(7)), Ok((w(14), w(2))));
    let dividend = DoubleWord::from_i128(-100);
    assert_eq!(divide(dividend, w(7)), Ok((w(14).negate(), w(2).negate())));
}

#[test]
fn test_divide_check() {
    assert_eq!(
        divide(DoubleWord::from_i128(1), Word36::ZERO),
        Err(DivideCheck::DivideByZero)
    );
    assert_eq!(
        divide(DoubleWord::from_i128(1), Word36::NEGATIVE_ZERO),
        Err(DivideCheck::DivideByZero)
    );
    assert_eq!(
        divide(DoubleWord::from_i128(1 << 40), w(2)),
        Err(DivideCheck::QuotientOverflow)
    );
}

#[test]
fn test_double_shift_right_algebraic() {
    let d = DoubleWord::from_i128(-8);
    assert_eq!(d.shift_right_algebraic(1).to_i128(), -4);
    let d = DoubleWord::from_i128(8);
    assert_eq!(d.shift_right_algebraic(3).to_i128(), 1);
}

#[derive(Debug, Arbitrary)]
struct AddInput {
    #[strategy(-((1_i64 << 35) - 1)..=((1_i64 << 35) - 1))]
    a: i64,
    #[strategy(-((1_i64 << 35) - 1)..=((1_i64 << 35) - 1))]
    b: i64,
}

#[proptest]
fn add_matches_native_arithmetic_when_in_range(input: AddInput) {
    let total = input.a + input.b;
    let sum = add(from_i64(input.a), from_i64(input.b));
    if total.abs() < (1_i64 << 35) {
        assert_eq!(to_i64(sum.value), total);
        assert!(!sum.overflow);
    } else {
        assert!(sum.overflow);
    }
}

#[proptest]
fn add_is_commutative(input: AddInput) {
    let a = from_i64(input.a);
    let b = from_i64(input.b);
    assert_eq!(add(a, b), add(b, a));
}

#[proptest]
fn multiply_matches_native_arithmetic(input: AddInput) {
    let product = multiply(from_i64(input.a), from_i64(input.b));
    assert_eq!(product.to_i128(), i128::from(input.a) * i128::from(input.b));
}
