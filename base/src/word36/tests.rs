use test_strategy::{proptest, Arbitrary};

use super::{extract, inject, jfield, sign_extend, PartialWord, Word36};

macro_rules! assert_octal_eq {
    ($left:expr, $right:expr $(,)?) => {{
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    panic!(
                        "Assertion failed: {:>#014o} != {:>#014o}",
                        left_val, right_val
                    );
                }
            }
        }
    }};
}

#[test]
fn test_w36_macro() {
    let w = crate::w36!(0o123_456_701_234);
    assert_eq!(w.bits(), 0o123_456_701_234);
    assert_eq!(Word36::try_from(0o123_456_701_234_u64), Ok(w));
    assert!(Word36::try_from(0o1_000_000_000_000_u64).is_err());
}

#[test]
fn test_halves_and_extension() {
    let w = Word36::masked(0o400_001_377_777);
    assert_octal_eq!(w.h1(), 0o400_001);
    assert_octal_eq!(w.h2(), 0o377_777);
    assert_octal_eq!(w.xh1(), 0o777_777_400_001);
    assert_octal_eq!(w.xh2(), 0o377_777);
}

#[test]
fn test_quarters_sixths_thirds() {
    let w = Word36::masked(0o123_456_765_432);
    assert_octal_eq!(w.q1(), 0o123);
    assert_octal_eq!(w.q2(), 0o456);
    assert_octal_eq!(w.q3(), 0o765);
    assert_octal_eq!(w.q4(), 0o432);
    assert_octal_eq!(w.s1(), 0o12);
    assert_octal_eq!(w.s2(), 0o34);
    assert_octal_eq!(w.s3(), 0o56);
    assert_octal_eq!(w.s4(), 0o76);
    assert_octal_eq!(w.s5(), 0o54);
    assert_octal_eq!(w.s6(), 0o32);
    assert_octal_eq!(w.t1(), 0o1234);
    assert_octal_eq!(w.t2(), 0o5676);
    assert_octal_eq!(w.t3(), 0o5432);
    assert_octal_eq!(w.xt1(), 0o1234);
    assert_octal_eq!(w.xt2(), 0o777_777_775_676);
}

#[test]
fn test_dual_purpose_j_fields() {
    let w = Word36::masked(0o111_222_333_444);
    assert_octal_eq!(extract(w, jfield::XH1_Q2, true).bits(), 0o222);
    assert_octal_eq!(extract(w, jfield::XH1_Q2, false).bits(), 0o111_222);
    assert_octal_eq!(extract(w, jfield::T3_Q4, true).bits(), 0o444);
    assert_octal_eq!(extract(w, jfield::T3_Q4, false).bits(), 0o3444);
    assert_octal_eq!(extract(w, jfield::T2_Q3, true).bits(), 0o333);
    assert_octal_eq!(extract(w, jfield::T1_Q1, true).bits(), 0o111);
    assert_eq!(PartialWord::from_j(jfield::U, false), None);
    assert_eq!(PartialWord::from_j(jfield::XU, true), None);
}

#[test]
fn test_inject_leaves_other_fields() {
    let w = Word36::masked(0o111_222_333_444);
    let v = Word36::masked(0o77);
    assert_octal_eq!(inject(w, jfield::S3, false, v).bits(), 0o111_277_333_444);
    assert_octal_eq!(inject(w, jfield::H2, false, v).bits(), 0o111_222_000_077);
    assert_octal_eq!(inject(w, jfield::W, false, v).bits(), 0o77);
}

#[test]
fn test_zero_and_sign() {
    assert!(Word36::ZERO.is_zero());
    assert!(Word36::NEGATIVE_ZERO.is_zero());
    assert!(Word36::NEGATIVE_ZERO.is_negative());
    assert!(Word36::ZERO.is_positive());
    assert_eq!(Word36::ONE.negate(), Word36::NEGATIVE_ONE);
    assert_eq!(Word36::NEGATIVE_ONE.magnitude(), Word36::ONE);
}

#[test]
fn test_shifts() {
    let w = Word36::masked(0o400_000_000_001);
    assert_octal_eq!(w.rotate_left(1).bits(), 0o000_000_000_003);
    assert_octal_eq!(w.rotate_right(1).bits(), 0o600_000_000_000);
    assert_octal_eq!(w.shift_right_logical(3).bits(), 0o040_000_000_000);
    assert_octal_eq!(w.shift_right_algebraic(3).bits(), 0o740_000_000_000);
    assert_octal_eq!(w.shift_left_logical(1).bits(), 0o000_000_000_002);
    assert_eq!(w.shift_right_algebraic(40), Word36::NEGATIVE_ZERO);
}

#[test]
fn test_sign_extend() {
    assert_octal_eq!(sign_extend(0o4000, 12), 0o777_777_774_000);
    assert_octal_eq!(sign_extend(0o3777, 12), 0o3777);
    assert_octal_eq!(sign_extend(0o40_000_000, 24), 0o777_740_000_000);
}

#[derive(Debug, Arbitrary)]
struct FieldInput {
    #[strategy(0..=Word36::MASK)]
    word: u64,
    #[strategy(0..=Word36::MASK)]
    value: u64,
    #[strategy(0..14u64)]
    j: u64,
    quarter_word_mode: bool,
}

#[proptest]
fn extract_after_inject_yields_the_field(input: FieldInput) {
    let field = PartialWord::from_j(input.j, input.quarter_word_mode)
        .expect("j values below 14 select a partial word");
    let width = field.width();
    let field_mask: u64 = if width == 36 {
        Word36::MASK
    } else {
        (1 << width) - 1
    };
    let word = Word36::masked(input.word);
    let value = Word36::masked(input.value);
    let updated = field.inject(word, value);
    let got = field.extract(updated).bits() & field_mask;
    assert_eq!(got, input.value & field_mask);
}

#[proptest]
fn inject_preserves_bits_outside_the_field(input: FieldInput) {
    let field = PartialWord::from_j(input.j, input.quarter_word_mode)
        .expect("j values below 14 select a partial word");
    let word = Word36::masked(input.word);
    let updated = field.inject(word, Word36::masked(input.value));
    let cleared_before = field.inject(word, Word36::ZERO);
    let cleared_after = field.inject(updated, Word36::ZERO);
    assert_eq!(cleared_before, cleared_after);
}
