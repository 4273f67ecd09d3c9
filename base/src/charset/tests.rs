use test_strategy::proptest;

use super::*;

#[test]
fn test_fieldata_space_padding() {
    let w = fieldata_word("SYS");
    assert_eq!(w.bits(), 0o303630_050505);
    assert_eq!(fieldata_word_to_string(w), "SYS   ");
}

#[test]
fn test_fieldata_folds_lower_case() {
    assert_eq!(fieldata_word("sys$"), fieldata_word("SYS$"));
}

#[test]
fn test_fieldata_tables_agree() {
    for (code, &ch) in ASCII_FROM_FIELDATA.iter().enumerate() {
        assert_eq!(
            usize::from(fieldata_from_ascii(ch)),
            code,
            "character {:?}",
            char::from(ch)
        );
    }
}

#[test]
fn test_control_characters_become_spaces() {
    assert_eq!(fieldata_from_ascii(b'\n'), FIELDATA_SPACE);
    assert_eq!(fieldata_from_ascii(0), FIELDATA_SPACE);
}

#[test]
fn test_ascii_word() {
    let w = ascii_word("AB");
    assert_eq!(w.bits(), (0o101 << 27) | (0o102 << 18) | (0o040 << 9) | 0o040);
    assert_eq!(ascii_word_to_string(w), "AB  ");
}

#[test]
fn test_multi_word_fieldata() {
    let words = fieldata_words("SYS$LIB", 2).expect("text fits");
    assert_eq!(words.len(), 2);
    assert_eq!(fieldata_string(&words), "SYS$LIB");
}

#[test]
fn test_text_too_long() {
    assert_eq!(
        ascii_words("ABCDEFGHI", 2),
        Err(TextTooLong {
            length: 9,
            capacity: 8
        })
    );
}

#[proptest]
fn fieldata_text_survives_encoding(#[strategy("[A-Z0-9$*]{0,12}")] text: String) {
    let words = fieldata_words(&text, 2).expect("twelve characters fit in two words");
    assert_eq!(fieldata_string(&words), text);
}
